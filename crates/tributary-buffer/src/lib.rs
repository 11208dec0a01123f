//! # Tributary Buffer
//!
//! An append-only, sequence-ordered store of [`LogEvent`]s shared by every
//! producer in the process.
//!
//! ## Bounds
//!
//! The buffer holds at most `max_events` records: an append that goes over
//! the limit evicts the lowest sequences first. Age-based eviction
//! ([`EventBuffer::evict_older_than`]) is a separate policy driven by a
//! periodic sweep. Neither bound ever makes an append fail.
//!
//! ## Incremental reads
//!
//! Consumers poll with an [`EventQuery`]: a sequence range, optionally
//! scoped to a set of channels (usually the closure of one execution), and
//! optionally limited to the last N matches. A tail query can carry a
//! cursor key so the next poll resumes after what it already returned.
//!
//! ```rust,ignore
//! use tributary_buffer::{EventBuffer, EventQuery};
//! use tributary_core::{ChannelId, LogLevel, LogMessage};
//!
//! let buffer = EventBuffer::new(10_000);
//! let stage = ChannelId::new();
//! buffer.append(stage, LogLevel::Basic, LogMessage::new("Sort", "started"));
//!
//! let events = buffer.query(&EventQuery::for_channels([stage]).between(1, buffer.highest_sequence()));
//! ```
//!
//! [`LogEvent`]: tributary_core::LogEvent

pub mod buffer;
pub mod format;
pub mod listener;
pub mod query;

pub use buffer::EventBuffer;
pub use format::{EventFormatter, JsonlFormatter, PlainFormatter};
pub use listener::{EventListener, ListenerId};
pub use query::EventQuery;
