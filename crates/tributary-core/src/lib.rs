//! # Tributary Core
//!
//! Core types, clocks, and errors shared by the tributary log aggregation
//! crates.
//!
//! Many concurrently running pipeline stages emit severity-tagged records
//! through channels. This crate defines the vocabulary those crates agree on:
//!
//! - [`ChannelId`]: Opaque, never-reused identifier of a registered channel
//! - [`ChannelDescriptor`]: What a producer says about itself when registering
//! - [`ChannelRecord`]: What the directory stores for a registered channel
//! - [`LogEvent`]: An immutable, sequence-stamped record
//! - [`SequenceClock`]: Strictly increasing event positions
//! - [`TimeSource`]: Wall-clock abstraction for testability

pub mod channel;
pub mod clock;
pub mod error;
pub mod event;
pub mod level;

// Re-export main types
pub use channel::*;
pub use clock::*;
pub use error::*;
pub use event::*;
pub use level::*;
