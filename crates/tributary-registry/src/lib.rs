//! # Tributary Registry
//!
//! The channel directory: a registry of log sources keyed by
//! [`ChannelId`](tributary_core::ChannelId), with a parent → children index,
//! identity de-duplication on registration, and background-purge-bounded
//! size.
//!
//! ## Structure
//!
//! Records live in an id-keyed arena. Parents and children never point at
//! each other directly: the hierarchy is a separate parent-id → child-ids
//! multimap, so removing a subtree or reconciling orphans is a pure data
//! operation on maps.
//!
//! ## Eviction
//!
//! Every unprotected registration enters a FIFO purge queue. A periodic
//! sweep ([`ChannelDirectory::run_eviction`]) trims the directory back under
//! its limit, oldest candidates first, skipping anything a drain is
//! attached to (directly or through an ancestor).
//!
//! ```rust,ignore
//! use tributary_core::{ChannelDescriptor, ChannelKind};
//! use tributary_registry::ChannelDirectory;
//!
//! let directory = ChannelDirectory::default();
//! let run = directory.register(ChannelDescriptor::new(ChannelKind::Pipeline, "load_sales"), false);
//! let stage = directory.register(
//!     ChannelDescriptor::new(ChannelKind::Stage, "Table output")
//!         .with_parent(run)
//!         .with_copy_index(0),
//!     false,
//! );
//! assert_eq!(directory.children_closure(run), vec![run, stage]);
//! ```

pub mod directory;
pub mod eviction;

pub use directory::{ChannelDirectory, ChannelHierarchy, Registration};
pub use eviction::{EvictionReport, eviction_target};
