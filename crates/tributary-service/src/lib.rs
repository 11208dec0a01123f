//! # Tributary Service
//!
//! The explicitly constructed log service: one channel directory and one
//! event buffer, producer [`Channel`] handles, long-lived [`LogDrain`]
//! consumers, and a background maintenance task that keeps both bounded.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tributary_core::{ChannelDescriptor, ChannelKind};
//! use tributary_service::{LogService, LogServiceConfig};
//!
//! let service = LogService::new(LogServiceConfig::from_env()?)?;
//! service.start()?;
//!
//! let pipeline = service.channel(ChannelDescriptor::new(ChannelKind::Pipeline, "load customers"));
//! let stage = pipeline.child(ChannelDescriptor::new(ChannelKind::Stage, "Table input").with_copy_index(0))?;
//! stage.log_basic("Opened connection")?;
//!
//! let mut drain = service.attach_drain(pipeline.id(), true).unwrap();
//! for event in drain.poll() {
//!     println!("{} {}", event.sequence, event.message.text);
//! }
//!
//! service.shutdown().await?;
//! ```

pub mod channel;
pub mod config;
pub mod drain;
pub mod error;
pub mod maintenance;
pub mod service;

pub use channel::Channel;
pub use config::LogServiceConfig;
pub use drain::LogDrain;
pub use error::{ServiceError, ServiceResult};
pub use maintenance::MaintenanceReport;
pub use service::LogService;
