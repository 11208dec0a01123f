//! Error types for the log service

use thiserror::Error;
use tributary_core::{ChannelError, ConfigError};

/// Errors that can occur in the log service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Configuration rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Operation on a removed channel
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Service already started
    #[error("Log service already started")]
    AlreadyStarted,

    /// `start` called outside a tokio runtime
    #[error("No tokio runtime: {0}")]
    NoRuntime(String),

    /// The maintenance task ended abnormally
    #[error("Maintenance task failed: {0}")]
    Task(String),
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
