//! Error types for subscriber setup

use thiserror::Error;

/// Errors that can occur while installing the process subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Log directory or file could not be created
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rolling file appender rejected its configuration
    #[error("File appender error: {0}")]
    Appender(String),

    /// Level or filter directive could not be parsed
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// A global subscriber was already installed
    #[error("Subscriber initialization failed: {0}")]
    Init(String),
}

impl From<tracing_appender::rolling::InitError> for LoggingError {
    fn from(e: tracing_appender::rolling::InitError) -> Self {
        LoggingError::Appender(e.to_string())
    }
}

/// Result type alias for logging setup
pub type LoggingResult<T> = Result<T, LoggingError>;
