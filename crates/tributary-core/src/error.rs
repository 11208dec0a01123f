//! Error types for tributary
//!
//! Unknown ids are not errors: lookups return `Option`. What remains are
//! configuration mistakes, rejected up front, and operations on channels
//! that have already been removed.

use thiserror::Error;

use crate::channel::ChannelId;

/// Configuration rejected at construction time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroLimit { field: &'static str },

    #[error("{field} must be a positive duration")]
    ZeroInterval { field: &'static str },

    #[error("Unknown log level: {0}")]
    UnknownLevel(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors related to producer channels
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Channel has been removed: {0}")]
    Removed(ChannelId),
}
