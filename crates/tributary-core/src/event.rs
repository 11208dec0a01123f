//! Log records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::ChannelId;
use crate::level::LogLevel;

/// Payload of a log record
///
/// The aggregation core only looks inside a message to apply a channel's
/// substring filter; rendering is left to formatters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Display name of the emitting channel at emit time
    pub subject: String,
    /// Message text
    pub text: String,
}

impl LogMessage {
    /// Create a message
    pub fn new(subject: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            text: text.into(),
        }
    }

    /// Whether the text or the subject contains `filter`
    pub fn matches(&self, filter: &str) -> bool {
        self.text.contains(filter) || self.subject.contains(filter)
    }
}

/// An immutable, sequence-stamped log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Process-wide position; strictly increasing, never reused
    pub sequence: u64,
    /// When the record was appended
    pub timestamp: DateTime<Utc>,
    /// Emitting channel
    pub channel_id: ChannelId,
    /// Severity
    pub level: LogLevel,
    /// Payload
    pub message: LogMessage,
}

impl LogEvent {
    /// Whether this record is an error
    pub fn is_error(&self) -> bool {
        self.level.is_error()
    }
}
