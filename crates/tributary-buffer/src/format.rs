//! Event formatters
//!
//! Formatting is a collaborator of the buffer, not part of it: the buffer
//! only needs one to render a query result as text.

use chrono::SecondsFormat;
use tributary_core::LogEvent;

/// Renders one event as one line of text (without the trailing newline)
pub trait EventFormatter: Send + Sync {
    /// Format an event
    fn format(&self, event: &LogEvent) -> String;
}

/// Human-readable `timestamp - subject - text` lines
#[derive(Debug, Clone, Copy)]
pub struct PlainFormatter {
    /// Prefix each line with an RFC 3339 timestamp
    pub include_timestamp: bool,
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self {
            include_timestamp: true,
        }
    }
}

impl PlainFormatter {
    /// Formatter without timestamps
    pub fn without_timestamp() -> Self {
        Self {
            include_timestamp: false,
        }
    }
}

impl EventFormatter for PlainFormatter {
    fn format(&self, event: &LogEvent) -> String {
        let marker = if event.is_error() { "ERROR: " } else { "" };
        if self.include_timestamp {
            format!(
                "{} - {} - {}{}",
                event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                event.message.subject,
                marker,
                event.message.text
            )
        } else {
            format!("{} - {}{}", event.message.subject, marker, event.message.text)
        }
    }
}

/// One JSON object per event (JSONL)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlFormatter;

impl EventFormatter for JsonlFormatter {
    fn format(&self, event: &LogEvent) -> String {
        serde_json::to_string(event).unwrap_or_else(|e| {
            serde_json::json!({
                "sequence": event.sequence,
                "format_error": e.to_string(),
            })
            .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tributary_core::{ChannelId, LogLevel, LogMessage};

    fn event(level: LogLevel) -> LogEvent {
        LogEvent {
            sequence: 42,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            channel_id: ChannelId::new(),
            level,
            message: LogMessage::new("Sort rows", "Finished processing"),
        }
    }

    #[test]
    fn test_plain_format() {
        let line = PlainFormatter::default().format(&event(LogLevel::Basic));
        assert_eq!(line, "2024-03-01T12:30:00.000Z - Sort rows - Finished processing");
    }

    #[test]
    fn test_plain_format_marks_errors() {
        let line = PlainFormatter::without_timestamp().format(&event(LogLevel::Error));
        assert_eq!(line, "Sort rows - ERROR: Finished processing");
    }

    #[test]
    fn test_jsonl_format() {
        let line = JsonlFormatter.format(&event(LogLevel::Detailed));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["sequence"], 42);
        assert_eq!(value["level"], "detailed");
        assert_eq!(value["message"]["subject"], "Sort rows");
        assert!(!line.contains('\n'));
    }
}
