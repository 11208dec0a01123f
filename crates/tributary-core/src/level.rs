//! Severity levels for channels and records

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Severity of a record, and the minimum severity a channel retains
///
/// Levels are ordered from least to most verbose. A channel configured at
/// `Detailed` keeps `Error`, `Minimal`, `Basic` and `Detailed` records and
/// drops `Debug` and `Rowlevel` ones.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Log nothing at all
    Nothing = 0,
    /// Only errors
    Error = 1,
    /// Minimal progress information
    Minimal = 2,
    /// Basic progress information
    #[default]
    Basic = 3,
    /// Detailed progress information
    Detailed = 4,
    /// Debugging output
    Debug = 5,
    /// Per-row tracing, extremely verbose
    Rowlevel = 6,
}

impl LogLevel {
    /// All levels, least verbose first
    pub const ALL: [LogLevel; 7] = [
        LogLevel::Nothing,
        LogLevel::Error,
        LogLevel::Minimal,
        LogLevel::Basic,
        LogLevel::Detailed,
        LogLevel::Debug,
        LogLevel::Rowlevel,
    ];

    /// Whether a record at this level passes a channel configured at `channel_level`
    ///
    /// `Nothing` is a channel setting, never a record level, so a record
    /// tagged `Nothing` is never visible.
    pub fn is_visible(self, channel_level: LogLevel) -> bool {
        self != LogLevel::Nothing && self <= channel_level
    }

    /// Lower-case code used in configuration and display
    pub fn code(self) -> &'static str {
        match self {
            LogLevel::Nothing => "nothing",
            LogLevel::Error => "error",
            LogLevel::Minimal => "minimal",
            LogLevel::Basic => "basic",
            LogLevel::Detailed => "detailed",
            LogLevel::Debug => "debug",
            LogLevel::Rowlevel => "rowlevel",
        }
    }

    /// Numeric rank (0 = nothing, 6 = rowlevel)
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Inverse of [`rank`](Self::rank)
    pub fn from_rank(rank: u8) -> Option<Self> {
        Self::ALL.get(rank as usize).copied()
    }

    /// Whether this is the error level
    pub fn is_error(self) -> bool {
        self == LogLevel::Error
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.code() == wanted)
            .ok_or_else(|| ConfigError::UnknownLevel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Minimal);
        assert!(LogLevel::Basic < LogLevel::Detailed);
        assert!(LogLevel::Debug < LogLevel::Rowlevel);
    }

    #[test]
    fn test_visibility() {
        assert!(LogLevel::Error.is_visible(LogLevel::Basic));
        assert!(LogLevel::Basic.is_visible(LogLevel::Basic));
        assert!(!LogLevel::Detailed.is_visible(LogLevel::Basic));

        // A channel at Nothing drops even errors
        assert!(!LogLevel::Error.is_visible(LogLevel::Nothing));
        assert!(!LogLevel::Nothing.is_visible(LogLevel::Rowlevel));
    }

    #[test]
    fn test_parse_and_display() {
        for level in LogLevel::ALL {
            let parsed: LogLevel = level.to_string().parse().unwrap();
            assert_eq!(parsed, level);
        }
        assert_eq!(" Debug ".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_rank() {
        assert_eq!(LogLevel::Nothing.rank(), 0);
        assert_eq!(LogLevel::from_rank(6), Some(LogLevel::Rowlevel));
        assert_eq!(LogLevel::from_rank(7), None);
    }

    #[test]
    fn test_default_is_basic() {
        assert_eq!(LogLevel::default(), LogLevel::Basic);
    }
}
