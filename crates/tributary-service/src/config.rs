//! Configuration for the log service
//!
//! All limits are supplied from outside; none are computed. Values can be
//! overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TRIBUTARY_MAX_REGISTRY_SIZE` | `max_registry_entries` |
//! | `TRIBUTARY_MAX_LOG_LINES` | `max_buffered_events` |
//! | `TRIBUTARY_MAX_LOG_AGE_SECS` | `max_event_age` |
//! | `TRIBUTARY_PURGE_INTERVAL_MS` | `purge_interval` |
//! | `TRIBUTARY_LOG_LEVEL` | `default_level` |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tributary_core::{ConfigError, LogLevel};

pub const ENV_MAX_REGISTRY_SIZE: &str = "TRIBUTARY_MAX_REGISTRY_SIZE";
pub const ENV_MAX_LOG_LINES: &str = "TRIBUTARY_MAX_LOG_LINES";
pub const ENV_MAX_LOG_AGE_SECS: &str = "TRIBUTARY_MAX_LOG_AGE_SECS";
pub const ENV_PURGE_INTERVAL_MS: &str = "TRIBUTARY_PURGE_INTERVAL_MS";
pub const ENV_LOG_LEVEL: &str = "TRIBUTARY_LOG_LEVEL";

/// Limits and cadence of a [`LogService`](crate::LogService)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogServiceConfig {
    /// Directory size above which the maintenance sweep evicts channels
    pub max_registry_entries: usize,
    /// Event buffer count bound
    pub max_buffered_events: usize,
    /// Events older than this are evicted by the maintenance sweep
    pub max_event_age: Duration,
    /// Time between maintenance sweeps
    pub purge_interval: Duration,
    /// Level of root channels registered without an explicit level
    pub default_level: LogLevel,
}

impl Default for LogServiceConfig {
    fn default() -> Self {
        Self {
            max_registry_entries: 10_000,
            max_buffered_events: 5_000,
            max_event_age: Duration::from_secs(24 * 60 * 60),
            purge_interval: Duration::from_secs(60),
            default_level: LogLevel::Basic,
        }
    }
}

impl LogServiceConfig {
    /// Small limits and frequent sweeps, verbose default level
    pub fn development() -> Self {
        Self {
            max_registry_entries: 1_000,
            max_buffered_events: 10_000,
            max_event_age: Duration::from_secs(60 * 60),
            purge_interval: Duration::from_secs(5),
            default_level: LogLevel::Debug,
        }
    }

    /// Tight limits and a fast sweep for unit tests
    pub fn testing() -> Self {
        Self {
            max_registry_entries: 100,
            max_buffered_events: 1_000,
            max_event_age: Duration::from_secs(60),
            purge_interval: Duration::from_millis(20),
            default_level: LogLevel::Rowlevel,
        }
    }

    /// Large limits for long-running engines
    pub fn production() -> Self {
        Self {
            max_registry_entries: 50_000,
            max_buffered_events: 100_000,
            max_event_age: Duration::from_secs(24 * 60 * 60),
            purge_interval: Duration::from_secs(60),
            default_level: LogLevel::Basic,
        }
    }

    /// Set the directory size limit
    pub fn with_max_registry_entries(mut self, max: usize) -> Self {
        self.max_registry_entries = max;
        self
    }

    /// Set the buffer count bound
    pub fn with_max_buffered_events(mut self, max: usize) -> Self {
        self.max_buffered_events = max;
        self
    }

    /// Set the event age bound
    pub fn with_max_event_age(mut self, age: Duration) -> Self {
        self.max_event_age = age;
        self
    }

    /// Set the sweep interval
    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    /// Set the default channel level
    pub fn with_default_level(mut self, level: LogLevel) -> Self {
        self.default_level = level;
        self
    }

    /// Reject non-positive limits and intervals
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_registry_entries == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_registry_entries",
            });
        }
        if self.max_buffered_events == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_buffered_events",
            });
        }
        if self.max_event_age.is_zero() {
            return Err(ConfigError::ZeroInterval {
                field: "max_event_age",
            });
        }
        if self.purge_interval.is_zero() {
            return Err(ConfigError::ZeroInterval {
                field: "purge_interval",
            });
        }
        Ok(())
    }

    /// Defaults overridden from `TRIBUTARY_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source
    ///
    /// Unset keys keep the current value; malformed values are rejected.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_REGISTRY_SIZE) {
            self.max_registry_entries = parse_number(ENV_MAX_REGISTRY_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_LOG_LINES) {
            self.max_buffered_events = parse_number(ENV_MAX_LOG_LINES, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_LOG_AGE_SECS) {
            self.max_event_age = Duration::from_secs(parse_number(ENV_MAX_LOG_AGE_SECS, &value)?);
        }
        if let Some(value) = lookup(ENV_PURGE_INTERVAL_MS) {
            self.purge_interval =
                Duration::from_millis(parse_number(ENV_PURGE_INTERVAL_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.default_level = LogLevel::from_str(value.trim())?;
        }
        Ok(self)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}
