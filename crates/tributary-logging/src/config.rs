//! Process logging configuration
//!
//! Covers the process's own diagnostics (what the tributary crates emit
//! through `tracing`), not the channel events held by the buffer.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Crates of this workspace, used by the development preset
const TRIBUTARY_TARGETS: [&str; 4] = [
    "tributary_registry",
    "tributary_buffer",
    "tributary_service",
    "tributary_logging",
];

/// How the process subscriber writes its own diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Base directive when RUST_LOG is unset
    pub default_level: String,

    /// Console format; `None` keeps stdout quiet
    pub console: Option<ConsoleFormat>,

    /// JSONL file output
    pub file: Option<FileConfig>,

    /// Attach the current span and span list to JSONL lines
    pub span_context: bool,

    /// `target -> level` overrides on top of `default_level`
    pub targets: BTreeMap<String, String>,

    /// Targets switched off entirely
    pub silenced: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            console: Some(ConsoleFormat::Jsonl),
            file: None,
            span_context: true,
            targets: BTreeMap::new(),
            silenced: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Pretty console; registry, buffer and service internals at debug
    pub fn development() -> Self {
        let mut config = Self {
            console: Some(ConsoleFormat::Pretty),
            ..Self::default()
        };
        for target in TRIBUTARY_TARGETS {
            config = config.with_target(target, "debug");
        }
        config
    }

    /// Daily JSONL files under `log_dir`, console off
    ///
    /// Per-append buffer traces stay off even if the base level is raised.
    pub fn production(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            console: None,
            file: Some(FileConfig::in_directory(log_dir).with_max_files(30)),
            ..Self::default()
        }
        .with_target("tributary_buffer", "info")
    }

    /// Warnings only, JSONL on the console, no span context
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            span_context: false,
            ..Self::default()
        }
    }

    /// Override the level of one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    /// Switch a target off
    pub fn silence(mut self, target: impl Into<String>) -> Self {
        self.silenced.push(target.into());
        self
    }

    /// `EnvFilter` directives: base level, overrides, then silenced targets
    pub fn filter_directives(&self) -> String {
        let overrides = self
            .targets
            .iter()
            .map(|(target, level)| format!("{target}={level}"));
        let silenced = self.silenced.iter().map(|target| format!("{target}=off"));

        std::iter::once(self.default_level.clone())
            .chain(overrides)
            .chain(silenced)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Console line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsoleFormat {
    /// Multi-line, colored
    Pretty,
    /// One JSON object per line
    Jsonl,
}

/// JSONL file output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File names are `<prefix>.log`, or `<prefix>.<date>.log` when rotating
    pub prefix: String,
    pub rotation: FileRotation,
    /// Rotated files kept; `None` keeps all
    pub max_files: Option<usize>,
}

impl FileConfig {
    /// `tributary` files in `directory`, daily rotation, a week kept
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "tributary".to_string(),
            rotation: FileRotation::Daily,
            max_files: Some(7),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_rotation(mut self, rotation: FileRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = Some(max_files);
        self
    }
}

/// When a new log file is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FileRotation {
    #[default]
    Daily,
    Hourly,
    /// One file, truncated when the subscriber is built
    Never,
}
