//! Process logging for tributary
//!
//! Installs the process-wide `tracing` subscriber and bridges `tracing`
//! events into the event buffer.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines to the console (default)
//! - **Pretty Output**: Human-readable console output for development
//! - **File Output**: Daily/hourly rotation via tracing-appender
//! - **Buffer Bridge**: [`BufferLayer`] appends tracing events to an
//!   [`EventBuffer`](tributary_buffer::EventBuffer) under the channel made
//!   current by [`ChannelContextGuard`]
//!
//! # Quick Start
//!
//! ```ignore
//! use tributary_logging::{BufferLayer, LogConfig, TributarySubscriberBuilder};
//!
//! // JSONL to console
//! TributarySubscriberBuilder::new().init();
//!
//! // Pretty console, plus tracing events in the service's buffer
//! let _guard = TributarySubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .with_buffer_layer(BufferLayer::new(service.shared_buffer(), service.general_channel_id()))
//!     .init();
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod layers;

pub use config::{ConsoleFormat, FileConfig, FileRotation, LogConfig};
pub use context::ChannelContextGuard;
pub use error::{LoggingError, LoggingResult};
pub use layers::{BufferLayer, log_level_for};

use std::fs::{self, File};
use std::str::FromStr;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// A type-erased layer over the base registry
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// The subscriber assembled by [`TributarySubscriberBuilder::build`]
pub type TributarySubscriber = Layered<EnvFilter, Layered<Vec<BoxedLayer>, Registry>>;

/// Builder for configuring and initializing the tributary subscriber
///
/// By default, console output uses JSONL format. Use
/// [`LogConfig::development`] for human-readable output.
pub struct TributarySubscriberBuilder {
    config: LogConfig,
    buffer_layer: Option<BufferLayer>,
}

impl TributarySubscriberBuilder {
    /// Create a builder with the default configuration (JSONL to console)
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
            buffer_layer: None,
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default level directive
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Write console output in `format`
    pub fn with_console(mut self, format: ConsoleFormat) -> Self {
        self.config.console = Some(format);
        self
    }

    /// No console output
    pub fn without_console(mut self) -> Self {
        self.config.console = None;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Bridge tracing events into an event buffer
    pub fn with_buffer_layer(mut self, layer: BufferLayer) -> Self {
        self.buffer_layer = Some(layer);
        self
    }

    /// Assemble the subscriber without installing it
    ///
    /// The returned guard (present with file output) must be kept alive
    /// for buffered lines to be flushed.
    pub fn build(self) -> LoggingResult<(TributarySubscriber, Option<WorkerGuard>)> {
        for (target, level) in &self.config.targets {
            LevelFilter::from_str(level)
                .map_err(|e| LoggingError::InvalidFilter(format!("{target}={level}: {e}")))?;
        }

        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(self.config.filter_directives())
                .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?,
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        match self.config.console {
            Some(ConsoleFormat::Pretty) => layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .boxed(),
            ),
            Some(ConsoleFormat::Jsonl) => {
                layers.push(jsonl_layer(self.config.span_context, std::io::stdout))
            }
            None => {}
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            guard = Some(file_guard);
            layers.push(jsonl_layer(self.config.span_context, writer));
        }

        if let Some(buffer_layer) = self.buffer_layer {
            layers.push(buffer_layer.boxed());
        }

        let subscriber = tracing_subscriber::registry().with(layers).with(env_filter);
        Ok((subscriber, guard))
    }

    /// Install the subscriber globally
    ///
    /// Fails if a global subscriber has already been set.
    pub fn try_init(self) -> LoggingResult<Option<WorkerGuard>> {
        let (subscriber, guard) = self.build()?;
        subscriber
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))?;
        Ok(guard)
    }

    /// Install the subscriber globally, reporting failure on stderr
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {}", e);
                None
            }
        }
    }
}

impl Default for TributarySubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// JSONL layer: event fields flattened to the top level, with source location
fn jsonl_layer<W>(span_context: bool, writer: W) -> BoxedLayer
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(span_context)
        .with_span_list(span_context)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
        .boxed()
}

/// Non-blocking writer for the configured file output
///
/// `Never` truncates a single file; the rotating strategies append.
fn file_writer(config: &FileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    let rotation = match config.rotation {
        FileRotation::Never => {
            fs::create_dir_all(&config.directory)?;
            let path = config.directory.join(format!("{}.log", config.prefix));
            let file = File::create(path)?;
            return Ok(tracing_appender::non_blocking(file));
        }
        FileRotation::Daily => Rotation::DAILY,
        FileRotation::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.as_str())
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder.build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() {
    TributarySubscriberBuilder::new().init();
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() {
    TributarySubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// Initialize logging for tests (warnings only, repeat calls ignored)
pub fn init_testing() {
    let _ = TributarySubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = TributarySubscriberBuilder::new();
        assert_eq!(builder.config.default_level, "info");
        assert!(builder.buffer_layer.is_none());
    }

    #[test]
    fn test_default_is_jsonl() {
        let builder = TributarySubscriberBuilder::new();
        assert_eq!(builder.config.console, Some(ConsoleFormat::Jsonl));
    }

    #[test]
    fn test_builder_with_config() {
        let builder = TributarySubscriberBuilder::new().with_config(LogConfig::development());
        assert_eq!(builder.config.console, Some(ConsoleFormat::Pretty));
        assert_eq!(
            builder.config.targets.get("tributary_service").map(String::as_str),
            Some("debug")
        );
    }

    #[test]
    fn test_builder_with_level_and_console() {
        let builder = TributarySubscriberBuilder::new()
            .with_level("trace")
            .with_console(ConsoleFormat::Pretty)
            .without_console();
        assert_eq!(builder.config.default_level, "trace");
        assert!(builder.config.console.is_none());
    }

    #[test]
    fn test_invalid_target_level_rejected() {
        let config = LogConfig::default().with_target("tributary_buffer", "loud");
        let result = TributarySubscriberBuilder::new().with_config(config).build();
        assert!(matches!(result, Err(LoggingError::InvalidFilter(_))));
    }

    #[test]
    fn test_build_without_outputs() {
        let (_subscriber, guard) = TributarySubscriberBuilder::new()
            .without_console()
            .build()
            .unwrap();
        assert!(guard.is_none());
    }
}
