//! Tracing layers for tributary
//!
//! [`BufferLayer`] bridges `tracing` events into an [`EventBuffer`], so
//! library code instrumented with `tracing` shows up in a run's log next to
//! what producers emit through their channels.

use std::cell::Cell;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tributary_buffer::EventBuffer;
use tributary_core::{ChannelId, LogLevel, LogMessage};

use crate::context::ChannelContextGuard;

thread_local! {
    /// Set while this thread is inside `BufferLayer::on_event`
    static BRIDGING: Cell<bool> = const { Cell::new(false) };
}

/// Map a tracing level onto the channel level scale
pub fn log_level_for(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Minimal,
        Level::INFO => LogLevel::Basic,
        Level::DEBUG => LogLevel::Debug,
        Level::TRACE => LogLevel::Rowlevel,
    }
}

/// Layer that appends tracing events to an [`EventBuffer`]
///
/// Events go to the channel made current by [`ChannelContextGuard`], or to
/// the fallback channel (normally the general channel). The message subject
/// is the event's target. Events raised while this layer is appending (the
/// buffer's diagnostics about a bridged event) are not bridged.
pub struct BufferLayer {
    buffer: Arc<EventBuffer>,
    fallback: ChannelId,
    max_level: LogLevel,
}

impl BufferLayer {
    /// Bridge into `buffer`, routing context-free events to `fallback`
    pub fn new(buffer: Arc<EventBuffer>, fallback: ChannelId) -> Self {
        Self {
            buffer,
            fallback,
            max_level: LogLevel::Basic,
        }
    }

    /// Most verbose level bridged (default `Basic`, i.e. INFO and above)
    pub fn with_max_level(mut self, level: LogLevel) -> Self {
        self.max_level = level;
        self
    }

    pub fn max_level(&self) -> LogLevel {
        self.max_level
    }
}

impl<S> Layer<S> for BufferLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = log_level_for(metadata.level());
        if !level.is_visible(self.max_level) {
            return;
        }
        if BRIDGING.with(|flag| flag.replace(true)) {
            return;
        }
        let _bridging = BridgingGuard;

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let channel = ChannelContextGuard::current().unwrap_or(self.fallback);
        self.buffer.append(
            channel,
            level,
            LogMessage::new(metadata.target(), visitor.into_text()),
        );
    }
}

struct BridgingGuard;

impl Drop for BridgingGuard {
    fn drop(&mut self) {
        BRIDGING.with(|flag| flag.set(false));
    }
}

/// Collects the `message` field plus `key=value` pairs for the rest
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn into_text(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}
