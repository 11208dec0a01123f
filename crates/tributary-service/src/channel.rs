//! Producer-facing channel handles

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tributary_core::{ChannelDescriptor, ChannelError, ChannelId, LogLevel, LogMessage};

use crate::service::Shared;

/// Handle a producer logs through
///
/// Bound to one directory entry and the shared buffer. Cheap to clone;
/// clones share the text filter. Once the entry is removed, emitting or
/// changing the level fails with [`ChannelError::Removed`].
#[derive(Clone)]
pub struct Channel {
    id: ChannelId,
    name: Arc<str>,
    shared: Arc<Shared>,
    filter: Arc<RwLock<Option<String>>>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, name: impl Into<Arc<str>>, shared: Arc<Shared>) -> Self {
        Self {
            id,
            name: name.into(),
            shared,
            filter: Arc::new(RwLock::new(None)),
        }
    }

    /// Directory id of this channel
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Display name, used as the subject of emitted messages
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Emit a record
    ///
    /// Returns the sequence number, or `None` if the record was dropped by
    /// the channel level or the text filter. Errors bypass the filter.
    pub fn emit(
        &self,
        level: LogLevel,
        text: impl Into<String>,
    ) -> Result<Option<u64>, ChannelError> {
        let channel_level = self.level()?;
        if !level.is_visible(channel_level) {
            return Ok(None);
        }

        let message = LogMessage::new(&*self.name, text);
        if !level.is_error()
            && let Some(filter) = self.filter.read().as_deref()
            && !message.matches(filter)
        {
            return Ok(None);
        }

        Ok(Some(self.shared.buffer.append(self.id, level, message)))
    }

    pub fn log_error(&self, text: impl Into<String>) -> Result<Option<u64>, ChannelError> {
        self.emit(LogLevel::Error, text)
    }

    pub fn log_minimal(&self, text: impl Into<String>) -> Result<Option<u64>, ChannelError> {
        self.emit(LogLevel::Minimal, text)
    }

    pub fn log_basic(&self, text: impl Into<String>) -> Result<Option<u64>, ChannelError> {
        self.emit(LogLevel::Basic, text)
    }

    pub fn log_detailed(&self, text: impl Into<String>) -> Result<Option<u64>, ChannelError> {
        self.emit(LogLevel::Detailed, text)
    }

    pub fn log_debug(&self, text: impl Into<String>) -> Result<Option<u64>, ChannelError> {
        self.emit(LogLevel::Debug, text)
    }

    pub fn log_rowlevel(&self, text: impl Into<String>) -> Result<Option<u64>, ChannelError> {
        self.emit(LogLevel::Rowlevel, text)
    }

    /// Current level of this channel
    pub fn level(&self) -> Result<LogLevel, ChannelError> {
        self.shared
            .directory
            .level_of(self.id)
            .ok_or(ChannelError::Removed(self.id))
    }

    /// Change the level of this channel (children keep theirs)
    pub fn set_level(&self, level: LogLevel) -> Result<(), ChannelError> {
        if self.shared.directory.set_level(self.id, level) {
            Ok(())
        } else {
            Err(ChannelError::Removed(self.id))
        }
    }

    /// Only keep non-error records whose text or subject contains `filter`
    ///
    /// An empty filter clears it.
    pub fn set_filter(&self, filter: impl Into<String>) -> Result<(), ChannelError> {
        if self.is_removed() {
            return Err(ChannelError::Removed(self.id));
        }
        let filter = filter.into();
        *self.filter.write() = (!filter.is_empty()).then_some(filter);
        Ok(())
    }

    /// Remove the text filter
    pub fn clear_filter(&self) -> Result<(), ChannelError> {
        self.set_filter(String::new())
    }

    /// The current text filter
    pub fn filter(&self) -> Option<String> {
        self.filter.read().clone()
    }

    /// Whether the directory entry is gone
    pub fn is_removed(&self) -> bool {
        !self.shared.directory.contains(self.id)
    }

    /// Open a child channel under this one
    ///
    /// The descriptor's parent is set to this channel.
    pub fn child(&self, descriptor: ChannelDescriptor) -> Result<Channel, ChannelError> {
        if self.is_removed() {
            return Err(ChannelError::Removed(self.id));
        }
        Ok(self.shared.open(descriptor.with_parent(self.id), false))
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("filter", &*self.filter.read())
            .finish()
    }
}
