//! Query parameters for the event buffer

use std::collections::HashSet;

use tributary_core::ChannelId;

/// What to read from an [`EventBuffer`](crate::EventBuffer)
///
/// Defaults to every event in the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Channels to include; empty means no channel filter
    pub channel_ids: HashSet<ChannelId>,
    /// Also include unscoped (general) channels when filtering by channel
    pub include_unscoped: bool,
    /// Lowest sequence to return (inclusive)
    pub from: u64,
    /// Highest sequence to return (inclusive)
    pub to: u64,
    /// Return only the last N matches (0 = no limit)
    pub tail_limit: usize,
    /// Cursor key for resumable tail reads
    pub tail_cursor_key: Option<String>,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            channel_ids: HashSet::new(),
            include_unscoped: false,
            from: 0,
            to: u64::MAX,
            tail_limit: 0,
            tail_cursor_key: None,
        }
    }
}

impl EventQuery {
    /// Every event, no filter
    pub fn all() -> Self {
        Self::default()
    }

    /// Events from the given channels
    pub fn for_channels(ids: impl IntoIterator<Item = ChannelId>) -> Self {
        Self {
            channel_ids: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Also admit unscoped channels
    pub fn with_unscoped(mut self, include: bool) -> Self {
        self.include_unscoped = include;
        self
    }

    /// Restrict to `from..=to`
    pub fn between(mut self, from: u64, to: u64) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Restrict to sequences at or after `from`
    pub fn since(mut self, from: u64) -> Self {
        self.from = from;
        self
    }

    /// Return only the last `limit` matches
    pub fn tail(mut self, limit: usize) -> Self {
        self.tail_limit = limit;
        self
    }

    /// Return only the last `limit` matches, resuming under `key`
    pub fn tail_with_cursor(mut self, limit: usize, key: impl Into<String>) -> Self {
        self.tail_limit = limit;
        self.tail_cursor_key = Some(key.into());
        self
    }

    /// Whether this query filters by channel
    pub fn is_filtered(&self) -> bool {
        !self.channel_ids.is_empty()
    }

    /// The cursor key, if this is a resumable tail read
    pub fn cursor_key(&self) -> Option<&str> {
        if self.tail_limit == 0 {
            return None;
        }
        self.tail_cursor_key.as_deref().filter(|key| !key.is_empty())
    }
}
