//! Long-lived consumers
//!
//! A drain is what a file writer or remote log endpoint holds while it
//! follows one execution: the subtree it follows is shielded from eviction
//! and each poll returns only what arrived since the previous one.

use std::fmt;
use std::sync::Arc;

use tributary_buffer::EventFormatter;
use tributary_core::{ChannelId, LogEvent};

use crate::service::Shared;

/// Incremental reader over one root's closure
///
/// Dropping the drain releases the protection it attached.
pub struct LogDrain {
    shared: Arc<Shared>,
    root: ChannelId,
    include_unscoped: bool,
    /// Highest sequence already covered by a poll
    last_sequence: u64,
}

impl LogDrain {
    pub(crate) fn new(shared: Arc<Shared>, root: ChannelId, include_unscoped: bool) -> Self {
        Self {
            shared,
            root,
            include_unscoped,
            last_sequence: 0,
        }
    }

    /// Events for the closure appended since the previous poll
    ///
    /// The first poll returns everything still buffered. Events evicted
    /// before a poll are lost to it.
    pub fn poll(&mut self) -> Vec<Arc<LogEvent>> {
        let upto = self.shared.buffer.highest_sequence();
        if upto <= self.last_sequence {
            return Vec::new();
        }
        let from = self.last_sequence + 1;
        self.last_sequence = upto;

        match self.shared.closure_query(self.root, self.include_unscoped) {
            Some(query) => self.shared.buffer.query(&query.between(from, upto)),
            None => Vec::new(),
        }
    }

    /// Like [`poll`](Self::poll), formatted one line per event
    pub fn poll_rendered(&mut self, formatter: &dyn EventFormatter) -> String {
        let mut out = String::new();
        for event in self.poll() {
            out.push_str(&formatter.format(&event));
            out.push('\n');
        }
        out
    }

    /// Root channel this drain follows
    pub fn root(&self) -> ChannelId {
        self.root
    }

    pub fn include_unscoped(&self) -> bool {
        self.include_unscoped
    }

    /// Highest sequence covered so far
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Whether the root is still registered
    pub fn is_attached(&self) -> bool {
        self.shared.directory.contains(self.root)
    }
}

impl Drop for LogDrain {
    fn drop(&mut self) {
        self.shared.release_drain(self.root);
    }
}

impl fmt::Debug for LogDrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogDrain")
            .field("root", &self.root)
            .field("include_unscoped", &self.include_unscoped)
            .field("last_sequence", &self.last_sequence)
            .finish()
    }
}
