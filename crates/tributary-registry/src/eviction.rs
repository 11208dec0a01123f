//! Directory eviction policy

use tributary_core::ChannelId;

/// Size the directory is trimmed to once it exceeds `max_entries`
///
/// Roughly 90% of the limit, never below 110% of the protected count.
pub fn eviction_target(max_entries: usize, protected: usize) -> usize {
    let headroom = max_entries - max_entries / 10;
    let floor = protected + protected.div_ceil(10);
    headroom.max(floor)
}

/// Outcome of one eviction sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Purge-queue entries dropped because their channel no longer exists
    pub pruned: usize,
    /// Channels removed by this sweep, oldest first
    pub removed: Vec<ChannelId>,
    /// Size the sweep aimed for (equals the limit when no trimming was needed)
    pub target: usize,
    /// Directory size after the sweep
    pub remaining: usize,
    /// The sweep ran out of unprotected candidates before reaching its target
    pub stalled: bool,
}

impl EvictionReport {
    /// Number of channels removed
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}
