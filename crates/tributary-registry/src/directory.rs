//! The channel directory

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use tributary_core::{
    ChannelDescriptor, ChannelId, ChannelKind, ChannelRecord, LogLevel, SystemTimeSource,
    TimeSource,
};

use crate::eviction::{EvictionReport, eviction_target};

/// Parent chains deeper than this are treated as malformed
const MAX_PARENT_DEPTH: usize = 256;

/// Outcome of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new channel was allocated
    Created(ChannelId),
    /// An equivalent channel already existed
    Existing(ChannelId),
}

impl Registration {
    /// The channel id, whether new or existing
    pub fn id(self) -> ChannelId {
        match self {
            Registration::Created(id) | Registration::Existing(id) => id,
        }
    }

    /// Whether a new channel was allocated
    pub fn is_created(self) -> bool {
        matches!(self, Registration::Created(_))
    }
}

/// One entry of a logging hierarchy listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHierarchy {
    /// Channel the listing was taken from
    pub root: ChannelId,
    /// A channel in the root's closure (the root itself included)
    pub record: ChannelRecord,
}

/// Candidates for de-duplication share a container, kind and name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FamilyKey {
    container_id: Option<String>,
    kind: ChannelKind,
    name: String,
}

impl FamilyKey {
    fn of(descriptor: &ChannelDescriptor) -> Self {
        Self {
            container_id: descriptor.container_id.clone(),
            kind: descriptor.kind,
            name: descriptor.name.clone(),
        }
    }
}

/// Everything the directory lock guards
///
/// Id allocation, arena insert, index updates and queue insert are not
/// independently atomic; they always happen together under one write lock.
#[derive(Debug, Default)]
struct DirectoryState {
    /// Arena of records
    records: HashMap<ChannelId, ChannelRecord>,
    /// Parent id -> child ids, in registration order
    children: HashMap<ChannelId, Vec<ChannelId>>,
    /// De-duplication candidates
    families: HashMap<FamilyKey, HashSet<ChannelId>>,
    /// Purge candidates, oldest first
    purge_queue: VecDeque<ChannelId>,
    /// Ids currently in `purge_queue`
    queued: HashSet<ChannelId>,
    /// Ids with a drain attached
    protected: HashSet<ChannelId>,
    /// Registrations so far
    registrations: u64,
}

impl DirectoryState {
    /// Find a live channel equivalent to `descriptor`
    fn find_equivalent(&self, descriptor: &ChannelDescriptor) -> Option<ChannelId> {
        if let Some(carried) = descriptor.carried_id
            && self.records.contains_key(&carried)
        {
            return Some(carried);
        }

        let candidates = self.families.get(&FamilyKey::of(descriptor))?;
        candidates.iter().copied().find(|id| {
            self.records.get(id).is_some_and(|record| {
                record.descriptor.same_local_identity(descriptor)
                    && self.parents_equivalent(record.parent(), descriptor.parent, 0)
            })
        })
    }

    /// Recursive parent equality, resolved through the arena
    fn parents_equivalent(
        &self,
        a: Option<ChannelId>,
        b: Option<ChannelId>,
        depth: usize,
    ) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) if a == b => true,
            (Some(a), Some(b)) => {
                if depth >= MAX_PARENT_DEPTH {
                    return false;
                }
                match (self.records.get(&a), self.records.get(&b)) {
                    (Some(ra), Some(rb)) => {
                        ra.descriptor.same_local_identity(&rb.descriptor)
                            && self.parents_equivalent(ra.parent(), rb.parent(), depth + 1)
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Root plus all live descendants, breadth first
    fn closure(&self, root: ChannelId) -> Vec<ChannelId> {
        if !self.records.contains_key(&root) {
            return Vec::new();
        }

        let mut visited = HashSet::from([root]);
        let mut closure = vec![root];
        let mut frontier = VecDeque::from([root]);

        while let Some(id) = frontier.pop_front() {
            let Some(kids) = self.children.get(&id) else {
                continue;
            };
            for &kid in kids {
                if self.records.contains_key(&kid) && visited.insert(kid) {
                    closure.push(kid);
                    frontier.push_back(kid);
                }
            }
        }

        closure
    }

    /// Whether `id` or one of its ancestors has a drain attached
    fn is_shielded(&self, id: ChannelId) -> bool {
        let mut current = Some(id);
        let mut depth = 0;
        while let Some(cid) = current {
            if self.protected.contains(&cid) {
                return true;
            }
            if depth >= MAX_PARENT_DEPTH {
                return false;
            }
            current = self.records.get(&cid).and_then(|r| r.parent());
            depth += 1;
        }
        false
    }

    fn enqueue(&mut self, id: ChannelId) {
        if self.queued.insert(id) {
            self.purge_queue.push_back(id);
        }
    }

    fn set_protected(&mut self, id: ChannelId, protected: bool) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        record.protected = protected;
        if protected {
            self.protected.insert(id);
        } else {
            self.protected.remove(&id);
            self.enqueue(id);
        }
        true
    }

    /// Drop one record from the arena and every index except the purge
    /// queue and other parents' child lists; callers fix those up in batch.
    fn detach(&mut self, id: ChannelId) -> Option<ChannelRecord> {
        let record = self.records.remove(&id)?;

        let key = FamilyKey::of(&record.descriptor);
        if let Some(family) = self.families.get_mut(&key) {
            let was_indexed = family.remove(&id);
            debug_assert!(was_indexed, "channel {id} missing from its family index");
            if family.is_empty() {
                self.families.remove(&key);
            }
        }

        self.protected.remove(&id);
        self.queued.remove(&id);
        self.children.remove(&id);
        Some(record)
    }

    /// Drop purge-queue entries whose channel no longer exists
    fn prune_queue(&mut self) -> usize {
        let before = self.purge_queue.len();
        let records = &self.records;
        self.purge_queue.retain(|id| records.contains_key(id));
        self.queued.retain(|id| records.contains_key(id));
        before - self.purge_queue.len()
    }

    /// Remove children-index entries that point at or from missing records
    fn reconcile_orphans(&mut self) {
        let records = &self.records;
        self.children.retain(|parent, kids| {
            if !records.contains_key(parent) {
                return false;
            }
            kids.retain(|kid| records.contains_key(kid));
            !kids.is_empty()
        });
    }
}

/// Registry of channels keyed by id
///
/// Thread-safe; share it behind an `Arc`. Registration takes a single write
/// lock for the whole equality scan plus insert, which serializes it
/// against eviction of the same entries. Reads take a shared lock.
pub struct ChannelDirectory {
    state: RwLock<DirectoryState>,
    default_level: LogLevel,
    time: Arc<dyn TimeSource>,
}

impl ChannelDirectory {
    /// Create an empty directory
    ///
    /// Root channels registered without an explicit level get `default_level`.
    pub fn new(default_level: LogLevel) -> Self {
        Self::with_time_source(default_level, Arc::new(SystemTimeSource))
    }

    /// Create an empty directory stamping records from `time`
    pub fn with_time_source(default_level: LogLevel, time: Arc<dyn TimeSource>) -> Self {
        Self {
            state: RwLock::new(DirectoryState::default()),
            default_level,
            time,
        }
    }

    /// Register a channel, returning its id
    ///
    /// Idempotent: an equivalent identity in the same container family (same
    /// kind, name, copy index, location and recursively-equal parent), or a
    /// still-registered carried id, yields the existing id.
    pub fn register(&self, descriptor: ChannelDescriptor, protect: bool) -> ChannelId {
        self.register_with_outcome(descriptor, protect).id()
    }

    /// Register a channel, reporting whether it was newly created
    ///
    /// With `protect`, the channel (new or existing) is exempt from eviction
    /// until [`release_protection`](Self::release_protection).
    pub fn register_with_outcome(
        &self,
        descriptor: ChannelDescriptor,
        protect: bool,
    ) -> Registration {
        let mut state = self.state.write();

        if let Some(existing) = state.find_equivalent(&descriptor) {
            if protect {
                state.set_protected(existing, true);
            }
            drop(state);
            trace!(channel = %existing.short_id(), name = %descriptor.name, "Channel already registered");
            return Registration::Existing(existing);
        }

        let id = ChannelId::new();
        let parent = descriptor.parent;
        let level = descriptor
            .level
            .or_else(|| parent.and_then(|p| state.records.get(&p)).map(|r| r.level))
            .unwrap_or(self.default_level);

        let kind = descriptor.kind;
        let name = descriptor.name.clone();
        let family = FamilyKey::of(&descriptor);
        let record = ChannelRecord {
            id,
            descriptor,
            level,
            created_at: self.time.now_utc(),
            registration: state.registrations,
            protected: protect,
        };
        state.registrations += 1;

        state.records.insert(id, record);
        state.families.entry(family).or_default().insert(id);
        // An unknown parent gets no children entry; the back-reference stays
        let linked = match parent {
            Some(parent) if state.records.contains_key(&parent) => {
                state.children.entry(parent).or_default().push(id);
                true
            }
            _ => false,
        };
        if protect {
            state.protected.insert(id);
        } else {
            state.enqueue(id);
        }
        drop(state);

        debug!(
            channel = %id.short_id(),
            %kind,
            %name,
            parent = ?parent.map(|p| p.short_id()),
            linked,
            %level,
            protect,
            "Registered channel"
        );
        Registration::Created(id)
    }

    /// Look up a channel
    pub fn lookup(&self, id: ChannelId) -> Option<ChannelRecord> {
        self.state.read().records.get(&id).cloned()
    }

    /// Whether a channel is registered
    pub fn contains(&self, id: ChannelId) -> bool {
        self.state.read().records.contains_key(&id)
    }

    /// Effective level of a channel
    pub fn level_of(&self, id: ChannelId) -> Option<LogLevel> {
        self.state.read().records.get(&id).map(|r| r.level)
    }

    /// Change the level of a channel; returns `false` if it is not registered
    pub fn set_level(&self, id: ChannelId, level: LogLevel) -> bool {
        let mut state = self.state.write();
        match state.records.get_mut(&id) {
            Some(record) => {
                record.level = level;
                true
            }
            None => false,
        }
    }

    /// The root plus every live descendant
    ///
    /// Empty if the root is not registered. Traversal tracks visited ids, so
    /// a malformed (cyclic) index cannot recurse without bound.
    pub fn children_closure(&self, root: ChannelId) -> Vec<ChannelId> {
        self.state.read().closure(root)
    }

    /// The closure as records, paired with the root
    pub fn hierarchy(&self, root: ChannelId) -> Vec<ChannelHierarchy> {
        let state = self.state.read();
        state
            .closure(root)
            .into_iter()
            .filter_map(|id| state.records.get(&id).cloned())
            .map(|record| ChannelHierarchy { root, record })
            .collect()
    }

    /// Remove a channel and its whole closure
    ///
    /// Returns the removed ids (root first); empty if the root was unknown.
    pub fn remove_subtree(&self, root: ChannelId) -> Vec<ChannelId> {
        let mut state = self.state.write();
        let closure = state.closure(root);
        if closure.is_empty() {
            return closure;
        }

        for &id in &closure {
            state.detach(id);
        }
        state.prune_queue();
        state.reconcile_orphans();
        let remaining = state.records.len();
        drop(state);

        debug!(
            root = %root.short_id(),
            removed = closure.len(),
            remaining,
            "Removed channel subtree"
        );

        closure
    }

    /// Exempt a channel (and its descendants) from eviction
    ///
    /// Returns `false` if the channel is not registered.
    pub fn attach_protection(&self, id: ChannelId) -> bool {
        let attached = self.state.write().set_protected(id, true);
        if attached {
            debug!(channel = %id.short_id(), "Protection attached");
        }
        attached
    }

    /// Protect a channel, reporting whether it was already protected
    ///
    /// The check and the update happen under one lock. `None` if the
    /// channel is not registered.
    pub fn acquire_protection(&self, id: ChannelId) -> Option<bool> {
        let was_protected = {
            let mut state = self.state.write();
            let was_protected = state.records.get(&id)?.protected;
            if !was_protected {
                state.set_protected(id, true);
            }
            was_protected
        };
        if !was_protected {
            debug!(channel = %id.short_id(), "Protection attached");
        }
        Some(was_protected)
    }

    /// Make a channel evictable again
    ///
    /// The channel rejoins the purge queue as its newest candidate. Returns
    /// `false` if the channel is not registered.
    pub fn release_protection(&self, id: ChannelId) -> bool {
        let released = self.state.write().set_protected(id, false);
        if released {
            debug!(channel = %id.short_id(), "Protection released");
        }
        released
    }

    /// One eviction sweep
    ///
    /// Prunes stale purge-queue entries, then, if the directory holds more
    /// than `max_entries`, removes the oldest unshielded candidates until it
    /// reaches [`eviction_target`] or runs out of candidates. Never fails:
    /// an unreachable target is reported and retried next sweep.
    pub fn run_eviction(&self, max_entries: usize) -> EvictionReport {
        let mut state = self.state.write();
        let pruned = state.prune_queue();

        let size = state.records.len();
        if size <= max_entries {
            return EvictionReport {
                pruned,
                removed: Vec::new(),
                target: max_entries,
                remaining: size,
                stalled: false,
            };
        }

        let protected = state.protected.len();
        let target = eviction_target(max_entries, protected);

        let mut removed = Vec::new();
        let mut skipped = Vec::new();
        while state.records.len() > target {
            let Some(candidate) = state.purge_queue.pop_front() else {
                break;
            };
            if state.is_shielded(candidate) {
                skipped.push(candidate);
                continue;
            }
            if state.detach(candidate).is_some() {
                removed.push(candidate);
            }
        }

        // Shielded candidates keep their place at the front of the queue
        for id in skipped.into_iter().rev() {
            state.purge_queue.push_front(id);
        }
        state.reconcile_orphans();

        let remaining = state.records.len();
        drop(state);
        let stalled = remaining > target || remaining > max_entries;

        if stalled {
            warn!(
                size = remaining,
                max_entries,
                target,
                protected,
                "Channel directory over its limit; too many protected channels, retrying next sweep"
            );
        } else {
            debug!(
                removed = removed.len(),
                pruned,
                remaining,
                target,
                "Channel directory eviction complete"
            );
        }

        EvictionReport {
            pruned,
            removed,
            target,
            remaining,
            stalled,
        }
    }

    /// Number of registered channels
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Whether the directory is empty
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Number of channels with a drain attached
    pub fn protected_count(&self) -> usize {
        self.state.read().protected.len()
    }

    /// Number of purge candidates queued
    pub fn candidate_count(&self) -> usize {
        self.state.read().purge_queue.len()
    }

    /// All records, oldest first (registry dump)
    pub fn snapshot(&self) -> Vec<ChannelRecord> {
        let mut records: Vec<_> = self.state.read().records.values().cloned().collect();
        records.sort_by_key(|r| r.registration);
        records
    }

    /// Default level for root channels
    pub fn default_level(&self) -> LogLevel {
        self.default_level
    }
}

impl Default for ChannelDirectory {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl std::fmt::Debug for ChannelDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ChannelDirectory")
            .field("channels", &state.records.len())
            .field("protected", &state.protected.len())
            .field("candidates", &state.purge_queue.len())
            .field("default_level", &self.default_level)
            .finish()
    }
}
