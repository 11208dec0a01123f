//! The log service
//!
//! [`LogService`] owns one [`ChannelDirectory`] and one [`EventBuffer`] and
//! is injected into producers and consumers. Construct it with limits,
//! `start` the maintenance task inside a tokio runtime, and `shutdown` it
//! when done. Tests build a fresh instance each time.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tributary_buffer::{EventBuffer, EventFormatter, EventListener, EventQuery, ListenerId};
use tributary_core::{ChannelDescriptor, ChannelId, LogEvent, SystemTimeSource, TimeSource};
use tributary_registry::ChannelDirectory;

use crate::channel::Channel;
use crate::config::LogServiceConfig;
use crate::drain::LogDrain;
use crate::error::{ServiceError, ServiceResult};
use crate::maintenance::{MaintenanceReport, MaintenanceTask, SweepPermit};

/// Drain bookkeeping for one root
struct DrainState {
    count: usize,
    /// Protection was attached by the first drain, not by registration
    owns_protection: bool,
}

/// State shared by the service, its channels, drains and maintenance task
pub(crate) struct Shared {
    pub(crate) config: LogServiceConfig,
    pub(crate) directory: ChannelDirectory,
    pub(crate) buffer: Arc<EventBuffer>,
    pub(crate) time: Arc<dyn TimeSource>,
    pub(crate) sweeping: AtomicBool,
    drains: Mutex<HashMap<ChannelId, DrainState>>,
}

impl Shared {
    /// Register (or find) a channel and hand out a producer handle
    ///
    /// A protected registration of a channel a drain already protects takes
    /// that protection over, so the last drain leaves it in place.
    pub(crate) fn open(self: &Arc<Self>, descriptor: ChannelDescriptor, protect: bool) -> Channel {
        let unscoped = descriptor.kind.is_unscoped();
        let name = descriptor.name.clone();
        let id = if protect {
            let mut drains = self.drains.lock();
            let id = self.directory.register(descriptor, true);
            if let Some(state) = drains.get_mut(&id) {
                state.owns_protection = false;
            }
            id
        } else {
            self.directory.register(descriptor, false)
        };
        if unscoped {
            self.buffer.mark_unscoped(id);
        }
        Channel::new(id, name, Arc::clone(self))
    }

    /// Count a drain on `root`, protecting it on the first one
    pub(crate) fn retain_drain(&self, root: ChannelId) -> bool {
        let mut drains = self.drains.lock();
        if let Some(state) = drains.get_mut(&root) {
            state.count += 1;
            return true;
        }
        let Some(was_protected) = self.directory.acquire_protection(root) else {
            return false;
        };
        let owns_protection = !was_protected;
        drains.insert(
            root,
            DrainState {
                count: 1,
                owns_protection,
            },
        );
        true
    }

    /// Drop a drain on `root`, releasing protection with the last one
    pub(crate) fn release_drain(&self, root: ChannelId) {
        let mut drains = self.drains.lock();
        let Some(state) = drains.get_mut(&root) else {
            return;
        };
        state.count -= 1;
        if state.count == 0 {
            let owned = state.owns_protection;
            drains.remove(&root);
            if owned {
                self.directory.release_protection(root);
            }
        }
    }

    pub(crate) fn closure_query(
        &self,
        root: ChannelId,
        include_unscoped: bool,
    ) -> Option<EventQuery> {
        let closure = self.directory.children_closure(root);
        if closure.is_empty() {
            return None;
        }
        Some(EventQuery::for_channels(closure).with_unscoped(include_unscoped))
    }
}

/// In-process log aggregation service
pub struct LogService {
    shared: Arc<Shared>,
    /// The protected general channel
    general: ChannelId,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Background task handles
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Whether the maintenance task is running
    started: AtomicBool,
}

impl LogService {
    /// Create a service with the given limits
    ///
    /// The configuration is validated; the protected general channel is
    /// registered immediately.
    pub fn new(config: LogServiceConfig) -> ServiceResult<Self> {
        Self::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Create a service stamping channels and events from `time`
    pub fn with_time_source(
        config: LogServiceConfig,
        time: Arc<dyn TimeSource>,
    ) -> ServiceResult<Self> {
        config.validate()?;

        let directory = ChannelDirectory::with_time_source(config.default_level, Arc::clone(&time));
        let buffer = Arc::new(EventBuffer::with_time_source(
            config.max_buffered_events,
            Arc::clone(&time),
        ));
        let general = directory.register(ChannelDescriptor::general(), true);
        buffer.mark_unscoped(general);

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            max_registry_entries = config.max_registry_entries,
            max_buffered_events = config.max_buffered_events,
            max_event_age_secs = config.max_event_age.as_secs(),
            default_level = %config.default_level,
            "Log service created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                directory,
                buffer,
                time,
                sweeping: AtomicBool::new(false),
                drains: Mutex::new(HashMap::new()),
            }),
            general,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Start the maintenance task on the current tokio runtime
    pub fn start(&self) -> ServiceResult<()> {
        let handle = Handle::try_current().map_err(|e| ServiceError::NoRuntime(e.to_string()))?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyStarted);
        }

        let task = MaintenanceTask::spawn(
            &handle,
            Arc::clone(&self.shared),
            self.shutdown_tx.subscribe(),
        );
        self.tasks.lock().push(task);

        info!("Log service started");
        Ok(())
    }

    /// Stop the maintenance task and wait for it to finish
    ///
    /// A sweep already running on the blocking pool completes on its own.
    pub async fn shutdown(&self) -> ServiceResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let _ = self.shutdown_tx.send(());

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.await.map_err(|e| ServiceError::Task(e.to_string()))?;
        }

        info!("Log service stopped");
        Ok(())
    }

    /// Whether the maintenance task is running
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Run one sweep now, on the calling thread
    ///
    /// Returns `None` if a sweep is already running.
    pub fn run_maintenance(&self) -> Option<MaintenanceReport> {
        SweepPermit::acquire(&self.shared).map(SweepPermit::run)
    }

    /// Producer handle for a channel, registering it if needed
    pub fn channel(&self, descriptor: ChannelDescriptor) -> Channel {
        self.shared.open(descriptor, false)
    }

    /// Producer handle for a channel exempt from eviction
    pub fn protected_channel(&self, descriptor: ChannelDescriptor) -> Channel {
        self.shared.open(descriptor, true)
    }

    /// Producer handle for the general (unscoped) channel
    pub fn general_channel(&self) -> Channel {
        let name = self
            .shared
            .directory
            .lookup(self.general)
            .map(|record| record.descriptor.name)
            .unwrap_or_else(|| ChannelDescriptor::general().name);
        Channel::new(self.general, name, Arc::clone(&self.shared))
    }

    /// Id of the general channel
    pub fn general_channel_id(&self) -> ChannelId {
        self.general
    }

    /// Remove a channel and its descendants, reclaiming their events
    ///
    /// The general channel cannot be removed. Returns the removed ids.
    pub fn remove_subtree(&self, root: ChannelId) -> Vec<ChannelId> {
        if root == self.general {
            debug!("Ignoring removal of the general channel");
            return Vec::new();
        }
        let removed = self.shared.directory.remove_subtree(root);
        if !removed.is_empty() {
            let ids: HashSet<ChannelId> = removed.iter().copied().collect();
            let evicted = self.shared.buffer.evict_channels(&ids);
            debug!(
                root = %root.short_id(),
                channels = removed.len(),
                evicted,
                "Removed channel subtree"
            );
        }
        removed
    }

    /// Events of `root`'s closure within `from..=to`
    ///
    /// Empty if `root` is not registered.
    pub fn events_for(
        &self,
        root: ChannelId,
        include_unscoped: bool,
        from: u64,
        to: u64,
    ) -> Vec<Arc<LogEvent>> {
        match self.shared.closure_query(root, include_unscoped) {
            Some(query) => self.shared.buffer.query(&query.between(from, to)),
            None => Vec::new(),
        }
    }

    /// The full buffered log of `root`'s closure as text
    pub fn render_log(
        &self,
        root: ChannelId,
        include_unscoped: bool,
        formatter: &dyn EventFormatter,
    ) -> String {
        match self.shared.closure_query(root, include_unscoped) {
            Some(query) => self.shared.buffer.render(&query, formatter),
            None => String::new(),
        }
    }

    /// Attach a long-lived consumer to `root`
    ///
    /// `root` and its descendants are exempt from eviction until the last
    /// drain on it is dropped. `None` if `root` is not registered.
    pub fn attach_drain(&self, root: ChannelId, include_unscoped: bool) -> Option<LogDrain> {
        if !self.shared.retain_drain(root) {
            return None;
        }
        Some(LogDrain::new(Arc::clone(&self.shared), root, include_unscoped))
    }

    /// Register an append listener on the buffer
    pub fn add_listener<L>(&self, listener: L) -> ListenerId
    where
        L: EventListener + 'static,
    {
        self.shared.buffer.add_listener(listener)
    }

    /// Remove an append listener
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.buffer.remove_listener(id)
    }

    /// The channel directory
    pub fn directory(&self) -> &ChannelDirectory {
        &self.shared.directory
    }

    /// The event buffer, for adapters that bypass [`Channel`]
    pub fn buffer(&self) -> &EventBuffer {
        &self.shared.buffer
    }

    /// Owned handle to the event buffer, e.g. for a tracing bridge layer
    pub fn shared_buffer(&self) -> Arc<EventBuffer> {
        Arc::clone(&self.shared.buffer)
    }

    /// The service configuration
    pub fn config(&self) -> &LogServiceConfig {
        &self.shared.config
    }
}

impl Drop for LogService {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl fmt::Debug for LogService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogService")
            .field("config", &self.shared.config)
            .field("channels", &self.shared.directory.len())
            .field("events", &self.shared.buffer.len())
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tributary_buffer::PlainFormatter;
    use tributary_core::{ChannelKind, LogLevel, ManualTimeSource};

    fn service() -> LogService {
        LogService::new(LogServiceConfig::testing()).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let err = LogService::new(LogServiceConfig::default().with_max_buffered_events(0));
        assert!(matches!(err, Err(ServiceError::Config(_))));
    }

    #[test]
    fn test_general_channel_is_protected_and_unscoped() {
        let svc = service();
        let general = svc.general_channel();
        assert_eq!(general.id(), svc.general_channel_id());
        assert_eq!(general.name(), "General");
        assert!(svc.buffer().is_unscoped(general.id()));
        assert!(svc.directory().lookup(general.id()).unwrap().protected);
        assert!(svc.remove_subtree(general.id()).is_empty());
        assert!(svc.directory().contains(general.id()));
    }

    #[test]
    fn test_closure_scenario() {
        let svc = service();
        let a = svc.channel(ChannelDescriptor::new(ChannelKind::Pipeline, "A"));
        let b = svc.channel(
            ChannelDescriptor::new(ChannelKind::Stage, "S")
                .with_parent(a.id())
                .with_copy_index(0),
        );
        let c = svc.channel(
            ChannelDescriptor::new(ChannelKind::Stage, "S")
                .with_parent(a.id())
                .with_copy_index(1),
        );
        assert_ne!(b.id(), c.id());

        let mut closure = svc.directory().children_closure(a.id());
        closure.sort();
        let mut expected = vec![a.id(), b.id(), c.id()];
        expected.sort();
        assert_eq!(closure, expected);

        for i in 0..3 {
            b.log_basic(format!("b{i}")).unwrap();
        }
        for i in 0..2 {
            c.log_basic(format!("c{i}")).unwrap();
        }
        svc.general_channel().log_basic("noise").unwrap();

        let query = EventQuery::for_channels([b.id(), c.id()])
            .between(1, svc.buffer().highest_sequence());
        let events = svc.buffer().query(&query);
        assert_eq!(events.len(), 5);
        assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));

        assert_eq!(svc.events_for(a.id(), false, 1, u64::MAX).len(), 5);
        assert_eq!(svc.events_for(a.id(), true, 1, u64::MAX).len(), 6);
    }

    #[test]
    fn test_unknown_root_yields_nothing() {
        let svc = service();
        svc.general_channel().log_basic("x").unwrap();
        let missing = ChannelId::new();
        assert!(svc.events_for(missing, true, 0, u64::MAX).is_empty());
        assert!(svc.render_log(missing, true, &PlainFormatter::default()).is_empty());
        assert!(svc.attach_drain(missing, false).is_none());
    }

    #[test]
    fn test_remove_subtree_reclaims_events() {
        let svc = service();
        let root = svc.channel(ChannelDescriptor::new(ChannelKind::Job, "job"));
        let step = svc.channel(ChannelDescriptor::new(ChannelKind::JobStep, "step").with_parent(root.id()));
        root.log_basic("start").unwrap();
        step.log_basic("run").unwrap();
        svc.general_channel().log_basic("keep").unwrap();

        let removed = svc.remove_subtree(root.id());
        assert_eq!(removed.len(), 2);
        assert_eq!(svc.buffer().len(), 1);
        assert!(svc.directory().lookup(root.id()).is_none());
        assert!(svc.directory().children_closure(root.id()).is_empty());
    }

    #[test]
    fn test_render_log() {
        let svc = service();
        let root = svc.channel(ChannelDescriptor::new(ChannelKind::Pipeline, "load"));
        root.log_basic("started").unwrap();
        root.log_error("failed").unwrap();

        let text = svc.render_log(root.id(), false, &PlainFormatter::without_timestamp());
        assert_eq!(text, "load - started\nload - ERROR: failed\n");
    }

    #[test]
    fn test_run_maintenance_bounds_directory() {
        let svc = LogService::new(LogServiceConfig::testing().with_max_registry_entries(20)).unwrap();
        for i in 0..50 {
            svc.channel(ChannelDescriptor::new(ChannelKind::Connection, format!("db-{i}")));
        }

        let report = svc.run_maintenance().unwrap();
        assert!(!report.registry.stalled);
        assert!(report.registry.removed_count() > 0);
        assert!(svc.directory().len() <= 20);
        assert!(svc.directory().contains(svc.general_channel_id()));
    }

    #[test]
    fn test_run_maintenance_ages_events() {
        let time = Arc::new(ManualTimeSource::default());
        let config = LogServiceConfig::testing().with_max_event_age(Duration::from_secs(60));
        let svc = LogService::with_time_source(config, time.clone()).unwrap();
        let general = svc.general_channel();

        general.log_basic("old").unwrap();
        time.advance(chrono::Duration::seconds(120));
        general.log_basic("new").unwrap();

        let report = svc.run_maintenance().unwrap();
        assert_eq!(report.aged_events, 1);
        let left = svc.buffer().query(&EventQuery::all());
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].message.text, "new");
    }

    #[test]
    fn test_overlapping_sweeps_are_refused() {
        let svc = service();
        let permit = SweepPermit::acquire(&svc.shared).unwrap();
        assert!(svc.run_maintenance().is_none());
        drop(permit);
        assert!(svc.run_maintenance().is_some());
    }

    #[test]
    fn test_drain_shields_subtree() {
        let svc = LogService::new(LogServiceConfig::testing().with_max_registry_entries(10)).unwrap();
        let root = svc.channel(ChannelDescriptor::new(ChannelKind::Pipeline, "kept"));
        let stage = svc.channel(ChannelDescriptor::new(ChannelKind::Stage, "kept stage").with_parent(root.id()));
        let drain = svc.attach_drain(root.id(), false).unwrap();

        for i in 0..40 {
            svc.channel(ChannelDescriptor::new(ChannelKind::Connection, format!("db-{i}")));
        }
        svc.run_maintenance().unwrap();
        assert!(svc.directory().contains(root.id()));
        assert!(svc.directory().contains(stage.id()));

        drop(drain);
        assert!(!svc.directory().lookup(root.id()).unwrap().protected);
    }

    #[test]
    fn test_drain_refcount_and_registration_protection() {
        let svc = service();
        let root = svc.channel(ChannelDescriptor::new(ChannelKind::Job, "job"));
        let first = svc.attach_drain(root.id(), false).unwrap();
        let second = svc.attach_drain(root.id(), false).unwrap();
        drop(first);
        assert!(svc.directory().lookup(root.id()).unwrap().protected);
        drop(second);
        assert!(!svc.directory().lookup(root.id()).unwrap().protected);

        // Protection from registration survives drains coming and going
        let pinned = svc.protected_channel(ChannelDescriptor::new(ChannelKind::Job, "pinned"));
        drop(svc.attach_drain(pinned.id(), false).unwrap());
        assert!(svc.directory().lookup(pinned.id()).unwrap().protected);
    }

    #[test]
    fn test_registration_protection_while_drained() {
        let svc = service();
        let descriptor = ChannelDescriptor::new(ChannelKind::Job, "nightly");
        let job = svc.channel(descriptor.clone());
        let drain = svc.attach_drain(job.id(), false).unwrap();

        // Protected registration of the same unit while the drain holds it
        let pinned = svc.protected_channel(descriptor);
        assert_eq!(pinned.id(), job.id());

        drop(drain);
        assert!(svc.directory().lookup(job.id()).unwrap().protected);
    }

    #[test]
    fn test_concurrent_drain_and_protected_registration() {
        const ROUNDS: usize = 200;
        let svc = service();

        for round in 0..ROUNDS {
            let descriptor = ChannelDescriptor::new(ChannelKind::Job, format!("job-{round}"));
            let id = svc.channel(descriptor.clone()).id();
            let barrier = std::sync::Barrier::new(2);

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    drop(svc.attach_drain(id, false));
                });
                scope.spawn(|| {
                    barrier.wait();
                    svc.protected_channel(descriptor);
                });
            });

            assert!(
                svc.directory().lookup(id).unwrap().protected,
                "round {round}: registration protection was released by a drain"
            );
        }
    }

    #[test]
    fn test_listeners_via_service() {
        let svc = service();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = svc.add_listener(move |event: &LogEvent| sink.lock().push(event.sequence));

        let seq = svc.general_channel().log_basic("x").unwrap();
        assert_eq!(*seen.lock(), vec![seq.unwrap()]);
        assert!(svc.remove_listener(id));
    }

    #[test]
    fn test_default_level_inherited() {
        let svc = LogService::new(LogServiceConfig::testing().with_default_level(LogLevel::Minimal)).unwrap();
        let root = svc.channel(ChannelDescriptor::new(ChannelKind::Pipeline, "p"));
        let child = svc.channel(ChannelDescriptor::new(ChannelKind::Stage, "s").with_parent(root.id()));
        assert_eq!(root.level().unwrap(), LogLevel::Minimal);
        assert_eq!(child.level().unwrap(), LogLevel::Minimal);
    }
}
