//! Background maintenance
//!
//! One sweep = directory eviction followed by buffer age eviction. Sweeps
//! run on the blocking pool, driven by a fixed interval. At most one sweep
//! runs at a time: a tick that finds the previous sweep still running is
//! skipped.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};
use tributary_registry::EvictionReport;

use crate::service::Shared;

/// Outcome of one maintenance sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Directory eviction outcome
    pub registry: EvictionReport,
    /// Events removed for exceeding the age bound
    pub aged_events: usize,
    /// Wall time the sweep took
    pub elapsed: Duration,
}

/// Exclusive right to run one sweep
///
/// Clears the busy flag when dropped, including on unwind.
pub(crate) struct SweepPermit {
    shared: Arc<Shared>,
}

impl SweepPermit {
    /// Acquire the permit, or `None` if a sweep is already running
    pub(crate) fn acquire(shared: &Arc<Shared>) -> Option<Self> {
        shared
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                shared: Arc::clone(shared),
            })
    }

    /// Run the sweep, consuming the permit
    pub(crate) fn run(self) -> MaintenanceReport {
        let started = Instant::now();
        let shared = &self.shared;

        let registry = shared
            .directory
            .run_eviction(shared.config.max_registry_entries);
        for id in &registry.removed {
            shared.buffer.unmark_unscoped(*id);
        }

        let now = shared.time.now_utc();
        let aged_events = chrono::Duration::from_std(shared.config.max_event_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .map(|cutoff| shared.buffer.evict_older_than(cutoff))
            .unwrap_or(0);

        let report = MaintenanceReport {
            registry,
            aged_events,
            elapsed: started.elapsed(),
        };
        debug!(
            pruned = report.registry.pruned,
            removed = report.registry.removed_count(),
            remaining = report.registry.remaining,
            aged_events,
            elapsed_us = report.elapsed.as_micros() as u64,
            "Maintenance sweep finished"
        );
        report
    }
}

impl Drop for SweepPermit {
    fn drop(&mut self) {
        self.shared.sweeping.store(false, Ordering::Release);
    }
}

/// Periodic driver of maintenance sweeps
pub(crate) struct MaintenanceTask {
    shared: Arc<Shared>,
    interval: Duration,
    shutdown_rx: broadcast::Receiver<()>,
    cycle_count: u64,
}

impl MaintenanceTask {
    /// Spawn the task on `handle`
    pub(crate) fn spawn(
        handle: &Handle,
        shared: Arc<Shared>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let task = Self {
            interval: shared.config.purge_interval,
            shared,
            shutdown_rx,
            cycle_count: 0,
        };
        handle.spawn(async move {
            task.run().await;
        })
    }

    async fn run(mut self) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Maintenance task started"
        );

        let first = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(first, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!(cycles = self.cycle_count, "Maintenance task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.cycle_count += 1;
                    self.tick();
                }
            }
        }
    }

    fn tick(&self) {
        let Some(permit) = SweepPermit::acquire(&self.shared) else {
            debug!(cycle = self.cycle_count, "Previous sweep still running, skipping tick");
            return;
        };
        let cycle = self.cycle_count;
        // Detached; the permit releases the busy flag when the sweep ends
        tokio::task::spawn_blocking(move || {
            let report = permit.run();
            trace!(cycle, removed = report.registry.removed_count(), "Sweep cycle done");
        });
    }
}
