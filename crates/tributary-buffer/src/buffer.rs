//! The shared event buffer
//!
//! Events live in a `BTreeMap` keyed by sequence number. Sequence and
//! timestamp are both assigned under the write lock, so sequence order and
//! timestamp order agree and age eviction can stop at the first event that
//! is young enough.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};
use tributary_core::{
    ChannelId, LogEvent, LogLevel, LogMessage, SequenceClock, SystemTimeSource, TimeSource,
};

use crate::format::EventFormatter;
use crate::listener::{EventListener, ListenerId};
use crate::query::EventQuery;

type ListenerList = Arc<Vec<(ListenerId, Arc<dyn EventListener>)>>;

/// Append-only, sequence-ordered, bounded store of log events
pub struct EventBuffer {
    /// Events by sequence number
    events: RwLock<BTreeMap<u64, Arc<LogEvent>>>,
    /// Source of sequence numbers
    clock: SequenceClock,
    /// Count bound
    max_events: usize,
    /// Channels whose events are always admitted by `include_unscoped`
    unscoped: RwLock<HashSet<ChannelId>>,
    /// Last returned sequence per tail cursor key
    tail_cursors: DashMap<String, u64>,
    /// Copy-on-write listener list, snapshotted per append
    listeners: RwLock<ListenerList>,
    next_listener: AtomicU64,
    time: Arc<dyn TimeSource>,
}

impl EventBuffer {
    /// Create a buffer holding at most `max_events` events (minimum 1)
    pub fn new(max_events: usize) -> Self {
        Self::with_time_source(max_events, Arc::new(SystemTimeSource))
    }

    /// Create a buffer with an explicit time source
    pub fn with_time_source(max_events: usize, time: Arc<dyn TimeSource>) -> Self {
        Self {
            events: RwLock::new(BTreeMap::new()),
            clock: SequenceClock::new(),
            max_events: max_events.max(1),
            unscoped: RwLock::new(HashSet::new()),
            tail_cursors: DashMap::new(),
            listeners: RwLock::new(Arc::new(Vec::new())),
            next_listener: AtomicU64::new(1),
            time,
        }
    }

    /// Append an event and return its sequence number
    ///
    /// Never fails. If the buffer is over its count bound afterwards, the
    /// lowest sequences are evicted. Listeners are notified after the
    /// buffer lock is released.
    pub fn append(&self, channel_id: ChannelId, level: LogLevel, message: LogMessage) -> u64 {
        // No tracing while `events` is held: a bridge layer appends back here
        let (event, evicted) = {
            let mut events = self.events.write();
            let sequence = self.clock.next();
            let event = Arc::new(LogEvent {
                sequence,
                timestamp: self.time.now_utc(),
                channel_id,
                level,
                message,
            });
            events.insert(sequence, Arc::clone(&event));

            let mut evicted = 0usize;
            while events.len() > self.max_events {
                events.pop_first();
                evicted += 1;
            }
            (event, evicted)
        };

        if evicted > 0 {
            trace!(
                evicted,
                sequence = event.sequence,
                "Count bound reached, evicted oldest events"
            );
        }
        self.notify(&event);
        event.sequence
    }

    fn notify(&self, event: &LogEvent) {
        let listeners = Arc::clone(&*self.listeners.read());
        for (id, listener) in listeners.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if outcome.is_err() {
                warn!(listener = %id, sequence = event.sequence, "Event listener panicked");
            }
        }
    }

    /// The most recently assigned sequence number (0 if none)
    pub fn highest_sequence(&self) -> u64 {
        self.clock.current()
    }

    /// Events matching `query`, in ascending sequence order
    ///
    /// With a tail limit the last N matches are returned. With a tail
    /// cursor key as well, the scan starts after the last sequence the
    /// previous call under that key returned, and the key then remembers
    /// the last sequence of this result.
    pub fn query(&self, query: &EventQuery) -> Vec<Arc<LogEvent>> {
        let cursor_key = query.cursor_key();

        let mut from = query.from;
        if let Some(last) = cursor_key.and_then(|key| self.tail_cursors.get(key).map(|c| *c)) {
            from = from.max(last.saturating_add(1));
        }
        if from > query.to {
            return Vec::new();
        }

        let unscoped = self.unscoped.read();
        let matches = |event: &LogEvent| {
            !query.is_filtered()
                || query.channel_ids.contains(&event.channel_id)
                || (query.include_unscoped && unscoped.contains(&event.channel_id))
        };

        let events = self.events.read();
        let range = events.range(from..=query.to).map(|(_, event)| event);
        let result: Vec<Arc<LogEvent>> = if query.tail_limit > 0 {
            let mut tail: Vec<_> = range
                .rev()
                .filter(|event| matches(event))
                .take(query.tail_limit)
                .cloned()
                .collect();
            tail.reverse();
            tail
        } else {
            range.filter(|event| matches(event)).cloned().collect()
        };
        drop(events);
        drop(unscoped);

        if let (Some(key), Some(last)) = (cursor_key, result.last()) {
            self.tail_cursors.insert(key.to_string(), last.sequence);
        }
        result
    }

    /// Render the events matching `query`, one formatted line per event
    pub fn render(&self, query: &EventQuery, formatter: &dyn EventFormatter) -> String {
        let mut out = String::new();
        for event in self.query(query) {
            out.push_str(&formatter.format(&event));
            out.push('\n');
        }
        out
    }

    /// Remove every event with a timestamp before `min_timestamp`
    pub fn evict_older_than(&self, min_timestamp: DateTime<Utc>) -> usize {
        let evicted = {
            let mut events = self.events.write();
            let mut evicted = 0;
            while let Some(entry) = events.first_entry() {
                if entry.get().timestamp >= min_timestamp {
                    break;
                }
                entry.remove();
                evicted += 1;
            }
            evicted
        };
        if evicted > 0 {
            debug!(evicted, cutoff = %min_timestamp, "Evicted aged events");
        }
        evicted
    }

    /// Remove every event of one channel
    pub fn evict_channel(&self, channel_id: ChannelId) -> usize {
        self.evict_channels(&HashSet::from([channel_id]))
    }

    /// Remove every event of the given channels and forget their unscoped marks
    pub fn evict_channels(&self, channel_ids: &HashSet<ChannelId>) -> usize {
        if channel_ids.is_empty() {
            return 0;
        }
        let evicted = {
            let mut events = self.events.write();
            let before = events.len();
            events.retain(|_, event| !channel_ids.contains(&event.channel_id));
            before - events.len()
        };
        self.unscoped
            .write()
            .retain(|id| !channel_ids.contains(id));
        if evicted > 0 {
            debug!(evicted, channels = channel_ids.len(), "Evicted channel events");
        }
        evicted
    }

    /// Treat a channel as unscoped (admitted by `include_unscoped`)
    pub fn mark_unscoped(&self, channel_id: ChannelId) {
        self.unscoped.write().insert(channel_id);
    }

    /// Drop a channel's unscoped mark, keeping its events
    pub fn unmark_unscoped(&self, channel_id: ChannelId) -> bool {
        self.unscoped.write().remove(&channel_id)
    }

    /// Whether a channel is marked unscoped
    pub fn is_unscoped(&self, channel_id: ChannelId) -> bool {
        self.unscoped.read().contains(&channel_id)
    }

    /// Last sequence returned under a tail cursor key
    pub fn tail_cursor(&self, key: &str) -> Option<u64> {
        self.tail_cursors.get(key).map(|c| *c)
    }

    /// Drop a tail cursor so the next tail read starts from scratch
    pub fn forget_tail_cursor(&self, key: &str) -> bool {
        self.tail_cursors.remove(key).is_some()
    }

    /// Register a listener; returns a handle for removal
    pub fn add_listener<L>(&self, listener: L) -> ListenerId
    where
        L: EventListener + 'static,
    {
        self.add_shared_listener(Arc::new(listener))
    }

    /// Register an already shared listener
    pub fn add_shared_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.listeners.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push((id, listener));
        *guard = Arc::new(next);
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.write();
        if !guard.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        let next: Vec<_> = guard
            .iter()
            .filter(|(existing, _)| *existing != id)
            .cloned()
            .collect();
        *guard = Arc::new(next);
        true
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Number of events currently held
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the buffer holds no events
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// The count bound
    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Drop all events; sequence numbering continues where it was
    pub fn clear(&self) {
        self.events.write().clear();
        self.tail_cursors.clear();
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(5_000)
    }
}

impl fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBuffer")
            .field("len", &self.len())
            .field("max_events", &self.max_events)
            .field("highest_sequence", &self.highest_sequence())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tributary_core::ManualTimeSource;

    use crate::format::PlainFormatter;

    fn msg(text: &str) -> LogMessage {
        LogMessage::new("test", text)
    }

    #[test]
    fn test_sequences_strictly_increase() {
        let buffer = EventBuffer::new(100);
        let id = ChannelId::new();
        let a = buffer.append(id, LogLevel::Basic, msg("a"));
        let b = buffer.append(id, LogLevel::Basic, msg("b"));
        let c = buffer.append(id, LogLevel::Basic, msg("c"));
        assert!(a < b && b < c);
        assert_eq!(buffer.highest_sequence(), c);
    }

    #[test]
    fn test_count_bound_evicts_lowest_sequences() {
        let buffer = EventBuffer::new(10);
        let id = ChannelId::new();
        let sequences: Vec<u64> = (0..15)
            .map(|i| buffer.append(id, LogLevel::Basic, msg(&format!("line {i}"))))
            .collect();

        assert_eq!(buffer.len(), 10);
        let held: Vec<u64> = buffer
            .query(&EventQuery::all())
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(held, sequences[5..].to_vec());
        for gone in &sequences[..5] {
            assert!(!held.contains(gone));
        }
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let buffer = EventBuffer::new(0);
        assert_eq!(buffer.max_events(), 1);
        buffer.append(ChannelId::new(), LogLevel::Basic, msg("x"));
        buffer.append(ChannelId::new(), LogLevel::Basic, msg("y"));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_channel_filter_and_range() {
        let buffer = EventBuffer::new(100);
        let a = ChannelId::new();
        let b = ChannelId::new();
        let c = ChannelId::new();
        buffer.append(a, LogLevel::Basic, msg("a1"));
        let b1 = buffer.append(b, LogLevel::Basic, msg("b1"));
        buffer.append(c, LogLevel::Basic, msg("c1"));
        buffer.append(a, LogLevel::Basic, msg("a2"));
        let b2 = buffer.append(b, LogLevel::Basic, msg("b2"));

        let events = buffer.query(&EventQuery::for_channels([b, c]));
        let texts: Vec<_> = events.iter().map(|e| e.message.text.as_str()).collect();
        assert_eq!(texts, vec!["b1", "c1", "b2"]);

        let events = buffer.query(&EventQuery::for_channels([b]).between(b1 + 1, b2));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, b2);
    }

    #[test]
    fn test_empty_filter_returns_everything() {
        let buffer = EventBuffer::new(100);
        for _ in 0..5 {
            buffer.append(ChannelId::new(), LogLevel::Basic, msg("x"));
        }
        assert_eq!(buffer.query(&EventQuery::all()).len(), 5);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let buffer = EventBuffer::new(100);
        buffer.append(ChannelId::new(), LogLevel::Basic, msg("x"));
        assert!(buffer.query(&EventQuery::all().between(10, 2)).is_empty());
    }

    #[test]
    fn test_unscoped_channels_are_opt_in() {
        let buffer = EventBuffer::new(100);
        let general = ChannelId::new();
        let job = ChannelId::new();
        buffer.mark_unscoped(general);
        buffer.append(general, LogLevel::Basic, msg("general"));
        buffer.append(job, LogLevel::Basic, msg("job"));

        assert_eq!(buffer.query(&EventQuery::for_channels([job])).len(), 1);
        assert_eq!(
            buffer
                .query(&EventQuery::for_channels([job]).with_unscoped(true))
                .len(),
            2
        );
        assert!(buffer.is_unscoped(general));
        assert!(!buffer.is_unscoped(job));
    }

    #[test]
    fn test_tail_cursor_resumes_after_last_returned() {
        let buffer = EventBuffer::new(1_000);
        let c1 = ChannelId::new();
        let sequences: Vec<u64> = (0..100)
            .map(|i| buffer.append(c1, LogLevel::Basic, msg(&format!("{i}"))))
            .collect();

        let query = EventQuery::for_channels([c1]).tail_with_cursor(3, "c1");
        let first: Vec<u64> = buffer.query(&query).iter().map(|e| e.sequence).collect();
        assert_eq!(first, sequences[97..].to_vec());
        assert_eq!(buffer.tail_cursor("c1"), Some(sequences[99]));

        // Nothing new: nothing returned, cursor unchanged
        assert!(buffer.query(&query).is_empty());
        assert_eq!(buffer.tail_cursor("c1"), Some(sequences[99]));

        let newer: Vec<u64> = (0..2)
            .map(|_| buffer.append(c1, LogLevel::Basic, msg("new")))
            .collect();
        let second: Vec<u64> = buffer.query(&query).iter().map(|e| e.sequence).collect();
        assert_eq!(second, newer);

        assert!(buffer.forget_tail_cursor("c1"));
        assert_eq!(buffer.query(&query).len(), 3);
    }

    #[test]
    fn test_tail_without_cursor_is_stateless() {
        let buffer = EventBuffer::new(100);
        let id = ChannelId::new();
        for i in 0..10 {
            buffer.append(id, LogLevel::Basic, msg(&format!("{i}")));
        }
        let q = EventQuery::all().tail(4);
        assert_eq!(buffer.query(&q).len(), 4);
        assert_eq!(buffer.query(&q).len(), 4);
    }

    #[test]
    fn test_evict_older_than() {
        let time = Arc::new(ManualTimeSource::default());
        let buffer = EventBuffer::with_time_source(100, time.clone());
        let id = ChannelId::new();

        buffer.append(id, LogLevel::Basic, msg("old 1"));
        buffer.append(id, LogLevel::Basic, msg("old 2"));
        time.advance(chrono::Duration::minutes(10));
        let cutoff = time.now_utc();
        let fresh = buffer.append(id, LogLevel::Basic, msg("fresh"));

        assert_eq!(buffer.evict_older_than(cutoff), 2);
        let held = buffer.query(&EventQuery::all());
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].sequence, fresh);
        assert_eq!(buffer.evict_older_than(cutoff), 0);
    }

    #[test]
    fn test_evict_channels() {
        let buffer = EventBuffer::new(100);
        let keep = ChannelId::new();
        let drop_a = ChannelId::new();
        let drop_b = ChannelId::new();
        buffer.mark_unscoped(drop_b);
        for id in [keep, drop_a, drop_b, keep, drop_a] {
            buffer.append(id, LogLevel::Basic, msg("x"));
        }

        assert_eq!(buffer.evict_channels(&HashSet::from([drop_a, drop_b])), 3);
        assert_eq!(buffer.len(), 2);
        assert!(!buffer.is_unscoped(drop_b));
        assert_eq!(buffer.evict_channel(keep), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_listeners_run_in_order() {
        let buffer = EventBuffer::new(100);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        buffer.add_listener(move |e: &LogEvent| first.lock().unwrap().push(("first", e.sequence)));
        let second = Arc::clone(&seen);
        buffer.add_listener(move |e: &LogEvent| second.lock().unwrap().push(("second", e.sequence)));

        let seq = buffer.append(ChannelId::new(), LogLevel::Basic, msg("x"));
        assert_eq!(*seen.lock().unwrap(), vec![("first", seq), ("second", seq)]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let buffer = EventBuffer::new(100);
        let count = Arc::new(AtomicU64::new(0));

        buffer.add_listener(|_: &LogEvent| panic!("listener failure"));
        let counter = Arc::clone(&count);
        buffer.add_listener(move |_: &LogEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        buffer.append(ChannelId::new(), LogLevel::Basic, msg("x"));
        buffer.append(ChannelId::new(), LogLevel::Basic, msg("y"));
        assert_eq!(buffer.len(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remove_listener() {
        let buffer = EventBuffer::new(100);
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = buffer.add_listener(move |_: &LogEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        buffer.append(ChannelId::new(), LogLevel::Basic, msg("x"));
        assert!(buffer.remove_listener(id));
        assert!(!buffer.remove_listener(id));
        buffer.append(ChannelId::new(), LogLevel::Basic, msg("y"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(buffer.listener_count(), 0);
    }

    #[test]
    fn test_render() {
        let buffer = EventBuffer::new(100);
        let id = ChannelId::new();
        buffer.append(id, LogLevel::Basic, LogMessage::new("Sort", "started"));
        buffer.append(id, LogLevel::Error, LogMessage::new("Sort", "disk full"));

        let text = buffer.render(&EventQuery::all(), &PlainFormatter::without_timestamp());
        assert_eq!(text, "Sort - started\nSort - ERROR: disk full\n");
    }

    #[test]
    fn test_clear_keeps_numbering() {
        let buffer = EventBuffer::new(100);
        let id = ChannelId::new();
        let before = buffer.append(id, LogLevel::Basic, msg("x"));
        buffer.clear();
        assert!(buffer.is_empty());
        let after = buffer.append(id, LogLevel::Basic, msg("y"));
        assert!(after > before);
    }
}
