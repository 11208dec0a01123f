//! Event buffer performance benchmarks
//!
//! Benchmarks for the hot paths:
//! - Append (below and at the count bound)
//! - Channel-filtered range queries
//! - Resumable tail reads
//!
//! Run with: cargo bench -p tributary-buffer

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tributary_buffer::{EventBuffer, EventQuery};
use tributary_core::{ChannelId, LogLevel, LogMessage};

// ============================================================================
// Append Benchmarks
// ============================================================================

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(1));

    // Buffer never fills
    group.bench_function("unbounded", |b| {
        let buffer = EventBuffer::new(usize::MAX);
        let id = ChannelId::new();
        b.iter(|| buffer.append(id, LogLevel::Basic, LogMessage::new("bench", "line")))
    });

    // Every append evicts the oldest event
    group.bench_function("at_capacity", |b| {
        let buffer = EventBuffer::new(1_000);
        let id = ChannelId::new();
        for _ in 0..1_000 {
            buffer.append(id, LogLevel::Basic, LogMessage::new("bench", "fill"));
        }
        b.iter(|| buffer.append(id, LogLevel::Basic, LogMessage::new("bench", "line")))
    });

    // With a listener attached
    group.bench_function("with_listener", |b| {
        let buffer = EventBuffer::new(10_000);
        buffer.add_listener(|event: &tributary_core::LogEvent| {
            black_box(event.sequence);
        });
        let id = ChannelId::new();
        b.iter(|| buffer.append(id, LogLevel::Basic, LogMessage::new("bench", "line")))
    });

    group.finish();
}

// ============================================================================
// Query Benchmarks
// ============================================================================

fn populated(channels: usize, per_channel: usize) -> (EventBuffer, Vec<ChannelId>) {
    let buffer = EventBuffer::new(channels * per_channel);
    let ids: Vec<ChannelId> = (0..channels).map(|_| ChannelId::new()).collect();
    for i in 0..per_channel {
        for id in &ids {
            buffer.append(*id, LogLevel::Basic, LogMessage::new("bench", format!("line {i}")));
        }
    }
    (buffer, ids)
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for channels in [10usize, 100] {
        let (buffer, ids) = populated(channels, 100);
        let scoped = EventQuery::for_channels(ids.iter().take(channels / 10).copied());

        group.bench_with_input(
            BenchmarkId::new("channel_filter", channels),
            &scoped,
            |b, query| b.iter(|| buffer.query(black_box(query))),
        );

        let tail = EventQuery::for_channels([ids[0]]).tail(20);
        group.bench_with_input(BenchmarkId::new("tail_20", channels), &tail, |b, query| {
            b.iter(|| buffer.query(black_box(query)))
        });
    }

    group.finish();
}

fn bench_tail_cursor(c: &mut Criterion) {
    let mut group = c.benchmark_group("tail_cursor");

    group.bench_function("poll_after_append", |b| {
        let buffer = EventBuffer::new(100_000);
        let id = ChannelId::new();
        let query = EventQuery::for_channels([id]).tail_with_cursor(100, "bench");
        b.iter(|| {
            buffer.append(id, LogLevel::Basic, LogMessage::new("bench", "line"));
            buffer.query(black_box(&query))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_append, bench_query, bench_tail_cursor);
criterion_main!(benches);
