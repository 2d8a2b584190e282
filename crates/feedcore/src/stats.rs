//! Pipeline observability counters.
//!
//! Hot workers bump atomics with relaxed ordering; readers take a
//! [`StatsSnapshot`] whose values may be mutually stale but are never torn.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by the workers. Crate-internal; external observers
/// see only snapshots.
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub packets_published: AtomicU64,
    pub raw_ring_full: AtomicU64,
    pub messages_decoded: AtomicU64,
    pub decode_errors: AtomicU64,
    pub messages_injected: AtomicU64,
    pub book_updates: AtomicU64,
    pub unknown_symbol_drops: AtomicU64,
    pub snapshots_emitted: AtomicU64,
    pub snapshots_dropped: AtomicU64,
    pub sink_failures: AtomicU64,
}

impl PipelineCounters {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_published: self.packets_published.load(Ordering::Relaxed),
            raw_ring_full: self.raw_ring_full.load(Ordering::Relaxed),
            messages_decoded: self.messages_decoded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            messages_injected: self.messages_injected.load(Ordering::Relaxed),
            book_updates: self.book_updates.load(Ordering::Relaxed),
            unknown_symbol_drops: self.unknown_symbol_drops.load(Ordering::Relaxed),
            snapshots_emitted: self.snapshots_emitted.load(Ordering::Relaxed),
            snapshots_dropped: self.snapshots_dropped.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            raw_backlog: 0,
            message_backlog: 0,
            snapshot_backlog: 0,
        }
    }
}

/// Point-in-time view of the pipeline counters plus each ring's
/// available-to-read backlog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_published: u64,
    /// `publish_raw` rejections (caller-visible backpressure).
    pub raw_ring_full: u64,
    pub messages_decoded: u64,
    pub decode_errors: u64,
    pub messages_injected: u64,
    pub book_updates: u64,
    pub unknown_symbol_drops: u64,
    pub snapshots_emitted: u64,
    /// Snapshots dropped because the cold ring was full (lossy by design).
    pub snapshots_dropped: u64,
    pub sink_failures: u64,
    pub raw_backlog: usize,
    pub message_backlog: usize,
    pub snapshot_backlog: usize,
}
