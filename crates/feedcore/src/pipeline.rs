//! Three-stage ingestion pipeline.
//!
//! ```text
//! ingress ──▶ RB₀<RawPacket> ──▶ decoder ──▶ RB₁<WireMessage> ──▶ book
//!                                                                 builder ──▶ RB₂<Snapshot> ──▶ cold path
//! ```
//!
//! Decoder and book builder are the hot path: no allocation, no I/O, no
//! blocking — spin-hint back-off only. The cold path is lossy and allowed to
//! sleep. Each ring has exactly one writer and one reader:
//!
//! - `RB₀`: ingress thread → decoder worker
//! - `RB₁`: decoder worker (or `inject_message`) → book worker
//! - `RB₂`: book worker → cold worker *or* the external
//!   [`try_read_snapshot`](Pipeline::try_read_snapshot) caller
//!
//! The cold worker spawns only when a [`SnapshotSink`] is configured;
//! without one, the embedding process takes the cold-loop role by polling
//! `try_read_snapshot`. Running a sink *and* polling the snapshot surface
//! breaks the SPSC contract.
//!
//! Shutdown is drain-based: `stop` raises the flag and every worker exits
//! once its upstream stage has finished and its input ring is empty, so no
//! accepted packet is abandoned mid-pipe.

use crate::book::OrderBook;
use crate::clock::{Clock, MonotonicClock};
use crate::decoder::WireDecoder;
use crate::pool::BufferPool;
use crate::sink::SnapshotSink;
use crate::stats::{PipelineCounters, StatsSnapshot};
use crate::types::{flags, RawPacket, Snapshot, WireMessage, MAX_SYMBOLS};
use crossbeam_utils::Backoff;
use ringspsc::{RingBuffer, RingError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_RAW_RING_CAPACITY: usize = 1 << 16;
pub const DEFAULT_MESSAGE_RING_CAPACITY: usize = 1 << 16;
pub const DEFAULT_SNAPSHOT_RING_CAPACITY: usize = 1 << 15;
pub const DEFAULT_BUFFER_COUNT: usize = 1024;
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// The cold worker never sleeps less than this when idle, so it cannot
/// starve a hot loop sharing its core.
const MIN_COLD_IDLE_SLEEP: Duration = Duration::from_millis(1);

const DECODER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const BOOK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const COLD_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Error types for pipeline construction and lifecycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("pipeline already started")]
    AlreadyStarted,
    #[error("failed to spawn {name} worker")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Pipeline dimensions. Ring capacities must be powers of two.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub raw_ring_capacity: usize,
    pub message_ring_capacity: usize,
    pub snapshot_ring_capacity: usize,
    /// Pool slots; also the modulus that maps packet sequence numbers to
    /// slots. Size it so the decoder consumes a slot before its sequence
    /// comes around again.
    pub buffer_count: usize,
    pub buffer_size: usize,
    pub max_symbols: usize,
    /// Cold worker idle sleep; clamped to at least 1 ms.
    pub cold_idle_sleep: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_ring_capacity: DEFAULT_RAW_RING_CAPACITY,
            message_ring_capacity: DEFAULT_MESSAGE_RING_CAPACITY,
            snapshot_ring_capacity: DEFAULT_SNAPSHOT_RING_CAPACITY,
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_symbols: MAX_SYMBOLS,
            cold_idle_sleep: MIN_COLD_IDLE_SLEEP,
        }
    }
}

/// State shared between the pipeline handle and its workers.
struct Shared {
    raw_ring: RingBuffer<RawPacket>,
    message_ring: RingBuffer<WireMessage>,
    snapshot_ring: RingBuffer<Snapshot>,
    pool: BufferPool,
    counters: PipelineCounters,
    shutdown: AtomicBool,
    /// Raised by the decoder worker after its final publish, so the book
    /// worker cannot exit while messages are still being forwarded.
    decoder_done: AtomicBool,
    /// Same hand-off from the book worker to the cold worker.
    book_done: AtomicBool,
}

/// The market-data core: three rings, a buffer pool, a dense book array and
/// the worker threads that connect them.
pub struct Pipeline {
    shared: Arc<Shared>,
    clock: MonotonicClock,
    config: PipelineConfig,
    sink: Option<Box<dyn SnapshotSink>>,
    decoder_handle: Option<JoinHandle<()>>,
    book_handle: Option<JoinHandle<()>>,
    cold_handle: Option<JoinHandle<()>>,
    running: bool,
}

impl Pipeline {
    /// Builds a pipeline without a cold-path sink; the embedding process
    /// consumes snapshots through [`try_read_snapshot`](Self::try_read_snapshot).
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::build(config, None)
    }

    /// Builds a pipeline whose cold worker delivers snapshots to `sink`.
    ///
    /// The sink is handed to the cold worker on the first
    /// [`start`](Self::start); a restarted pipeline keeps running without a
    /// cold worker.
    pub fn with_sink(
        config: PipelineConfig,
        sink: Box<dyn SnapshotSink>,
    ) -> Result<Self, PipelineError> {
        Self::build(config, Some(sink))
    }

    fn build(
        config: PipelineConfig,
        sink: Option<Box<dyn SnapshotSink>>,
    ) -> Result<Self, PipelineError> {
        if config.buffer_count == 0 || config.buffer_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "buffer pool dimensions must be nonzero",
            ));
        }
        if config.max_symbols == 0 {
            return Err(PipelineError::InvalidConfig("max_symbols must be nonzero"));
        }

        let shared = Shared {
            raw_ring: RingBuffer::with_capacity(config.raw_ring_capacity)?,
            message_ring: RingBuffer::with_capacity(config.message_ring_capacity)?,
            snapshot_ring: RingBuffer::with_capacity(config.snapshot_ring_capacity)?,
            pool: BufferPool::new(config.buffer_count, config.buffer_size),
            counters: PipelineCounters::default(),
            shutdown: AtomicBool::new(false),
            decoder_done: AtomicBool::new(false),
            book_done: AtomicBool::new(false),
        };

        Ok(Self {
            shared: Arc::new(shared),
            clock: MonotonicClock::new(),
            config,
            sink,
            decoder_handle: None,
            book_handle: None,
            cold_handle: None,
            running: false,
        })
    }

    /// Spawns the workers. Fails if already running.
    ///
    /// A restart after [`stop`](Self::stop) begins with fresh, empty books.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.running {
            return Err(PipelineError::AlreadyStarted);
        }

        self.shared.shutdown.store(false, Ordering::Release);
        self.shared.decoder_done.store(false, Ordering::Release);
        self.shared.book_done.store(false, Ordering::Release);

        let decoder_shared = Arc::clone(&self.shared);
        self.decoder_handle = Some(
            thread::Builder::new()
                .name("feed-decoder".into())
                .spawn(move || {
                    request_realtime_class("feed-decoder");
                    decoder_loop(&decoder_shared);
                })
                .map_err(|source| PipelineError::Spawn {
                    name: "decoder",
                    source,
                })?,
        );

        let book_shared = Arc::clone(&self.shared);
        let max_symbols = self.config.max_symbols;
        self.book_handle = Some(
            thread::Builder::new()
                .name("feed-book".into())
                .spawn(move || {
                    request_realtime_class("feed-book");
                    book_loop(&book_shared, max_symbols);
                })
                .map_err(|source| PipelineError::Spawn {
                    name: "book-builder",
                    source,
                })?,
        );

        if let Some(sink) = self.sink.take() {
            let cold_shared = Arc::clone(&self.shared);
            let idle_sleep = self.config.cold_idle_sleep.max(MIN_COLD_IDLE_SLEEP);
            self.cold_handle = Some(
                thread::Builder::new()
                    .name("feed-cold".into())
                    .spawn(move || cold_loop(&cold_shared, sink, idle_sleep))
                    .map_err(|source| PipelineError::Spawn {
                        name: "cold-path",
                        source,
                    })?,
            );
        }

        self.running = true;
        Ok(())
    }

    /// Raises the shutdown flag and joins the workers in pipeline order
    /// with bounded timeouts (5 s, 5 s, 2 s). A worker that fails to drain
    /// in time is logged and abandoned; resources are released regardless.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.shared.shutdown.store(true, Ordering::Release);

        join_with_timeout(self.decoder_handle.take(), DECODER_JOIN_TIMEOUT, "decoder");
        join_with_timeout(self.book_handle.take(), BOOK_JOIN_TIMEOUT, "book-builder");
        join_with_timeout(self.cold_handle.take(), COLD_JOIN_TIMEOUT, "cold-path");

        self.running = false;
    }

    // ---------------------------------------------------------------------
    // INGRESS
    // ---------------------------------------------------------------------

    /// Publishes one raw packet into the pipeline.
    ///
    /// Copies the payload into pool slot `seq_num % buffer_count` (clipping
    /// at the slot size) and enqueues the packet record. Returns `false`
    /// when the raw ring is full — the caller decides whether to drop, spin
    /// or throttle.
    ///
    /// Single-writer: at most one ingress thread may call this.
    pub fn publish_raw(&self, payload: &[u8], seq_num: u64, channel_id: u32) -> bool {
        let slot = (seq_num % self.config.buffer_count as u64) as usize;
        let copied = self.shared.pool.write(slot, payload);
        let mut packet_flags = 0u16;
        if copied < payload.len() {
            packet_flags |= flags::TRUNCATED;
        }

        let packet = RawPacket {
            receive_ts_ns: self.clock.now_ns(),
            seq_num,
            channel_id,
            buffer_index: slot as u32,
            offset: 0,
            length: copied as u32,
            flags: packet_flags,
        };

        if self.shared.raw_ring.try_write(packet) {
            self.shared
                .counters
                .packets_published
                .fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.shared
                .counters
                .raw_ring_full
                .fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Publishes a pre-decoded message straight into the book stage,
    /// bypassing the decoder. For synthetic feeds and tests; must not run
    /// concurrently with live decode traffic (`RB₁` has one writer).
    pub fn inject_message(&self, message: WireMessage) -> bool {
        if self.shared.message_ring.try_write(message) {
            self.shared
                .counters
                .messages_injected
                .fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    // ---------------------------------------------------------------------
    // OUTBOUND FEED
    // ---------------------------------------------------------------------

    /// Dequeues one snapshot. Valid only when no sink is configured (the
    /// caller is then the snapshot ring's single reader).
    pub fn try_read_snapshot(&self) -> Option<Snapshot> {
        self.shared.snapshot_ring.try_read()
    }

    /// Snapshots waiting in the cold ring.
    pub fn pending_snapshot_count(&self) -> usize {
        self.shared.snapshot_ring.available_to_read()
    }

    // ---------------------------------------------------------------------
    // ADMIN
    // ---------------------------------------------------------------------

    /// Point-in-time statistics; values may be mutually stale, never torn.
    pub fn stats(&self) -> StatsSnapshot {
        let mut snapshot = self.shared.counters.snapshot();
        snapshot.raw_backlog = self.shared.raw_ring.available_to_read();
        snapshot.message_backlog = self.shared.message_ring.available_to_read();
        snapshot.snapshot_backlog = self.shared.snapshot_ring.available_to_read();
        snapshot
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------
// WORKER LOOPS
// ---------------------------------------------------------------------

fn decoder_loop(shared: &Shared) {
    let decoder = WireDecoder::new();
    let backoff = Backoff::new();

    loop {
        match shared.raw_ring.try_read() {
            Some(packet) => {
                backoff.reset();
                // SAFETY: this worker is the pool's single reader, and the
                // slot for this sequence is not rewritten until buffer_count
                // later packets have been published (see BufferPool).
                let payload = unsafe {
                    shared.pool.bytes(
                        packet.buffer_index as usize,
                        packet.offset as usize,
                        packet.length as usize,
                    )
                };
                match decoder.try_decode(payload, packet.receive_ts_ns, packet.channel_id) {
                    Some(message) => {
                        // Spin-publish: the book worker is draining RB₁, so
                        // space opens up; short spins, never a sleep.
                        let publish = Backoff::new();
                        while !shared.message_ring.try_write(message) {
                            publish.snooze();
                        }
                        shared
                            .counters
                            .messages_decoded
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    None => {
                        shared.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            None => {
                if shared.shutdown.load(Ordering::Acquire) && shared.raw_ring.is_empty() {
                    break;
                }
                backoff.snooze();
            }
        }
    }

    shared.decoder_done.store(true, Ordering::Release);
    log::debug!("decoder worker drained and exited");
}

fn book_loop(shared: &Shared, max_symbols: usize) {
    let mut books: Vec<OrderBook> = (0..max_symbols).map(|i| OrderBook::new(i as u32)).collect();
    let backoff = Backoff::new();

    loop {
        match shared.message_ring.try_read() {
            Some(message) => {
                backoff.reset();
                let symbol = message.symbol_index as usize;
                if symbol >= books.len() {
                    shared
                        .counters
                        .unknown_symbol_drops
                        .fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                books[symbol].apply(&message);
                shared.counters.book_updates.fetch_add(1, Ordering::Relaxed);

                // Snapshot on every message; the cold ring is lossy and a
                // fresher snapshot follows on the next update.
                let snapshot = books[symbol].snapshot();
                if shared.snapshot_ring.try_write(snapshot) {
                    shared
                        .counters
                        .snapshots_emitted
                        .fetch_add(1, Ordering::Relaxed);
                } else {
                    shared
                        .counters
                        .snapshots_dropped
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                // Exit only once the decoder has finished forwarding, so a
                // momentarily empty ring mid-drain cannot strand messages.
                if shared.shutdown.load(Ordering::Acquire)
                    && shared.decoder_done.load(Ordering::Acquire)
                    && shared.message_ring.is_empty()
                {
                    break;
                }
                backoff.snooze();
            }
        }
    }

    shared.book_done.store(true, Ordering::Release);
    log::debug!("book worker drained and exited");
}

fn cold_loop(shared: &Shared, mut sink: Box<dyn SnapshotSink>, idle_sleep: Duration) {
    loop {
        match shared.snapshot_ring.try_read() {
            Some(snapshot) => {
                if let Err(err) = sink.deliver(&snapshot) {
                    shared.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!("snapshot sink '{}' failed: {err}", sink.name());
                }
            }
            None => {
                if shared.shutdown.load(Ordering::Acquire)
                    && shared.book_done.load(Ordering::Acquire)
                    && shared.snapshot_ring.is_empty()
                {
                    break;
                }
                thread::sleep(idle_sleep);
            }
        }
    }

    log::debug!("cold-path worker drained and exited");
}

// ---------------------------------------------------------------------
// PLATFORM HELPERS
// ---------------------------------------------------------------------

/// Joins a worker, polling with a deadline. On timeout the handle is
/// dropped and the thread abandoned; teardown proceeds regardless.
fn join_with_timeout(handle: Option<JoinHandle<()>>, timeout: Duration, name: &str) {
    let Some(handle) = handle else { return };
    let deadline = Instant::now() + timeout;

    while !handle.is_finished() {
        if Instant::now() >= deadline {
            log::warn!("{name} worker did not drain within {timeout:?}; abandoning join");
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }

    if handle.join().is_err() {
        log::error!("{name} worker panicked");
    }
}

/// Moves the current thread into the platform's real-time scheduling class
/// where one exists. Failure (missing privileges, unsupported platform)
/// degrades to default priority and is logged once per worker.
#[cfg(unix)]
fn request_realtime_class(worker: &str) {
    // SAFETY: plain libc scheduling calls on the current thread.
    unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = libc::sched_get_priority_min(libc::SCHED_FIFO).max(1);
        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
        if rc != 0 {
            log::debug!("{worker}: SCHED_FIFO unavailable (errno {rc}); staying at default priority");
        }
    }
}

#[cfg(not(unix))]
fn request_realtime_class(worker: &str) {
    log::debug!("{worker}: no real-time scheduling class on this platform");
}
