//! Low-latency market-data ingestion and book-building core.
//!
//! Raw feed packets enter one end; per-instrument top-of-book snapshots
//! exit the other. Three worker stages joined by SPSC rings:
//!
//! ```text
//! ┌─────────┐  RB₀<RawPacket>  ┌─────────┐  RB₁<WireMessage>  ┌─────────┐  RB₂<Snapshot>  ┌──────────┐
//! │ ingress │ ───────────────▶ │ decoder │ ─────────────────▶ │  book   │ ──────────────▶ │ cold path│
//! │ thread  │                  │ worker  │                    │ builder │                 │  worker  │
//! └─────────┘                  └─────────┘                    └─────────┘                 └──────────┘
//! ```
//!
//! # Key properties
//!
//! - Zero heap traffic in steady state: pre-allocated rings, buffer pool and
//!   book ladders; everything in flight is a `Copy` record
//! - Fixed-point ×10⁸ prices; no floating point anywhere on the hot path
//! - Decoder and book builder spin-hint on empty and never block; the cold
//!   path sleeps and is lossy by design
//! - Shutdown drains: workers exit only after their upstream stage finished
//!   and their input ring is empty
//!
//! # Example
//!
//! ```
//! use feedcore::{Pipeline, PipelineConfig, Side, WireMessage, PRICE_SCALE};
//!
//! let mut pipeline = Pipeline::new(PipelineConfig {
//!     max_symbols: 8,
//!     ..PipelineConfig::default()
//! }).unwrap();
//! pipeline.start().unwrap();
//!
//! // Synthetic injection, bypassing the wire decoder.
//! pipeline.inject_message(WireMessage::new_order(3, Side::Buy, 100 * PRICE_SCALE, 50, 1));
//!
//! // The book worker publishes a snapshot for every accepted message.
//! let snapshot = loop {
//!     if let Some(s) = pipeline.try_read_snapshot() {
//!         break s;
//!     }
//!     std::hint::spin_loop();
//! };
//! assert_eq!(snapshot.symbol_index, 3);
//! assert_eq!(snapshot.bid_price, 100 * PRICE_SCALE);
//! pipeline.stop();
//! ```

mod book;
mod clock;
mod decoder;
mod pipeline;
mod pool;
mod sink;
mod stats;
mod types;

pub use book::{DropCounts, Order, OrderBook, PriceLevel, MAX_ORDERS_PER_LEVEL, MAX_PRICE_LEVELS};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use decoder::{WireDecoder, MIN_PACKET_LEN};
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineError, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE,
    DEFAULT_MESSAGE_RING_CAPACITY, DEFAULT_RAW_RING_CAPACITY, DEFAULT_SNAPSHOT_RING_CAPACITY,
};
pub use sink::{CollectingSink, JsonLinesSink, NullSink, SinkError, SnapshotSink, StdoutSink};
pub use stats::StatsSnapshot;
pub use types::{
    flags, MsgKind, RawPacket, Side, Snapshot, WireMessage, MAX_SYMBOLS, PRICE_SCALE,
};
