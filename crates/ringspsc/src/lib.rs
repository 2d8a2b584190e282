//! Bounded lock-free SPSC ring buffer.
//!
//! A single-producer single-consumer queue of fixed-size value records,
//! built to stitch pipeline stages together without locks or heap traffic
//! in steady state:
//!
//! - 128-byte alignment per position counter (prefetcher false sharing
//!   elimination)
//! - Cached peer positions so the hot paths touch a foreign cache line only
//!   near the full/empty transitions
//! - Release/acquire publication; no sequential consistency required
//! - Power-of-two capacity, index by mask, u64 sequence space (never wraps
//!   in a realistic process lifetime)
//!
//! # Example
//!
//! ```
//! use ringspsc::RingBuffer;
//!
//! let ring = RingBuffer::<u64>::with_capacity(8).unwrap();
//! assert!(ring.try_write(42));
//! assert_eq!(ring.try_read(), Some(42));
//! assert_eq!(ring.try_read(), None);
//! ```

mod ring;

pub use ring::{RingBuffer, RingError};
