use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// This ring buffer is a classic bounded SPSC queue over u64 sequence numbers.
//
// ## Sequence Numbers
//
// `write_pos` and `read_pos` increase monotonically and never wrap in a
// realistic lifetime (2^64 sequence space). Slot index is computed as
// `pos & mask` only when touching storage.
//
// ## Memory Ordering Protocol
//
// **Producer (try_write):**
// 1. Load `write_pos` with Relaxed (only the producer writes it)
// 2. Check `cached_read_pos` (UnsafeCell, producer-owned)
// 3. If apparently full: refresh the cache with an Acquire load of `read_pos`
// 4. Store the value into the slot (plain write, protected by protocol)
// 5. Store `write_pos + 1` with Release (publishes the slot to the consumer)
//
// **Consumer (try_read):**
// 1. Load `read_pos` with Relaxed (only the consumer writes it)
// 2. Check `cached_write_pos` (UnsafeCell, consumer-owned)
// 3. If apparently empty: refresh the cache with an Acquire load of `write_pos`
// 4. Copy the value out of the slot (plain read, protected by protocol)
// 5. Store `read_pos + 1` with Release (returns the slot to the producer)
//
// The Acquire in step 3 pairs with the peer's Release in step 5; that pairing
// is the entire correctness argument. No SeqCst anywhere.
//
// ## Single-Writer Invariants
//
// - `cached_read_pos`: written and read by the producer only
// - `cached_write_pos`: written and read by the consumer only
// - slot `i`: written by the producer while `i` is outside [read_pos,
//   write_pos), read by the consumer while inside it
//
// The cached positions exist so that the hot paths touch the peer's cache
// line only near the full/empty transitions; in a half-full steady state the
// producer and consumer each stay on their own lines.
//
// =============================================================================

/// Error raised by [`RingBuffer`] construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// Capacity must be a positive power of two so indices reduce by mask.
    #[error("invalid ring capacity {capacity}: must be a positive power of two")]
    InvalidCapacity {
        /// The rejected capacity.
        capacity: usize,
    },
}

/// Bounded lock-free single-producer single-consumer ring buffer.
///
/// Holds fixed-size value records (`T: Copy`, no owning references). At most
/// one thread may call [`try_write`](Self::try_write) and at most one thread
/// may call [`try_read`](Self::try_read); the occupancy accessors are safe
/// from anywhere. Violating the one-writer/one-reader contract is undefined
/// behavior by construction.
#[repr(C)]
pub struct RingBuffer<T> {
    // === PRODUCER HOT === (128-byte aligned)
    /// Next sequence to write (written by producer, read by consumer).
    write_pos: CacheAligned<AtomicU64>,
    /// Producer's view of `read_pos` (avoids cross-core reads while not full).
    cached_read_pos: CacheAligned<UnsafeCell<u64>>,

    // === CONSUMER HOT === (128-byte aligned)
    /// Next sequence to read (written by consumer, read by producer).
    read_pos: CacheAligned<AtomicU64>,
    /// Consumer's view of `write_pos` (avoids cross-core reads while not empty).
    cached_write_pos: CacheAligned<UnsafeCell<u64>>,

    // === IMMUTABLE AFTER CONSTRUCTION ===
    mask: u64,
    capacity: usize,

    // === DATA STORE ===
    buffer: UnsafeCell<Box<[MaybeUninit<T>]>>,
}

// SAFETY: the SPSC protocol above is the synchronization; with one producer
// and one consumer every slot has exactly one writer at any time. `T: Copy`
// keeps records free of owning references, so moving bytes is enough.
unsafe impl<T: Copy + Send> Send for RingBuffer<T> {}
unsafe impl<T: Copy + Send> Sync for RingBuffer<T> {}

impl<T: Copy> RingBuffer<T> {
    /// Creates a ring with the given capacity.
    ///
    /// Fails with [`RingError::InvalidCapacity`] unless `capacity` is a
    /// positive power of two.
    pub fn with_capacity(capacity: usize) -> Result<Self, RingError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(RingError::InvalidCapacity { capacity });
        }

        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, MaybeUninit::uninit);

        Ok(Self {
            write_pos: CacheAligned::new(AtomicU64::new(0)),
            cached_read_pos: CacheAligned::new(UnsafeCell::new(0)),
            read_pos: CacheAligned::new(AtomicU64::new(0)),
            cached_write_pos: CacheAligned::new(UnsafeCell::new(0)),
            mask: capacity as u64 - 1,
            capacity,
            buffer: UnsafeCell::new(buffer.into_boxed_slice()),
        })
    }

    /// Returns the ring capacity in slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records currently readable. Non-synchronizing; may be stale.
    ///
    /// Saturating arithmetic keeps the answer sane when the two position
    /// loads race with concurrent progress.
    #[inline]
    pub fn available_to_read(&self) -> usize {
        let w = self.write_pos.load(Ordering::Relaxed);
        let r = self.read_pos.load(Ordering::Relaxed);
        w.saturating_sub(r) as usize
    }

    /// Number of free slots. Non-synchronizing; may be stale.
    #[inline]
    pub fn available_to_write(&self) -> usize {
        self.capacity.saturating_sub(self.available_to_read())
    }

    /// Returns true if the ring holds no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.write_pos.load(Ordering::Relaxed) == self.read_pos.load(Ordering::Relaxed)
    }

    /// Returns true if every slot is occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.available_to_read() >= self.capacity
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Attempts to enqueue one record. Returns `false` iff the ring is
    /// genuinely full — no spurious failures.
    ///
    /// Producer-only: at most one thread may call this.
    #[inline]
    pub fn try_write(&self, value: T) -> bool {
        let w = self.write_pos.load(Ordering::Relaxed);

        // Fast path: producer-local view of the consumer position.
        // SAFETY: cached_read_pos is written only by the producer (this path).
        let mut read = unsafe { *self.cached_read_pos.get() };
        if w.wrapping_sub(read) >= self.capacity as u64 {
            // Slow path: the Acquire load pairs with the consumer's Release
            // store of read_pos.
            read = self.read_pos.load(Ordering::Acquire);
            // SAFETY: single-writer field, see above.
            unsafe { *self.cached_read_pos.get() = read };
            if w.wrapping_sub(read) >= self.capacity as u64 {
                return false;
            }
        }

        let idx = (w & self.mask) as usize;
        // SAFETY: idx is in bounds (masked) and sequence w is outside
        // [read_pos, write_pos), so the consumer will not touch this slot
        // until the Release store below publishes it.
        unsafe {
            (*self.buffer.get())
                .as_mut_ptr()
                .add(idx)
                .write(MaybeUninit::new(value));
        }

        debug_assert!(w.wrapping_add(1).wrapping_sub(read) <= self.capacity as u64);

        // The data store above must be ordered before this publication.
        self.write_pos.store(w.wrapping_add(1), Ordering::Release);
        true
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Attempts to dequeue one record. Returns `None` iff the ring is
    /// genuinely empty — no spurious failures.
    ///
    /// Consumer-only: at most one thread may call this.
    #[inline]
    pub fn try_read(&self) -> Option<T> {
        let r = self.read_pos.load(Ordering::Relaxed);

        // Fast path: consumer-local view of the producer position.
        // SAFETY: cached_write_pos is written only by the consumer (this path).
        let mut write = unsafe { *self.cached_write_pos.get() };
        if r == write {
            // Slow path: the Acquire load pairs with the producer's Release
            // store of write_pos.
            write = self.write_pos.load(Ordering::Acquire);
            // SAFETY: single-writer field, see above.
            unsafe { *self.cached_write_pos.get() = write };
            if r == write {
                return None;
            }
        }

        let idx = (r & self.mask) as usize;
        // SAFETY: slots in [read_pos, write_pos) were initialized by the
        // producer before the Release store that the Acquire above pairs
        // with, and the producer will not overwrite slot idx until read_pos
        // advances past sequence r.
        let value = unsafe { (*self.buffer.get()).as_ptr().add(idx).read().assume_init() };

        debug_assert!(write.wrapping_sub(r.wrapping_add(1)) < self.capacity as u64);

        self.read_pos.store(r.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    // ---------------------------------------------------------------------
    // LIFECYCLE
    // ---------------------------------------------------------------------

    /// Discards all queued records and rewinds both positions to zero.
    ///
    /// Exclusive access (`&mut self`) is the definition of "no concurrent
    /// user exists" — the borrow checker enforces the precondition.
    pub fn reset(&mut self) {
        *self.write_pos.value.get_mut() = 0;
        *self.read_pos.value.get_mut() = 0;
        *self.cached_read_pos.value.get_mut() = 0;
        *self.cached_write_pos.value.get_mut() = 0;
    }
}

impl<T: Copy> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("available_to_read", &self.available_to_read())
            .finish()
    }
}

// ---------------------------------------------------------------------
// HELPER: 128-byte cache-aligned wrapper
// ---------------------------------------------------------------------

/// Wrapper that pads its content to a full 128-byte alignment unit so that
/// no two position counters share a cache line, including the adjacent line
/// pulled in by hardware prefetchers on Intel/AMD.
#[repr(align(128))]
struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_must_be_power_of_two() {
        assert!(RingBuffer::<u64>::with_capacity(0).is_err());
        assert!(RingBuffer::<u64>::with_capacity(3).is_err());
        assert!(RingBuffer::<u64>::with_capacity(100).is_err());
        match RingBuffer::<u64>::with_capacity(6) {
            Err(RingError::InvalidCapacity { capacity }) => assert_eq!(capacity, 6),
            Ok(_) => panic!("capacity 6 must be rejected"),
        }

        for cap in [1usize, 2, 4, 64, 1 << 16] {
            let ring = RingBuffer::<u64>::with_capacity(cap).unwrap();
            assert_eq!(ring.capacity(), cap);
            assert!(ring.is_empty());
            assert!(!ring.is_full());
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let ring = RingBuffer::<i64>::with_capacity(4).unwrap();
        assert!(ring.try_write(-77));
        assert_eq!(ring.try_read(), Some(-77));
        assert_eq!(ring.try_read(), None);
    }

    #[test]
    fn test_fifo_order() {
        let ring = RingBuffer::<u64>::with_capacity(16).unwrap();
        for i in 0..10u64 {
            assert!(ring.try_write(i));
        }
        for i in 0..10u64 {
            assert_eq!(ring.try_read(), Some(i));
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_full_then_drain() {
        // Scenario: capacity 4, write 1..=4, fifth write fails, one read
        // frees exactly one slot.
        let ring = RingBuffer::<i64>::with_capacity(4).unwrap();
        for v in 1..=4 {
            assert!(ring.try_write(v));
        }
        assert!(ring.is_full());
        assert!(!ring.try_write(5));

        assert_eq!(ring.try_read(), Some(1));
        assert!(ring.try_write(5));

        for v in 2..=5 {
            assert_eq!(ring.try_read(), Some(v));
        }
        assert_eq!(ring.try_read(), None);
    }

    #[test]
    fn test_fifo_across_wrap_boundary() {
        let ring = RingBuffer::<u64>::with_capacity(8).unwrap();
        let mut next = 0u64;

        // Fill-then-drain enough times to cross the modular boundary often.
        for _cycle in 0..12 {
            for _ in 0..8 {
                assert!(ring.try_write(next));
                next += 1;
            }
            assert!(ring.is_full());
            let mut expected = next - 8;
            while let Some(v) = ring.try_read() {
                assert_eq!(v, expected);
                expected += 1;
            }
            assert_eq!(expected, next);
        }
    }

    #[test]
    fn test_available_accessors() {
        let ring = RingBuffer::<u64>::with_capacity(8).unwrap();
        assert_eq!(ring.available_to_read(), 0);
        assert_eq!(ring.available_to_write(), 8);

        for i in 0..5 {
            ring.try_write(i);
        }
        assert_eq!(ring.available_to_read(), 5);
        assert_eq!(ring.available_to_write(), 3);

        ring.try_read();
        assert_eq!(ring.available_to_read(), 4);
    }

    #[test]
    fn test_reset_rewinds_positions() {
        let mut ring = RingBuffer::<u64>::with_capacity(4).unwrap();
        for i in 0..4 {
            ring.try_write(i);
        }
        ring.reset();
        assert!(ring.is_empty());
        assert_eq!(ring.available_to_write(), 4);
        assert!(ring.try_write(9));
        assert_eq!(ring.try_read(), Some(9));
    }
}
