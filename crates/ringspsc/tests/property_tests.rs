//! Property-based tests for the SPSC ring.
//!
//! Single-threaded drivers: the properties cover the sequential contract
//! (occupancy bounds, FIFO, no spurious full/empty); the cross-thread
//! ordering protocol is exercised by tests/concurrency.rs.

use proptest::prelude::*;
use ringspsc::RingBuffer;

proptest! {
    /// Occupancy never exceeds capacity after any write/read interleaving.
    #[test]
    fn prop_bounded_occupancy(
        ops in prop::collection::vec(prop::bool::ANY, 1..200),
        cap_bits in 0u32..6,
    ) {
        let capacity = 1usize << cap_bits;
        let ring = RingBuffer::<u64>::with_capacity(capacity).unwrap();
        let mut model_len = 0usize;

        for (i, write) in ops.into_iter().enumerate() {
            if write {
                let accepted = ring.try_write(i as u64);
                prop_assert_eq!(accepted, model_len < capacity,
                    "try_write must fail iff full (len {} of {})", model_len, capacity);
                if accepted {
                    model_len += 1;
                }
            } else {
                let got = ring.try_read();
                prop_assert_eq!(got.is_some(), model_len > 0,
                    "try_read must fail iff empty (len {})", model_len);
                if got.is_some() {
                    model_len -= 1;
                }
            }
            prop_assert!(ring.available_to_read() <= capacity);
            prop_assert_eq!(ring.available_to_read(), model_len);
        }
    }

    /// Values come out in exactly the order and multiplicity they went in.
    #[test]
    fn prop_fifo_against_model(
        ops in prop::collection::vec(prop::bool::ANY, 1..300),
    ) {
        let ring = RingBuffer::<u64>::with_capacity(16).unwrap();
        let mut model = std::collections::VecDeque::new();
        let mut next = 0u64;

        for write in ops {
            if write {
                if ring.try_write(next) {
                    model.push_back(next);
                }
                next += 1;
            } else {
                prop_assert_eq!(ring.try_read(), model.pop_front());
            }
        }

        // Drain and compare the tail of the model.
        while let Some(v) = ring.try_read() {
            prop_assert_eq!(Some(v), model.pop_front());
        }
        prop_assert!(model.is_empty());
    }
}
