use ringspsc::RingBuffer;
use std::sync::Arc;
use std::thread;

#[test]
fn test_spsc_integrity_under_contention() {
    const N: u64 = 100_000;

    let ring = Arc::new(RingBuffer::<u64>::with_capacity(1 << 10).unwrap());

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for v in 1..=N {
                while !ring.try_write(v) {
                    thread::yield_now();
                }
            }
        })
    };

    let consumer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let mut sum = 0u64;
            let mut count = 0u64;
            let mut last = 0u64;
            while count < N {
                match ring.try_read() {
                    Some(v) => {
                        // FIFO from a single producer means strictly ascending.
                        assert_eq!(v, last + 1, "out-of-order read: {} after {}", v, last);
                        last = v;
                        sum += v;
                        count += 1;
                    }
                    None => thread::yield_now(),
                }
            }
            (sum, count)
        })
    };

    producer.join().unwrap();
    let (sum, count) = consumer.join().unwrap();

    assert_eq!(count, N);
    assert_eq!(sum, N * (N + 1) / 2, "a value was duplicated or lost");
    assert!(ring.is_empty());
}

#[test]
fn test_spsc_integrity_small_ring() {
    // A tiny ring forces constant full/empty transitions, exercising the
    // cached-position refresh on both sides.
    const N: u64 = 20_000;

    let ring = Arc::new(RingBuffer::<u64>::with_capacity(2).unwrap());

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for v in 1..=N {
                while !ring.try_write(v) {
                    std::hint::spin_loop();
                }
            }
        })
    };

    let mut expected = 1u64;
    while expected <= N {
        if let Some(v) = ring.try_read() {
            assert_eq!(v, expected);
            expected += 1;
        } else {
            std::hint::spin_loop();
        }
    }

    producer.join().unwrap();
    assert!(ring.is_empty());
}
