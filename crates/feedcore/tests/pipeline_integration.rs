//! End-to-end pipeline tests: injection, raw decode path, drain-on-stop,
//! backpressure and the sink-mode cold path.

use feedcore::{
    CollectingSink, Pipeline, PipelineConfig, Side, Snapshot, WireMessage, PRICE_SCALE,
};
use rand::Rng;
use std::time::{Duration, Instant};

const POLL_DEADLINE: Duration = Duration::from_secs(5);

fn small_config() -> PipelineConfig {
    PipelineConfig {
        raw_ring_capacity: 1 << 8,
        message_ring_capacity: 1 << 8,
        snapshot_ring_capacity: 1 << 11,
        buffer_count: 64,
        buffer_size: 256,
        max_symbols: 8,
        ..PipelineConfig::default()
    }
}

/// Polls `f` until it yields a value or the deadline passes.
fn poll_until<T>(mut f: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + POLL_DEADLINE;
    loop {
        if let Some(v) = f() {
            return v;
        }
        assert!(Instant::now() < deadline, "timed out waiting for pipeline");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Appends a stop-bit integer (test-side encoder).
fn push_stop_bit(out: &mut Vec<u8>, value: u64) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7F) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (1..n).rev() {
        out.push(groups[i]);
    }
    out.push(groups[0] | 0x80);
}

/// Encodes a NewOrder packet carrying every optional field.
fn encode_new_order(seq: u64, security_id: u64, price_units: u64, qty: u64, order_id: u64) -> Vec<u8> {
    let mut p = vec![0x01 | 0x02 | 0x04 | 0x08 | 0x10];
    push_stop_bit(&mut p, 1); // template id
    push_stop_bit(&mut p, seq);
    p.push(b'D');
    push_stop_bit(&mut p, 1_700_000_000);
    push_stop_bit(&mut p, security_id);
    push_stop_bit(&mut p, 0); // exponent 0: whole units
    push_stop_bit(&mut p, price_units);
    push_stop_bit(&mut p, qty);
    p.push(b'1');
    push_stop_bit(&mut p, order_id);
    while p.len() < 16 {
        p.push(0);
    }
    p
}

#[test]
fn test_injected_message_reaches_snapshot_feed() {
    let mut pipeline = Pipeline::new(small_config()).unwrap();
    pipeline.start().unwrap();

    let msg = WireMessage::new_order(3, Side::Buy, 100 * PRICE_SCALE, 50, 1);
    assert!(pipeline.inject_message(msg));

    let snapshot = poll_until(|| pipeline.try_read_snapshot());
    assert_eq!(snapshot.symbol_index, 3);
    assert_eq!(snapshot.bid_price, 100 * PRICE_SCALE);
    assert_eq!(snapshot.bid_quantity, 50);
    assert_eq!(snapshot.update_count, 1);

    pipeline.stop();
}

#[test]
fn test_raw_packet_path_end_to_end() {
    let mut pipeline = Pipeline::new(small_config()).unwrap();
    pipeline.start().unwrap();

    // security_id 2005 folds to symbol 5; price 120 units = 120e8 fixed-point.
    let packet = encode_new_order(1, 2_005, 120, 75, 42);
    assert!(pipeline.publish_raw(&packet, 1, 9));

    let snapshot = poll_until(|| pipeline.try_read_snapshot());
    assert_eq!(snapshot.symbol_index, 5);
    assert_eq!(snapshot.bid_price, 120 * PRICE_SCALE);
    assert_eq!(snapshot.bid_quantity, 75);

    let stats = pipeline.stats();
    assert_eq!(stats.packets_published, 1);
    assert_eq!(stats.messages_decoded, 1);
    assert_eq!(stats.decode_errors, 0);

    pipeline.stop();
}

#[test]
fn test_undersize_packet_counts_decode_error() {
    let mut pipeline = Pipeline::new(small_config()).unwrap();
    pipeline.start().unwrap();

    assert!(pipeline.publish_raw(&[0u8; 8], 1, 0));
    poll_until(|| (pipeline.stats().decode_errors == 1).then_some(()));
    assert_eq!(pipeline.stats().messages_decoded, 0);

    pipeline.stop();
}

#[test]
fn test_stop_drains_pending_messages() {
    let mut pipeline = Pipeline::new(small_config()).unwrap();
    pipeline.start().unwrap();

    const N: u64 = 100;
    for i in 0..N {
        let msg = WireMessage::new_order(2, Side::Buy, (100 + i as i64) * PRICE_SCALE, 10, i + 1);
        while !pipeline.inject_message(msg) {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pipeline.stop();

    // Hot rings drained by shutdown; the snapshot ring retains output for
    // this (sink-less) consumer.
    let stats = pipeline.stats();
    assert_eq!(stats.raw_backlog, 0);
    assert_eq!(stats.message_backlog, 0);
    assert_eq!(stats.book_updates, N);

    let mut last = None;
    while let Some(s) = pipeline.try_read_snapshot() {
        assert_eq!(s.symbol_index, 2);
        last = Some(s);
    }
    let last = last.expect("at least one snapshot for the affected symbol");
    assert_eq!(last.update_count, N);
    assert_eq!(last.bid_price, (100 + N as i64 - 1) * PRICE_SCALE);
    assert_eq!(pipeline.pending_snapshot_count(), 0);
}

#[test]
fn test_alternating_sides_thousand_messages() {
    let mut pipeline = Pipeline::new(small_config()).unwrap();
    pipeline.start().unwrap();

    let mut rng = rand::thread_rng();
    let mut max_bid = 0i64;
    for i in 0..1_000u64 {
        let units: i64 = rng.gen_range(50..150);
        let price = units * PRICE_SCALE;
        let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
        if side == Side::Buy && price > max_bid {
            max_bid = price;
        }
        let msg = WireMessage::new_order(0, side, price, 10, i + 1);
        while !pipeline.inject_message(msg) {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pipeline.stop();

    let mut last: Option<Snapshot> = None;
    while let Some(s) = pipeline.try_read_snapshot() {
        last = Some(s);
    }
    let last = last.unwrap();
    assert_eq!(last.update_count, 1_000);
    assert_eq!(last.bid_price, max_bid);
}

#[test]
fn test_publish_raw_backpressure() {
    // No workers: the raw ring fills and ingress sees backpressure.
    let config = PipelineConfig {
        raw_ring_capacity: 4,
        ..small_config()
    };
    let pipeline = Pipeline::new(config).unwrap();

    let packet = encode_new_order(1, 1, 100, 10, 1);
    for seq in 0..4 {
        assert!(pipeline.publish_raw(&packet, seq, 0));
    }
    assert!(!pipeline.publish_raw(&packet, 4, 0));

    let stats = pipeline.stats();
    assert_eq!(stats.packets_published, 4);
    assert_eq!(stats.raw_ring_full, 1);
    assert_eq!(stats.raw_backlog, 4);
}

#[test]
fn test_unknown_symbol_is_dropped() {
    let mut pipeline = Pipeline::new(small_config()).unwrap();
    pipeline.start().unwrap();

    let msg = WireMessage::new_order(999, Side::Buy, 100, 10, 1); // beyond max_symbols=8
    assert!(pipeline.inject_message(msg));
    poll_until(|| (pipeline.stats().unknown_symbol_drops == 1).then_some(()));
    assert_eq!(pipeline.stats().book_updates, 0);

    pipeline.stop();
}

#[test]
fn test_sink_mode_delivers_and_drains() {
    let sink = CollectingSink::new();
    let handle = sink.handle();

    let mut pipeline = Pipeline::with_sink(small_config(), Box::new(sink)).unwrap();
    pipeline.start().unwrap();

    const N: u64 = 50;
    for i in 0..N {
        let msg = WireMessage::new_order(1, Side::Sell, (200 + i as i64) * PRICE_SCALE, 5, i + 1);
        while !pipeline.inject_message(msg) {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pipeline.stop();

    // The cold worker drained every snapshot into the sink before exiting.
    let seen = handle.lock().unwrap();
    assert_eq!(seen.len() as u64, N);
    assert!(seen.iter().all(|s| s.symbol_index == 1));
    assert_eq!(seen.last().unwrap().update_count, N);
    // Best ask is the lowest sell price seen.
    assert_eq!(seen.last().unwrap().ask_price, 200 * PRICE_SCALE);
    assert_eq!(pipeline.pending_snapshot_count(), 0);
}

#[test]
fn test_restart_rejects_double_start() {
    let mut pipeline = Pipeline::new(small_config()).unwrap();
    pipeline.start().unwrap();
    assert!(pipeline.start().is_err());
    pipeline.stop();
    // Restart is allowed once stopped.
    pipeline.start().unwrap();
    pipeline.stop();
}
