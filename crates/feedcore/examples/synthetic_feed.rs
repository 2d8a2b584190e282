//! Synthetic feed demo: encodes randomized NewOrder packets, pushes them
//! through the full decode path and prints the resulting top of book.
//!
//! ```sh
//! cargo run --example synthetic_feed
//! ```

use feedcore::{Pipeline, PipelineConfig, PRICE_SCALE};
use rand::Rng;
use std::time::Duration;

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

fn encode_new_order(seq: u64, security_id: u64, price_units: u64, qty: u64, side: u8, order_id: u64) -> Vec<u8> {
    let mut p = vec![0x01 | 0x02 | 0x04 | 0x08 | 0x10];
    push_stop_bit(&mut p, 1);
    push_stop_bit(&mut p, seq);
    p.push(b'D');
    push_stop_bit(&mut p, 1_700_000_000);
    push_stop_bit(&mut p, security_id);
    push_stop_bit(&mut p, 0);
    push_stop_bit(&mut p, price_units);
    push_stop_bit(&mut p, qty);
    p.push(side);
    push_stop_bit(&mut p, order_id);
    while p.len() < 16 {
        p.push(0);
    }
    p
}

fn main() {
    const PACKETS: u64 = 100_000;
    const SYMBOLS: u64 = 4;

    let mut pipeline = Pipeline::new(PipelineConfig {
        max_symbols: SYMBOLS as usize,
        ..PipelineConfig::default()
    })
    .expect("default configuration is valid");
    pipeline.start().expect("pipeline starts");

    println!("Synthetic feed: {PACKETS} packets across {SYMBOLS} symbols\n");

    let mut rng = rand::thread_rng();
    let mut published = 0u64;
    let mut best: Vec<Option<(i64, i64, i64, i64)>> = vec![None; SYMBOLS as usize];

    for seq in 0..PACKETS {
        let security_id = rng.gen_range(0..SYMBOLS);
        let units = rng.gen_range(90..110);
        let qty = rng.gen_range(1..500);
        let side = if rng.gen_bool(0.5) { b'1' } else { b'2' };
        let packet = encode_new_order(seq, security_id, units, qty, side, seq + 1);

        if pipeline.publish_raw(&packet, seq, 0) {
            published += 1;
        }

        // Drain the snapshot feed opportunistically, keeping the freshest
        // top of book per symbol.
        while let Some(s) = pipeline.try_read_snapshot() {
            best[s.symbol_index as usize] =
                Some((s.bid_price, s.bid_quantity, s.ask_price, s.ask_quantity));
        }
    }

    // Let the workers finish, then drain what remains.
    std::thread::sleep(Duration::from_millis(50));
    while let Some(s) = pipeline.try_read_snapshot() {
        best[s.symbol_index as usize] =
            Some((s.bid_price, s.bid_quantity, s.ask_price, s.ask_quantity));
    }
    pipeline.stop();

    for (symbol, top) in best.iter().enumerate() {
        match top {
            Some((bp, bq, ap, aq)) => println!(
                "symbol {symbol}: bid {}x{} ask {}x{}",
                bp / PRICE_SCALE,
                bq,
                ap / PRICE_SCALE,
                aq
            ),
            None => println!("symbol {symbol}: no updates"),
        }
    }

    let stats = pipeline.stats();
    println!(
        "\npublished {published}, decoded {}, decode errors {}, book updates {}, snapshots emitted {} (dropped {})",
        stats.messages_decoded,
        stats.decode_errors,
        stats.book_updates,
        stats.snapshots_emitted,
        stats.snapshots_dropped,
    );
}
