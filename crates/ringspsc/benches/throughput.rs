use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ringspsc::RingBuffer;
use std::sync::Arc;
use std::thread;

const MESSAGES: u64 = 1_000_000;

fn bench_spsc_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_ring");
    group.throughput(Throughput::Elements(MESSAGES));

    for cap_bits in [10u32, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("cap_2^{}", cap_bits)),
            &cap_bits,
            |b, &bits| {
                b.iter(|| {
                    let ring = Arc::new(RingBuffer::<u64>::with_capacity(1 << bits).unwrap());

                    let producer = {
                        let ring = Arc::clone(&ring);
                        thread::spawn(move || {
                            for v in 0..MESSAGES {
                                while !ring.try_write(v) {
                                    std::hint::spin_loop();
                                }
                            }
                        })
                    };

                    let mut count = 0u64;
                    while count < MESSAGES {
                        match ring.try_read() {
                            Some(v) => {
                                black_box(v);
                                count += 1;
                            }
                            None => std::hint::spin_loop(),
                        }
                    }

                    producer.join().unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_spsc_throughput);
criterion_main!(benches);
