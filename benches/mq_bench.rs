use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rpqueues::{MultiQueue, MultiQueueConfig};

const PREFILL: u64 = 1 << 16;

fn bench_push_pop(c: &mut Criterion) {
    let configs = [
        (
            "buffered",
            MultiQueueConfig {
                c: 4,
                stickiness: 8,
                insertion_buffer_size: 16,
                deletion_buffer_size: 16,
            },
        ),
        (
            "unbuffered",
            MultiQueueConfig {
                c: 4,
                stickiness: 8,
                insertion_buffer_size: 0,
                deletion_buffer_size: 0,
            },
        ),
        (
            "no_stickiness",
            MultiQueueConfig {
                c: 4,
                stickiness: 1,
                insertion_buffer_size: 16,
                deletion_buffer_size: 16,
            },
        ),
    ];

    let mut group = c.benchmark_group("multiqueue");
    for (name, config) in configs {
        group.bench_function(format!("push_pop/{name}"), |b| {
            let pq = MultiQueue::<u64, u64>::with_config(1, 42, config);
            let mut handle = pq.handle(0);
            for key in 0..PREFILL {
                handle.push(key, key);
            }
            let mut key = 0u64;
            b.iter(|| {
                handle.push(black_box(key), key);
                key = (key + 1) & (PREFILL - 1);
                black_box(handle.try_pop());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_push_pop);
criterion_main!(benches);
