//! Benchmarks for BufferPool
//!
//! Target: <50ns per acquire/release pair

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use udp_engine::infrastructure::BufferPool;

fn bench_acquire_release(c: &mut Criterion) {
    let pool = BufferPool::new(1400, 64, 128);

    c.bench_function("pool_acquire_release", |b| {
        b.iter(|| {
            let buf = pool.acquire();
            pool.release(black_box(buf));
        })
    });
}

fn bench_batch_cycle(c: &mut Criterion) {
    let pool = BufferPool::new(1400, 64, 128);
    let mut batch = Vec::with_capacity(50);

    // One event loop batch: 50 receives then 50 releases
    c.bench_function("pool_batch_50", |b| {
        b.iter(|| {
            for _ in 0..50 {
                batch.push(pool.acquire());
            }
            for buf in batch.drain(..) {
                pool.release(buf);
            }
        })
    });
}

fn bench_contended(c: &mut Criterion) {
    let pool = Arc::new(BufferPool::new(1400, 256, 512));

    c.bench_function("pool_contended_4_threads", |b| {
        b.iter(|| {
            std::thread::scope(|s| {
                for _ in 0..4 {
                    let pool = pool.clone();
                    s.spawn(move || {
                        for _ in 0..1000 {
                            let buf = pool.acquire();
                            pool.release(buf);
                        }
                    });
                }
            });
        })
    });
}

criterion_group!(benches, bench_acquire_release, bench_batch_cycle, bench_contended);
criterion_main!(benches);
