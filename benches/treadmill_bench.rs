//! Allocation and collection throughput benchmarks.
//!
//! Run with: `cargo bench`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use treadgc::config::TmConfig;
use treadgc::heap::GlobalState;

fn bump_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("bump_allocate");
    for size in [16usize, 64, 256].iter() {
        group.bench_with_input(BenchmarkId::new("cell_size", size), size, |b, &size| {
            b.iter(|| {
                let mut heap = GlobalState::new(TmConfig::default()).unwrap();
                for _ in 0..1000 {
                    let a = heap.alloc(size).unwrap();
                    black_box(a);
                }
            });
        });
    }
    group.finish();
}

fn churn_with_frees(c: &mut Criterion) {
    c.bench_function("churn_alloc_free", |b| {
        b.iter(|| {
            let mut heap = GlobalState::new(TmConfig::default()).unwrap();
            let mut live = Vec::with_capacity(128);
            for i in 0..4000 {
                let a = heap.alloc(32).unwrap();
                if i % 2 == 0 {
                    live.push(a);
                } else {
                    heap.free(a);
                }
            }
            black_box(&live);
        });
    });
}

criterion_group!(benches, bump_allocate, churn_with_frees);
criterion_main!(benches);
