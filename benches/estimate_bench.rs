// benches/estimate_bench.rs
//! Throughput of `add` and `estimate` against a disk-backed store.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hllstore::{Config, HllStore};
use tempfile::NamedTempFile;

fn bench_add(c: &mut Criterion) {
    let file = NamedTempFile::new().unwrap();
    let mut store = HllStore::open(file.path(), 0.01, Config::default()).unwrap();
    let mut counter = 0u64;

    c.bench_function("add_unique_elements", |b| {
        b.iter(|| {
            counter += 1;
            store.add("bench-key", &counter.to_le_bytes()).unwrap();
        })
    });
}

fn bench_estimate(c: &mut Criterion) {
    let file = NamedTempFile::new().unwrap();
    let mut store = HllStore::open(file.path(), 0.01, Config::default()).unwrap();
    for i in 0..100_000u64 {
        store.add("bench-key", &i.to_le_bytes()).unwrap();
    }

    c.bench_function("estimate_100k_elements", |b| {
        b.iter(|| black_box(store.count("bench-key")))
    });
}

criterion_group!(benches, bench_add, bench_estimate);
criterion_main!(benches);
