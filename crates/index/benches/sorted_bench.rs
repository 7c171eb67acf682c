//! Benchmarks for tabula-index using criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tabula_core::Value;
use tabula_index::{HashIndex, Index, MultiKeyComparator, Order, SortedIndex};

fn sorted_insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted_insert");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let cmp = MultiKeyComparator::new(vec![Order::Asc], false);
                let mut index = SortedIndex::new(cmp);
                for i in 0..size {
                    // Scatter keys so inserts land mid-vector.
                    let key = (i * 7919) % size;
                    index.insert(vec![Value::Int64(key as i64)], i as u64);
                }
                black_box(index)
            });
        });
    }

    group.finish();
}

fn hash_unique_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_unique_add");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut index: HashIndex<Vec<Value>> = HashIndex::new(true);
                for i in 0..size {
                    index.add(vec![Value::Int64(i as i64)], i as u64).unwrap();
                }
                black_box(index)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, sorted_insert_benchmark, hash_unique_benchmark);
criterion_main!(benches);
