//! Benchmarks for row adds and cascading deletes.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use tabula_core::schema::{Column, Rule};
use tabula_core::{DataType, Value};
use tabula_storage::{DataSet, DataTable, RelationDef, TableId};

fn keyed_table() -> DataTable {
    let mut t = DataTable::new("items");
    t.add_column(Column::new("id", DataType::Int64)).unwrap();
    t.add_column(Column::new("price", DataType::Float64)).unwrap();
    t.add_column(Column::new("symbol", DataType::String)).unwrap();
    t.set_primary_key(&["id"]).unwrap();
    t
}

/// One parent per `fanout` children, linked by a cascading foreign key.
fn populated_set(parents: i64, fanout: i64) -> (DataSet, TableId) {
    let mut ds = DataSet::new("bench");
    let p = ds.create_table("parents").unwrap();
    let t = ds.table_mut(p).unwrap();
    t.add_column(Column::new("id", DataType::Int64)).unwrap();
    t.set_primary_key(&["id"]).unwrap();
    let c = ds.create_table("children").unwrap();
    ds.table_mut(c)
        .unwrap()
        .add_column(Column::new("parent", DataType::Int64))
        .unwrap();
    ds.add_relation(RelationDef::new("r", "parents", &["id"], "children", &["parent"]).delete_rule(Rule::Cascade))
        .unwrap();
    for i in 0..parents {
        ds.add(p, vec![Value::Int64(i)]).unwrap();
        for _ in 0..fanout {
            ds.add(c, vec![Value::Int64(i)]).unwrap();
        }
    }
    ds.accept_changes().unwrap();
    (ds, p)
}

fn add_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_add");

    for size in [100i64, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut t = keyed_table();
                for i in 0..size {
                    t.add(vec![
                        Value::Int64(i),
                        Value::Float64(100.0 + i as f64 * 0.1),
                        Value::String(format!("SYM{}", i)),
                    ])
                    .unwrap();
                }
                black_box(t)
            });
        });
    }

    group.finish();
}

fn cascade_delete_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade_delete");

    for fanout in [10i64, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(fanout), fanout, |b, &fanout| {
            b.iter_batched(
                || populated_set(50, fanout),
                |(mut ds, parents)| {
                    let ids: Vec<_> = ds.table(parents).unwrap().row_ids().collect();
                    for id in ids {
                        ds.delete_row(parents, id).unwrap();
                    }
                    black_box(ds)
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, add_benchmark, cascade_delete_benchmark);
criterion_main!(benches);
