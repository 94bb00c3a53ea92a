//! Benchmarks for spark-bindings
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spark_bindings::collections::{checked_order_key_between, partition};
use spark_bindings::{
    row, ArrayConfig, ArrayProperty, Differential, MemoryStore, OrderRails, ReadWriteProperty,
    Row, Signal, TreeConfig, TreeProperty, Value,
};

fn flat_rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| row! { "id" => i as i64, "order" => i as f64 })
        .collect()
}

/// Groups of ten pages each.
fn grouped_rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            let parent = if i % 10 == 0 { Value::Null } else { Value::from((i - i % 10) as i64) };
            row! { "id" => i as i64, "parent" => parent, "order" => (i % 10) as f64 }
        })
        .collect()
}

// =============================================================================
// SIGNAL BENCHMARKS
// =============================================================================

fn bench_pipe_changed(c: &mut Criterion) {
    let (signal, notify) = Signal::pipe();
    let _removal = signal.observe_changing(|v: &i32, _| {
        black_box(*v);
    });
    c.bench_function("pipe_changed", |b| b.iter(|| notify.changed(black_box(42))));
}

fn bench_property_change(c: &mut Criterion) {
    let prop = ReadWriteProperty::new(0i32);
    let mut next = 0;
    c.bench_function("property_change", |b| {
        b.iter(|| {
            next += 1;
            prop.change(black_box(next), false)
        })
    });
}

fn bench_bidi_change(c: &mut Criterion) {
    let a = ReadWriteProperty::new(0i32);
    let other = ReadWriteProperty::new(0i32);
    let _binding = a.bind_bidi(&other);
    let mut next = 0;
    c.bench_function("bidi_change", |b| {
        b.iter(|| {
            next += 1;
            a.change(black_box(next), false)
        })
    });
}

// =============================================================================
// ORDERING BENCHMARKS
// =============================================================================

fn bench_order_key(c: &mut Criterion) {
    let rails = OrderRails::default();
    c.bench_function("order_key_between", |b| {
        b.iter(|| checked_order_key_between(black_box(Some(1.0)), black_box(Some(2.0)), &rails))
    });
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");

    for count in [10, 100, 1000] {
        let diff = Differential::new(flat_rows(count), flat_rows(count / 2));
        group.bench_with_input(BenchmarkId::new("rows", count), &diff, |b, diff| {
            b.iter(|| partition(black_box(diff), "id"))
        });
    }

    group.finish();
}

// =============================================================================
// PROJECTION BENCHMARKS
// =============================================================================

fn bench_array_initial_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_initial_load");

    for count in [100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("rows", count), &count, |b, &count| {
            let store = MemoryStore::with_rows("id", flat_rows(count));
            b.iter(|| {
                let array = ArrayProperty::new(store.clone(), ArrayConfig::default());
                array.start();
                store.flush();
                black_box(array.len())
            })
        });
    }

    group.finish();
}

fn bench_array_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_move");

    for count in [100, 1000] {
        group.bench_with_input(BenchmarkId::new("rows", count), &count, |b, &count| {
            let store = MemoryStore::with_rows("id", flat_rows(count));
            let array = ArrayProperty::new(store.clone(), ArrayConfig::default());
            array.start();
            store.flush();
            let last = count - 1;

            b.iter(|| {
                // Bounce the last element to the front and back.
                let id = array.elements()[last].id.clone();
                let front = array.order_for_move(last, 0).unwrap_or(-1.0);
                let _ = store.set(&id, "order", front);
                store.flush();
                let id = array.elements()[0].id.clone();
                let back = array.order_for_move(0, last).unwrap_or(count as f64);
                let _ = store.set(&id, "order", back);
                store.flush();
            })
        });
    }

    group.finish();
}

fn bench_tree_initial_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_initial_load");

    for count in [100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("rows", count), &count, |b, &count| {
            let store = MemoryStore::with_rows("id", grouped_rows(count));
            b.iter(|| {
                let tree = TreeProperty::new(store.clone(), TreeConfig::default());
                tree.start();
                store.flush();
                black_box(tree.len())
            })
        });
    }

    group.finish();
}

// =============================================================================
// CRITERION SETUP
// =============================================================================

criterion_group!(
    signal_benches,
    bench_pipe_changed,
    bench_property_change,
    bench_bidi_change,
);

criterion_group!(ordering_benches, bench_order_key, bench_partition);

criterion_group!(
    projection_benches,
    bench_array_initial_load,
    bench_array_move,
    bench_tree_initial_load,
);

criterion_main!(signal_benches, ordering_benches, projection_benches);
