//! Performance benchmarks for form synchronization.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use formsync::{
    resolve, to_snapshot, ArrayControl, Control, FieldControl, FileStorage, FormManager,
    GroupControl, UpdateOptions, UpsertOptions,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

/// A group holding `rows` address rows, each a group of three fields.
fn address_book(rows: usize) -> (Arc<GroupControl>, Arc<FieldControl>) {
    let first_street = FieldControl::new(json!("street 0"));
    let addresses = ArrayControl::new();
    for i in 0..rows {
        let row = GroupControl::new();
        let street = if i == 0 {
            Arc::clone(&first_street)
        } else {
            FieldControl::new(json!(format!("street {}", i)))
        };
        row.add_control("street", street);
        row.add_control("city", FieldControl::new(json!("Springfield")));
        row.add_control("zip", FieldControl::new(json!(format!("{:05}", i))));
        addresses.push(row);
    }

    let form = GroupControl::new();
    form.add_control("owner", FieldControl::new(json!("someone")));
    form.add_control("addresses", addresses);
    (form, first_street)
}

/// Benchmark snapshotting trees of varying size
fn bench_to_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_snapshot");

    for rows in [1, 10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("rows", rows), &rows, |b, &rows| {
            let (form, _) = address_book(rows);
            b.iter(|| black_box(to_snapshot(&*form)));
        });
    }

    group.finish();
}

/// Benchmark path resolution at increasing depth
fn bench_resolve(c: &mut Criterion) {
    let (form, _) = address_book(100);
    let snapshot = to_snapshot(&*form);

    c.bench_function("resolve_nested", |b| {
        b.iter(|| black_box(resolve(Some(&snapshot), black_box("addresses[99].street"))));
    });

    c.bench_function("resolve_missing", |b| {
        b.iter(|| black_box(resolve(Some(&snapshot), black_box("addresses[99].country"))));
    });
}

/// Benchmark a single edit flowing through the manager into the store
fn bench_edit_mirroring(c: &mut Criterion) {
    let mut group = c.benchmark_group("edit_mirroring");

    for rows in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("rows", rows), &rows, |b, &rows| {
            let manager = FormManager::default();
            let (form, street) = address_book(rows);
            manager.upsert("book", form, UpsertOptions::new());

            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                street.set_value(&json!(n), UpdateOptions::default());
            });
        });
    }

    group.finish();
}

/// Benchmark edits with durable file storage enabled
fn bench_persisted_edits(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path()).unwrap());
    let manager = FormManager::new(storage);
    let (form, street) = address_book(10);
    manager.upsert("book", form, UpsertOptions::new().persist(true));

    let mut n = 0u64;
    c.bench_function("persisted_edit", |b| {
        b.iter(|| {
            n += 1;
            street.set_value(&json!(n), UpdateOptions::default());
        });
    });

    black_box(street.value());
}

criterion_group!(
    benches,
    bench_to_snapshot,
    bench_resolve,
    bench_edit_mirroring,
    bench_persisted_edits,
);
criterion_main!(benches);
