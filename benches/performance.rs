//! Performance benchmarks for the directory indices.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pushdb::{DatabaseConfig, DeliveryPoint, PushDatabase};
use tempfile::TempDir;

fn create_db() -> PushDatabase {
    PushDatabase::open(&DatabaseConfig::memory()).unwrap()
}

/// Benchmark an add/remove cycle that cascades every time
fn bench_association_cycle(c: &mut Criterion) {
    let db = create_db();

    c.bench_function("association_add_remove_cascade", |b| {
        b.iter(|| {
            db.entities()
                .set_delivery_point(&DeliveryPoint::new("d1", "apns"))
                .unwrap();
            black_box(db.subscriptions().add_association("app1", "alice", "d1").unwrap());
            black_box(db.subscriptions().remove_association("app1", "alice", "d1").unwrap());
        });
    });
}

/// Benchmark wildcard listing with varying subscriber counts
fn bench_wildcard_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("wildcard_listing");

    for subscribers in [10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let db = create_db();
                for i in 0..count {
                    let subscriber = format!("user{i}");
                    db.subscriptions()
                        .add_association("app1", &subscriber, &format!("dp{i}"))
                        .unwrap();
                }

                b.iter(|| {
                    black_box(db.subscriptions().list_delivery_point_names("app1", "*").unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark snapshot flush
fn bench_flush(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = PushDatabase::open(&DatabaseConfig::memory_at(dir.path().join("bench.snapshot"))).unwrap();
    for i in 0..1000 {
        db.subscriptions()
            .add_association("app1", &format!("user{}", i % 100), &format!("dp{i}"))
            .unwrap();
    }

    c.bench_function("flush_1000_associations", |b| {
        b.iter(|| {
            db.flush().unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_association_cycle,
    bench_wildcard_listing,
    bench_flush,
);
criterion_main!(benches);
