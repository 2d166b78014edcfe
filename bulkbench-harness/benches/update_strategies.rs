//! Criterion benchmark: the four update strategies and the three filter
//! strategies against both backends.
//!
//! Each iteration empties and reseeds the table inside one long transaction;
//! only the strategy call is timed.

use bulkbench_core::BenchConfig;
use bulkbench_harness::{reset_rows, seed, FilterStrategy, UpdateStrategy, UpdateTarget};
use bulkbench_storage::{MemoryStore, Session, SqliteStore, StorageBackend};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::time::{Duration, Instant};

fn bench_config() -> BenchConfig {
    BenchConfig {
        seed_rows: 5_000,
        update_above: 2_500,
        update_below: 3_750,
        in_clause_max: 500,
        parameter_limit: Some(500),
        ..BenchConfig::default()
    }
}

fn bench_updates<B: StorageBackend>(c: &mut Criterion, name: &str, backend: B) {
    let config = bench_config();
    let target = UpdateTarget::from_config(&config);
    let mut session = Session::new(backend);
    session.begin().expect("begin");

    let mut group = c.benchmark_group(format!("update/{name}"));
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    for strategy in UpdateStrategy::all(config.in_clause_max) {
        group.bench_function(BenchmarkId::from_parameter(strategy.label()), |b| {
            b.iter_custom(|iters| {
                let mut total = Duration::ZERO;
                for _ in 0..iters {
                    reset_rows(&mut session).expect("reset rows");
                    seed(&mut session, config.seed_rows).expect("seed rows");
                    let loaded = strategy.load(&mut session, &target).expect("load rows");

                    let start = Instant::now();
                    let affected = strategy
                        .run(&mut session, &target, loaded)
                        .expect("run strategy");
                    total += start.elapsed();
                    black_box(affected);
                }
                total
            });
        });
    }
    group.finish();
    session.rollback().expect("rollback");
}

fn bench_filters<B: StorageBackend>(c: &mut Criterion, name: &str, backend: B) {
    let config = bench_config();
    let mut session = Session::new(backend);
    session.begin().expect("begin");
    seed(&mut session, config.seed_rows).expect("seed rows");
    let code = config.filter_target();

    let mut group = c.benchmark_group(format!("filter/{name}"));
    for strategy in FilterStrategy::ALL {
        group.bench_function(BenchmarkId::from_parameter(strategy.label()), |b| {
            b.iter(|| {
                let found = strategy.find(&mut session, black_box(code)).expect("find");
                session.clear();
                black_box(found);
            });
        });
    }
    group.finish();
    session.rollback().expect("rollback");
}

fn bench_memory(c: &mut Criterion) {
    let limit = bench_config().parameter_limit;
    bench_updates(c, "memory", MemoryStore::new().with_parameter_limit(limit));
    bench_filters(c, "memory", MemoryStore::new().with_parameter_limit(limit));
}

fn bench_sqlite(c: &mut Criterion) {
    let limit = bench_config().parameter_limit;
    let open = || {
        SqliteStore::open_in_memory()
            .expect("Failed to open in-memory SQLite")
            .with_parameter_limit(limit)
    };
    bench_updates(c, "sqlite", open());
    bench_filters(c, "sqlite", open());
}

criterion_group!(benches, bench_memory, bench_sqlite);
criterion_main!(benches);
