//! Benchmarks for CinderKV storage operations

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cinderkv::config::{Config, SyncStrategy};
use cinderkv::engine::Engine;
use tempfile::TempDir;

fn open_engine(dir: &TempDir, memtable_threshold: usize) -> Engine {
    let config = Config::builder()
        .data_dir(dir.path())
        .sync_strategy(SyncStrategy::OnRotate)
        .memtable_threshold(memtable_threshold)
        .build();
    Engine::open(config).unwrap()
}

fn write_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    for threshold in [16usize, 1000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("set", threshold),
            &threshold,
            |b, &threshold| {
                let dir = TempDir::new().unwrap();
                let engine = open_engine(&dir, threshold);
                let mut i = 0u64;
                b.iter(|| {
                    engine
                        .set(&format!("key{:08}", i % 10_000), "a value of moderate length")
                        .unwrap();
                    i += 1;
                });
            },
        );
    }

    group.finish();
}

fn read_benchmarks(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir, 256);
    for i in 0..10_000u64 {
        engine.set(&format!("key{:08}", i), "a value of moderate length").unwrap();
    }
    engine.flush().unwrap();

    let mut group = c.benchmark_group("read");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_from_segment", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(engine.get(&format!("key{:08}", i % 10_000)).unwrap());
            i = i.wrapping_add(7919);
        });
    });

    group.bench_function("get_missing", |b| {
        b.iter(|| black_box(engine.get("absent-key").unwrap()));
    });

    group.finish();
}

fn compaction_benchmarks(c: &mut Criterion) {
    c.bench_function("merge_segments", |b| {
        b.iter_with_setup(
            || {
                let dir = TempDir::new().unwrap();
                let config = Config::builder()
                    .data_dir(dir.path())
                    .sync_strategy(SyncStrategy::OnRotate)
                    .memtable_threshold(64)
                    .segment_size_limit(16 * 1024)
                    .compaction_workers(0)
                    .merge_interval_ms(0)
                    .build();
                let engine = Engine::open(config).unwrap();
                for i in 0..5_000u64 {
                    engine.set(&format!("key{:05}", i % 500), &format!("v{}", i)).unwrap();
                }
                (dir, engine)
            },
            |(_dir, engine)| black_box(engine.merge_segments().unwrap()),
        );
    });
}

criterion_group!(benches, write_benchmarks, read_benchmarks, compaction_benchmarks);
criterion_main!(benches);
