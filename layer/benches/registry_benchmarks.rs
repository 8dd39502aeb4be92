use std::sync::Arc;
use std::thread;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use redlilium_layer::registry::{HandleMap, HandleTable};

/// Handle-like keys: non-zero and spread the way driver pointers are.
fn handle_keys(count: usize) -> Vec<u64> {
    (1..=count as u64).map(|i| 0x7f00_0000_0000 + i * 0x40).collect()
}

// ---------------------------------------------------------------------------
// Single-threaded table operations
// ---------------------------------------------------------------------------

fn bench_table_insert_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_table_insert_remove");
    for count in [64usize, 1024, 4096] {
        let keys = handle_keys(count);
        let table = HandleTable::with_capacity(count * 2);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &keys, |b, keys| {
            b.iter(|| {
                for &key in keys {
                    let _ = table.insert(key, key);
                }
                for &key in keys {
                    black_box(table.remove(key));
                }
            });
        });
    }
    group.finish();
}

fn bench_table_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_table_lookup");
    for count in [64usize, 1024, 4096] {
        let keys = handle_keys(count);
        let table = HandleTable::with_capacity(count * 2);
        for &key in &keys {
            let _ = table.insert(key, key);
        }
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &keys, |b, keys| {
            b.iter(|| {
                for &key in keys {
                    black_box(table.lookup(key));
                }
            });
        });
    }
    group.finish();
}

fn bench_map_lookup_miss(c: &mut Criterion) {
    let keys = handle_keys(1024);
    let map = HandleMap::with_capacity(2048);
    for &key in &keys {
        let _ = map.insert(key, key);
    }
    c.bench_function("handle_map_lookup_miss_1024", |b| {
        b.iter(|| black_box(map.get(0xdead_0000)));
    });
}

// ---------------------------------------------------------------------------
// Contended access
// ---------------------------------------------------------------------------

fn bench_map_concurrent_lookup(c: &mut Criterion) {
    let keys = Arc::new(handle_keys(1024));
    let map = Arc::new(HandleMap::with_capacity(2048));
    for &key in keys.iter() {
        let _ = map.insert(key, key);
    }

    c.bench_function("handle_map_lookup_4_threads", |b| {
        b.iter(|| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let map = Arc::clone(&map);
                    let keys = Arc::clone(&keys);
                    thread::spawn(move || {
                        let mut hits = 0usize;
                        for &key in keys.iter() {
                            if map.get(key).is_some() {
                                hits += 1;
                            }
                        }
                        hits
                    })
                })
                .collect();
            for worker in workers {
                black_box(worker.join().unwrap_or_default());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_table_insert_remove,
    bench_table_lookup,
    bench_map_lookup_miss,
    bench_map_concurrent_lookup,
);
criterion_main!(benches);
