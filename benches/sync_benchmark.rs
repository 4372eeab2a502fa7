/*!
 * Synchronization Primitives Benchmarks
 *
 * Compare the adaptive mutex against parking_lot and std mutexes, and
 * measure atomic value load/store cost
 */

use adaptive_sync::{AdaptiveMutex, AtomicValue, Mutex, Value};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::thread;

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended_lock_unlock");

    let adaptive = AdaptiveMutex::new();
    group.bench_function("adaptive_raw", |b| {
        b.iter(|| {
            adaptive.lock();
            adaptive.unlock();
        });
    });

    let guarded = Mutex::new(0u64);
    group.bench_function("adaptive_guard", |b| {
        b.iter(|| *guarded.lock() += 1);
    });

    let pl = parking_lot::Mutex::new(0u64);
    group.bench_function("parking_lot", |b| {
        b.iter(|| *pl.lock() += 1);
    });

    let std_mutex = std::sync::Mutex::new(0u64);
    group.bench_function("std", |b| {
        b.iter(|| *std_mutex.lock().unwrap() += 1);
    });

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_increments");
    group.sample_size(20);

    for threads in [2usize, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("adaptive", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let counter = Arc::new(Mutex::new(0u64));
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let counter = counter.clone();
                            thread::spawn(move || {
                                for _ in 0..10_000 {
                                    *counter.lock() += 1;
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                    black_box(*counter.lock())
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("parking_lot", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let counter = Arc::new(parking_lot::Mutex::new(0u64));
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let counter = counter.clone();
                            thread::spawn(move || {
                                for _ in 0..10_000 {
                                    *counter.lock() += 1;
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                    black_box(*counter.lock())
                });
            },
        );
    }

    group.finish();
}

fn bench_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("atomic_value");

    let cell = AtomicValue::new();
    cell.store(Value::new(String::from("config-v1")));

    group.bench_function("load", |b| {
        b.iter(|| black_box(cell.load()));
    });

    group.bench_function("store", |b| {
        let value = Value::new(String::from("config-v2"));
        b.iter(|| cell.store(value.clone()));
    });

    group.bench_function("swap", |b| {
        let value = Value::new(String::from("config-v3"));
        b.iter(|| black_box(cell.swap(value.clone())));
    });

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_contended, bench_value);
criterion_main!(benches);
