// Copyright 2025 Hyrax Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lock manager throughput
//!
//! Run with: cargo bench --bench lock_manager
//!
//! Uncontended acquire/release cycles, the path every record access pays
//! for, plus a contended run with several threads per hot entity.

use std::hint::black_box;
use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hyrax::{DatasetId, JobId, LockManager, LockManagerConfig, LockMode, TransactionContext};

const LOCKS_PER_TXN: i32 = 100;

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock uncontended");
    let lm = LockManager::new(LockManagerConfig::default());
    let mut next_job = 0i64;

    for mode in [LockMode::Shared, LockMode::Exclusive] {
        group.bench_function(BenchmarkId::new("lock+release", mode), |b| {
            b.iter(|| {
                next_job += 1;
                let txn = Arc::new(TransactionContext::new(JobId(next_job)));
                for entity in 0..LOCKS_PER_TXN {
                    black_box(lm.lock(DatasetId(1), entity, mode, &txn).unwrap());
                }
                lm.release_locks(&txn).unwrap();
            });
        });
    }

    group.bench_function("instant_try_lock", |b| {
        let txn = Arc::new(TransactionContext::new(JobId(-1)));
        b.iter(|| {
            for entity in 0..LOCKS_PER_TXN {
                black_box(
                    lm.instant_try_lock(DatasetId(2), entity, LockMode::Shared, &txn)
                        .unwrap(),
                );
            }
        });
    });

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock contended");
    group.sample_size(20);

    for threads in [2usize, 4] {
        group.bench_function(BenchmarkId::new("exclusive hot set", threads), |b| {
            b.iter(|| {
                let lm = Arc::new(LockManager::new(LockManagerConfig::default()));
                let workers: Vec<_> = (0..threads)
                    .map(|w| {
                        let lm = Arc::clone(&lm);
                        thread::spawn(move || {
                            for round in 0..50 {
                                let job = (w * 1000 + round) as i64;
                                let txn = Arc::new(TransactionContext::new(JobId(job)));
                                // Ascending entity order keeps the run deadlock free
                                for entity in 0..4 {
                                    lm.lock(DatasetId(1), entity, LockMode::Exclusive, &txn)
                                        .unwrap();
                                }
                                lm.release_locks(&txn).unwrap();
                            }
                        })
                    })
                    .collect();
                for worker in workers {
                    worker.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_contended);
criterion_main!(benches);
