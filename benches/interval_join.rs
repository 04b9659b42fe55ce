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

//! Interval join comparison
//!
//! Run with: cargo bench --bench interval_join
//!
//! The same overlapping join through the index joiner, the overlapping
//! partition joiner and the disjoint partition joiner, once with enough
//! memory and once with a budget that forces spilling.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hyrax::executor::join::{CountingWriter, IntervalField, IntervalPartitioner, VecTupleStream};
use hyrax::{
    DisjointPartitionJoiner, IntervalIndexJoiner, IntervalMergeJoinChecker, IntervalPredicate,
    JoinConfig, JoinStatus, OverlappingPartitionJoiner, ResultAppender,
};

const TUPLES: i64 = 5_000;
const FIELD: IntervalField = IntervalField {
    start_offset: 8,
    end_offset: 16,
};

/// Start-sorted `(id, start, end)` tuples with a mix of short and long intervals
fn input(seed: i64) -> Vec<Vec<u8>> {
    (0..TUPLES)
        .map(|i| {
            let start = i * 10;
            let len = if (i + seed) % 17 == 0 { 400 } else { 5 + (i * 7 + seed) % 20 };
            [i.to_le_bytes(), start.to_le_bytes(), (start + len).to_le_bytes()].concat()
        })
        .collect()
}

fn configs(dir: &std::path::Path) -> [(&'static str, JoinConfig); 2] {
    let base = JoinConfig::new().with_min_frame_size(4096).with_spill_dir(dir);
    [
        ("in-memory", base.clone().with_memory_frames(256)),
        ("spilling", base.with_memory_frames(2)),
    ]
}

fn bench_joiners(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let left = input(0);
    let right = input(3);
    let checker =
        IntervalMergeJoinChecker::new(IntervalPredicate::Overlapping, FIELD, FIELD);

    let mut group = c.benchmark_group("interval join");
    group.sample_size(10);

    for (name, config) in configs(dir.path()) {
        group.bench_function(BenchmarkId::new("index", name), |b| {
            b.iter(|| {
                let counter = CountingWriter::new();
                let mut output = ResultAppender::new(config.min_frame_size, counter.clone());
                let mut joiner = IntervalIndexJoiner::new(
                    &config,
                    checker,
                    VecTupleStream::new(left.clone()),
                    VecTupleStream::new(right.clone()),
                )
                .unwrap();
                assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Finished);
                black_box(counter.count())
            });
        });

        group.bench_function(BenchmarkId::new("overlapping-partition", name), |b| {
            let partitioner =
                IntervalPartitioner::covering(0, TUPLES * 10 + 400, config.partition_count)
                    .unwrap();
            b.iter(|| {
                let counter = CountingWriter::new();
                let mut output = ResultAppender::new(config.min_frame_size, counter.clone());
                let mut joiner = OverlappingPartitionJoiner::new(
                    &config,
                    checker,
                    partitioner,
                    VecTupleStream::new(left.clone()),
                    VecTupleStream::new(right.clone()),
                )
                .unwrap();
                assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Finished);
                black_box(counter.count())
            });
        });

        group.bench_function(BenchmarkId::new("disjoint-partition", name), |b| {
            b.iter(|| {
                let counter = CountingWriter::new();
                let mut output = ResultAppender::new(config.min_frame_size, counter.clone());
                let mut joiner = DisjointPartitionJoiner::new(
                    &config,
                    checker,
                    VecTupleStream::new(left.clone()),
                    VecTupleStream::new(right.clone()),
                )
                .unwrap();
                assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Finished);
                black_box(counter.count())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_joiners);
criterion_main!(benches);
