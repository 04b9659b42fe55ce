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

//! Interval Join Tests
//!
//! Every interval joiner must produce exactly the pairs a nested loop finds,
//! for every predicate, with and without spilling.
//!
//! Tuples are `(id, start, end)` as little-endian i64s.

use hyrax::executor::join::{
    Interval, IntervalField, IntervalPartitioner, ResultAppender, TupleCollector, VecTupleStream,
};
use hyrax::{
    Config, DisjointPartitionJoiner, IntervalIndexJoiner, IntervalMergeJoinChecker, IntervalPredicate,
    JoinConfig, JoinStatus, OverlappingPartitionJoiner,
};
use proptest::prelude::*;

const FIELD: IntervalField = IntervalField {
    start_offset: 8,
    end_offset: 16,
};

fn tuple(id: i64, start: i64, end: i64) -> Vec<u8> {
    [id.to_le_bytes(), start.to_le_bytes(), end.to_le_bytes()].concat()
}

/// Start-sorted tuples with ids from `id_base`
fn side(intervals: &[(i64, i64)], id_base: i64) -> Vec<Vec<u8>> {
    let mut sorted = intervals.to_vec();
    sorted.sort();
    sorted
        .iter()
        .enumerate()
        .map(|(i, &(start, len))| tuple(id_base + i as i64, start, start + len))
        .collect()
}

fn nested_loop(
    predicate: IntervalPredicate,
    left: &[Vec<u8>],
    right: &[Vec<u8>],
) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            if predicate.evaluate(&FIELD.read(l), &FIELD.read(r)) {
                out.push([l.as_slice(), r.as_slice()].concat());
            }
        }
    }
    out.sort();
    out
}

fn spilling_config(dir: &std::path::Path) -> JoinConfig {
    // Two 64-byte frames hold four 24-byte tuples
    JoinConfig::new()
        .with_min_frame_size(64)
        .with_memory_frames(2)
        .with_spill_dir(dir)
}

fn checker(predicate: IntervalPredicate) -> IntervalMergeJoinChecker {
    IntervalMergeJoinChecker::new(predicate, FIELD, FIELD)
}

fn collect(collector: &TupleCollector) -> Vec<Vec<u8>> {
    let mut got = collector.tuples();
    got.sort();
    got
}

fn index_join(
    config: &JoinConfig,
    predicate: IntervalPredicate,
    left: Vec<Vec<u8>>,
    right: Vec<Vec<u8>>,
) -> Vec<Vec<u8>> {
    let collector = TupleCollector::new();
    let mut output = ResultAppender::new(config.min_frame_size, collector.clone());
    let mut joiner = IntervalIndexJoiner::interval(
        config,
        predicate,
        FIELD,
        FIELD,
        VecTupleStream::new(left),
        VecTupleStream::new(right),
    )
    .unwrap();
    assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Finished);
    collect(&collector)
}

fn overlapping_join(
    config: &JoinConfig,
    predicate: IntervalPredicate,
    partitioner: IntervalPartitioner,
    left: Vec<Vec<u8>>,
    right: Vec<Vec<u8>>,
) -> Vec<Vec<u8>> {
    let collector = TupleCollector::new();
    let mut output = ResultAppender::new(config.min_frame_size, collector.clone());
    let mut joiner = OverlappingPartitionJoiner::new(
        config,
        checker(predicate),
        partitioner,
        VecTupleStream::new(left),
        VecTupleStream::new(right),
    )
    .unwrap();
    assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Finished);
    assert!(joiner.is_finished());
    collect(&collector)
}

fn disjoint_join(
    config: &JoinConfig,
    predicate: IntervalPredicate,
    left: Vec<Vec<u8>>,
    right: Vec<Vec<u8>>,
) -> Vec<Vec<u8>> {
    let collector = TupleCollector::new();
    let mut output = ResultAppender::new(config.min_frame_size, collector.clone());
    let mut joiner = DisjointPartitionJoiner::new(
        config,
        checker(predicate),
        VecTupleStream::new(left),
        VecTupleStream::new(right),
    )
    .unwrap();
    assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Finished);
    collect(&collector)
}

fn intervals() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..40, 0i64..8), 0..20)
}

fn predicate() -> impl Strategy<Value = IntervalPredicate> {
    prop::sample::select(IntervalPredicate::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_index_join_matches_nested_loop(
        left in intervals(),
        right in intervals(),
        predicate in predicate(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let config = spilling_config(dir.path());
        let left = side(&left, 0);
        let right = side(&right, 1000);

        let got = index_join(&config, predicate, left.clone(), right.clone());
        prop_assert_eq!(got, nested_loop(predicate, &left, &right));
        prop_assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn prop_overlapping_join_matches_nested_loop(
        left in intervals(),
        right in intervals(),
        predicate in predicate(),
        k in 1usize..6,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let config = spilling_config(dir.path());
        let left = side(&left, 0);
        let right = side(&right, 1000);
        let partitioner = IntervalPartitioner::covering(0, 48, k).unwrap();

        let got = overlapping_join(&config, predicate, partitioner, left.clone(), right.clone());
        prop_assert_eq!(got, nested_loop(predicate, &left, &right));
        prop_assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn prop_disjoint_join_matches_nested_loop(
        left in intervals(),
        right in intervals(),
        predicate in predicate(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let config = spilling_config(dir.path());
        let left = side(&left, 0);
        let right = side(&right, 1000);

        let got = disjoint_join(&config, predicate, left.clone(), right.clone());
        prop_assert_eq!(got, nested_loop(predicate, &left, &right));
        prop_assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn prop_inverse_swaps_sides(
        a in (0i64..20, 0i64..6),
        b in (0i64..20, 0i64..6),
        predicate in predicate(),
    ) {
        let a = Interval::new(a.0, a.0 + a.1);
        let b = Interval::new(b.0, b.0 + b.1);
        prop_assert_eq!(predicate.evaluate(&a, &b), predicate.inverse().evaluate(&b, &a));
        prop_assert_eq!(predicate.inverse().inverse(), predicate);
    }
}

#[test]
fn test_partition_count_does_not_change_result() {
    let config = Config::new()
        .with_join(JoinConfig::new().with_min_frame_size(1024).with_memory_frames(16));
    config.validate().unwrap();
    let config = config.join;
    // Long left intervals span three of four slices
    let left: Vec<_> = (0..10).map(|i| tuple(i, i * 4, i * 4 + 60)).collect();
    let right: Vec<_> = (0..25).map(|i| tuple(100 + i, i * 4, i * 4 + 3)).collect();
    let partitioner = |k| IntervalPartitioner::new(0, 25, k).unwrap();
    assert_eq!(partitioner(4).partitions(&Interval::new(0, 60)), (0, 2));

    for predicate in IntervalPredicate::ALL {
        let k4 = overlapping_join(&config, predicate, partitioner(4), left.clone(), right.clone());
        let k1 = overlapping_join(&config, predicate, partitioner(1), left.clone(), right.clone());
        assert_eq!(k4, k1, "{}", predicate);
        assert_eq!(k4, nested_loop(predicate, &left, &right), "{}", predicate);
    }
}

#[test]
fn test_index_join_spills_on_long_intervals() {
    let dir = tempfile::tempdir().unwrap();
    let config = spilling_config(dir.path());
    // Every right interval is live for every left one
    let left: Vec<_> = (0..30).map(|i| tuple(i, 10 + i, 11 + i)).collect();
    let right: Vec<_> = (0..10).map(|i| tuple(100 + i, i, 100)).collect();

    let collector = TupleCollector::new();
    let mut output = ResultAppender::new(config.min_frame_size, collector.clone());
    let mut joiner = IntervalIndexJoiner::interval(
        &config,
        IntervalPredicate::CoveredBy,
        FIELD,
        FIELD,
        VecTupleStream::new(left.clone()),
        VecTupleStream::new(right.clone()),
    )
    .unwrap();
    assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Finished);
    assert!(joiner.stats().spills > 0);
    assert_eq!(collect(&collector).len(), 30 * 10);
    assert_eq!(
        collect(&collector),
        nested_loop(IntervalPredicate::CoveredBy, &left, &right)
    );
}

#[test]
fn test_unsorted_input_is_rejected_by_disjoint_join() {
    let dir = tempfile::tempdir().unwrap();
    let config = spilling_config(dir.path());
    let left = vec![tuple(0, 10, 12), tuple(1, 5, 6)];
    let collector = TupleCollector::new();
    let mut output = ResultAppender::new(config.min_frame_size, collector);
    let mut joiner = DisjointPartitionJoiner::new(
        &config,
        checker(IntervalPredicate::Overlapping),
        VecTupleStream::new(left),
        VecTupleStream::new(vec![]),
    )
    .unwrap();
    assert!(joiner.join(&mut output).is_err());
}
