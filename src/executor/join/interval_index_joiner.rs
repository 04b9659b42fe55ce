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

//! Interval index joiner: the merge joiner over an end-point index

use super::active_set::EndPointIndex;
use super::interval_checker::IntervalMergeJoinChecker;
use super::interval_logic::{IntervalField, IntervalPredicate};
use super::merge_joiner::MergeJoiner;
use super::stream::TupleStream;
use crate::core::Result;
use crate::storage::JoinConfig;

/// Sweep join over start-sorted interval inputs
pub type IntervalIndexJoiner = MergeJoiner<IntervalMergeJoinChecker, EndPointIndex>;

impl MergeJoiner<IntervalMergeJoinChecker, EndPointIndex> {
    /// Join `left <predicate> right`, both sorted by interval start
    pub fn interval(
        config: &JoinConfig,
        predicate: IntervalPredicate,
        left_field: IntervalField,
        right_field: IntervalField,
        left: impl TupleStream + 'static,
        right: impl TupleStream + 'static,
    ) -> Result<Self> {
        let checker = IntervalMergeJoinChecker::new(predicate, left_field, right_field);
        Self::new(config, checker, left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::join::merge_joiner::JoinStatus;
    use crate::executor::join::output::{ResultAppender, TupleCollector};
    use crate::executor::join::stream::VecTupleStream;

    fn tuple(id: i64, start: i64, end: i64) -> Vec<u8> {
        [id.to_le_bytes(), start.to_le_bytes(), end.to_le_bytes()].concat()
    }

    fn ids(results: &[Vec<u8>]) -> Vec<(i64, i64)> {
        let mut out: Vec<_> = results
            .iter()
            .map(|t| {
                let l = i64::from_le_bytes(t[0..8].try_into().unwrap());
                let r = i64::from_le_bytes(t[24..32].try_into().unwrap());
                (l, r)
            })
            .collect();
        out.sort();
        out
    }

    fn join(
        config: &JoinConfig,
        predicate: IntervalPredicate,
        left: Vec<Vec<u8>>,
        right: Vec<Vec<u8>>,
    ) -> Vec<(i64, i64)> {
        let collector = TupleCollector::new();
        let mut output = ResultAppender::new(config.min_frame_size, collector.clone());
        let mut joiner = IntervalIndexJoiner::interval(
            config,
            predicate,
            IntervalField::at(8),
            IntervalField::at(8),
            VecTupleStream::new(left),
            VecTupleStream::new(right),
        )
        .unwrap();
        assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Finished);
        ids(&collector.tuples())
    }

    #[test]
    fn test_overlapping_join() {
        let config = JoinConfig::new().with_min_frame_size(256).with_memory_frames(4);
        let left = vec![tuple(1, 0, 4), tuple(2, 3, 6), tuple(3, 8, 9)];
        let right = vec![tuple(10, 1, 2), tuple(11, 4, 9), tuple(12, 6, 7)];
        let got = join(&config, IntervalPredicate::Overlapping, left, right);
        assert_eq!(got, vec![(1, 10), (2, 11), (3, 11)]);
    }

    #[test]
    fn test_meets_join_with_spills() {
        let dir = tempfile::tempdir().unwrap();
        let config = JoinConfig::new()
            .with_min_frame_size(64)
            .with_memory_frames(1)
            .with_spill_dir(dir.path());
        // Every left interval meets every right interval
        let left: Vec<_> = (0..5).map(|i| tuple(i, 0, 10)).collect();
        let right: Vec<_> = (0..5).map(|i| tuple(100 + i, 10, 20)).collect();
        let got = join(&config, IntervalPredicate::Meets, left, right);
        assert_eq!(got.len(), 25);
    }
}
