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

//! Merge join checker for interval predicates
//!
//! Both inputs are sorted by interval start. Each predicate gets the tightest
//! load and remove rules that only use that order.

use std::ops::Bound;

use super::checker::MergeJoinChecker;
use super::interval_logic::{Interval, IntervalField, IntervalPredicate};

/// Interval predicate specialized for the merge joiners
#[derive(Debug, Clone, Copy)]
pub struct IntervalMergeJoinChecker {
    predicate: IntervalPredicate,
    left_field: IntervalField,
    right_field: IntervalField,
}

impl IntervalMergeJoinChecker {
    pub fn new(
        predicate: IntervalPredicate,
        left_field: IntervalField,
        right_field: IntervalField,
    ) -> Self {
        Self {
            predicate,
            left_field,
            right_field,
        }
    }

    #[inline]
    pub fn predicate(&self) -> IntervalPredicate {
        self.predicate
    }

    #[inline]
    pub fn left_interval(&self, tuple: &[u8]) -> Interval {
        self.left_field.read(tuple)
    }

    #[inline]
    pub fn right_interval(&self, tuple: &[u8]) -> Interval {
        self.right_field.read(tuple)
    }

    /// Whether `right` may still match `left`, given only their starts
    pub fn should_load(&self, left: &Interval, right: &Interval) -> bool {
        use IntervalPredicate::*;
        match self.predicate {
            Before => true,
            After | OverlappedBy => right.start < left.start,
            Overlaps | Overlapping => right.start < left.end,
            Meets | EndedBy | Covers => right.start <= left.end,
            MetBy | Starts | StartedBy | Ends | CoveredBy | Equals => right.start <= left.start,
        }
    }

    /// Whether `right` can match neither `left` nor any later left interval
    pub fn should_remove(&self, left: &Interval, right: &Interval) -> bool {
        use IntervalPredicate::*;
        match self.predicate {
            After => false,
            Before | Overlaps => right.start <= left.start,
            Meets | Starts | StartedBy | EndedBy | Covers | Equals => right.start < left.start,
            MetBy | Ends | CoveredBy => right.end < left.start,
            OverlappedBy | Overlapping => right.end <= left.start,
        }
    }

    /// Right intervals ending below the returned value can be dropped from an
    /// end-ordered index once `left` is reached
    pub fn expire_below(&self, left: &Interval) -> Option<i64> {
        use IntervalPredicate::*;
        match self.predicate {
            After => None,
            OverlappedBy | Overlapping => Some(left.start.saturating_add(1)),
            _ => Some(left.start),
        }
    }

    /// Range of right end points that can match `left`
    pub fn probe_end_range(&self, left: &Interval) -> (Bound<i64>, Bound<i64>) {
        use Bound::*;
        use IntervalPredicate::*;
        match self.predicate {
            Before | Overlaps => (Excluded(left.end), Unbounded),
            After => (Unbounded, Excluded(left.start)),
            Meets | Starts | CoveredBy => (Included(left.end), Unbounded),
            MetBy => (Included(left.start), Included(left.start)),
            OverlappedBy => (Excluded(left.start), Excluded(left.end)),
            Overlapping => (Excluded(left.start), Unbounded),
            StartedBy | Covers => (Included(left.start), Included(left.end)),
            Ends | EndedBy | Equals => (Included(left.end), Included(left.end)),
        }
    }

    /// Whether a left interval in partitions `left.0..=left.1` can match a
    /// right interval in partitions `right.0..=right.1`
    pub fn partitions_compatible(&self, left: (usize, usize), right: (usize, usize)) -> bool {
        match self.predicate {
            IntervalPredicate::Before => right.0 >= left.1,
            IntervalPredicate::After => right.1 <= left.0,
            _ => right.0 <= left.1 && left.0 <= right.1,
        }
    }
}

impl MergeJoinChecker for IntervalMergeJoinChecker {
    fn check_to_save_in_result(&self, left: &[u8], right: &[u8]) -> bool {
        self.predicate
            .evaluate(&self.left_interval(left), &self.right_interval(right))
    }

    fn check_to_remove_in_memory(&self, left: &[u8], right: &[u8]) -> bool {
        self.should_remove(&self.left_interval(left), &self.right_interval(right))
    }

    fn check_to_load_next_right_tuple(&self, left: &[u8], right: &[u8]) -> bool {
        self.should_load(&self.left_interval(left), &self.right_interval(right))
    }
}
