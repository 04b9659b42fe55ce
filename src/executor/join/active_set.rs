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

//! Active sets: the right tuples a merge joiner keeps in memory
//!
//! The tuple bytes live in [`TupleMemory`]; an active set only orders the
//! pointers. [`ScanActiveSet`] works with any checker and visits every
//! entry. [`EndPointIndex`] orders interval tuples by end point so expiring
//! pops the head and a probe only visits the end range that can match.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::checker::MergeJoinChecker;
use super::interval_checker::IntervalMergeJoinChecker;
use crate::storage::{TupleMemory, TuplePointer};

/// In-memory right side of a merge join
pub trait ActiveSet<C: MergeJoinChecker>: Send {
    /// Track a tuple that was just stored at `ptr`
    fn insert(&mut self, checker: &C, tuple: &[u8], ptr: TuplePointer);

    /// Remove every entry that can no longer match `left` or anything after
    /// it, freeing its memory. Returns the number removed.
    fn expire(&mut self, checker: &C, memory: &mut TupleMemory, left: &[u8]) -> usize;

    /// Push every entry that may match `left` onto `out`
    fn candidates(&self, checker: &C, left: &[u8], out: &mut Vec<TuplePointer>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every entry; the caller clears the memory
    fn clear(&mut self);
}

/// Arrival-ordered active set probed by a full scan
#[derive(Debug, Default)]
pub struct ScanActiveSet {
    pointers: Vec<TuplePointer>,
}

impl ScanActiveSet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: MergeJoinChecker> ActiveSet<C> for ScanActiveSet {
    fn insert(&mut self, _checker: &C, _tuple: &[u8], ptr: TuplePointer) {
        self.pointers.push(ptr);
    }

    fn expire(&mut self, checker: &C, memory: &mut TupleMemory, left: &[u8]) -> usize {
        let before = self.pointers.len();
        self.pointers.retain(|&ptr| {
            let remove = checker.check_to_remove_in_memory(left, memory.get(ptr));
            if remove {
                memory.remove(ptr);
            }
            !remove
        });
        before - self.pointers.len()
    }

    fn candidates(&self, _checker: &C, _left: &[u8], out: &mut Vec<TuplePointer>) {
        out.extend_from_slice(&self.pointers);
    }

    fn len(&self) -> usize {
        self.pointers.len()
    }

    fn clear(&mut self) {
        self.pointers.clear();
    }
}

/// Key of an [`EndPointIndex`] entry: end, start, arrival sequence
type EndKey = (i64, i64, u64);

/// Interval active set ordered by (end, start)
#[derive(Debug, Default)]
pub struct EndPointIndex {
    entries: BTreeMap<EndKey, TuplePointer>,
    next_seq: u64,
}

impl EndPointIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert an end-point range into key bounds covering every start and
    /// sequence; `None` when the range holds no end point
    fn key_range(range: (Bound<i64>, Bound<i64>)) -> Option<(Bound<EndKey>, Bound<EndKey>)> {
        use Bound::*;
        let lower = match range.0 {
            Included(x) => Included((x, i64::MIN, 0)),
            Excluded(x) => Excluded((x, i64::MAX, u64::MAX)),
            Unbounded => Unbounded,
        };
        let upper = match range.1 {
            Included(x) => Included((x, i64::MAX, u64::MAX)),
            Excluded(x) => Excluded((x, i64::MIN, 0)),
            Unbounded => Unbounded,
        };
        // BTreeMap::range panics on inverted or empty-excluded bounds
        let empty = match (&lower, &upper) {
            (Included(a), Included(b)) => a > b,
            (Included(a), Excluded(b)) | (Excluded(a), Included(b)) | (Excluded(a), Excluded(b)) => {
                a >= b
            }
            _ => false,
        };
        if empty {
            None
        } else {
            Some((lower, upper))
        }
    }
}

impl ActiveSet<IntervalMergeJoinChecker> for EndPointIndex {
    fn insert(&mut self, checker: &IntervalMergeJoinChecker, tuple: &[u8], ptr: TuplePointer) {
        let interval = checker.right_interval(tuple);
        self.entries
            .insert((interval.end, interval.start, self.next_seq), ptr);
        self.next_seq += 1;
    }

    fn expire(
        &mut self,
        checker: &IntervalMergeJoinChecker,
        memory: &mut TupleMemory,
        left: &[u8],
    ) -> usize {
        let Some(bound) = checker.expire_below(&checker.left_interval(left)) else {
            return 0;
        };
        let mut removed = 0;
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 >= bound {
                break;
            }
            memory.remove(entry.remove());
            removed += 1;
        }
        removed
    }

    fn candidates(
        &self,
        checker: &IntervalMergeJoinChecker,
        left: &[u8],
        out: &mut Vec<TuplePointer>,
    ) {
        let range = checker.probe_end_range(&checker.left_interval(left));
        if let Some(keys) = Self::key_range(range) {
            out.extend(self.entries.range(keys).map(|(_, ptr)| *ptr));
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::join::interval_logic::{IntervalField, IntervalPredicate};

    fn tuple(start: i64, end: i64) -> Vec<u8> {
        let mut t = start.to_le_bytes().to_vec();
        t.extend_from_slice(&end.to_le_bytes());
        t
    }

    fn checker(p: IntervalPredicate) -> IntervalMergeJoinChecker {
        IntervalMergeJoinChecker::new(p, IntervalField::at(0), IntervalField::at(0))
    }

    fn load<A: ActiveSet<IntervalMergeJoinChecker>>(
        set: &mut A,
        c: &IntervalMergeJoinChecker,
        memory: &mut TupleMemory,
        intervals: &[(i64, i64)],
    ) {
        for &(s, e) in intervals {
            let t = tuple(s, e);
            let ptr = memory.insert(&t).unwrap().unwrap();
            set.insert(c, &t, ptr);
        }
    }

    #[test]
    fn test_end_point_index_expires_from_head() {
        let c = checker(IntervalPredicate::Overlapping);
        let mut memory = TupleMemory::new(256, 4);
        let mut index = EndPointIndex::new();
        load(&mut index, &c, &mut memory, &[(0, 3), (1, 9), (2, 5), (4, 6)]);

        // Left [5, 8): ends at or below 5 cannot overlap it or anything later
        assert_eq!(index.expire(&c, &mut memory, &tuple(5, 8)), 2);
        assert_eq!(index.len(), 2);
        assert_eq!(memory.len(), 2);

        let mut out = Vec::new();
        index.candidates(&c, &tuple(5, 8), &mut out);
        let found: Vec<_> = out.iter().map(|p| memory.get(*p).to_vec()).collect();
        assert_eq!(found, vec![tuple(4, 6), tuple(1, 9)]);
    }

    #[test]
    fn test_end_point_index_empty_probe_range() {
        // overlapped-by with a zero-length left probes (s, s), which is empty
        let c = checker(IntervalPredicate::OverlappedBy);
        let mut memory = TupleMemory::new(256, 4);
        let mut index = EndPointIndex::new();
        load(&mut index, &c, &mut memory, &[(0, 3), (1, 4)]);
        let mut out = Vec::new();
        index.candidates(&c, &tuple(3, 3), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_scan_set_uses_checker_removal() {
        let c = checker(IntervalPredicate::Before);
        let mut memory = TupleMemory::new(256, 4);
        let mut set = ScanActiveSet::new();
        load(&mut set, &c, &mut memory, &[(0, 1), (2, 4), (6, 7)]);
        assert_eq!(set.expire(&c, &mut memory, &tuple(2, 3)), 2);
        let mut out = Vec::new();
        set.candidates(&c, &tuple(2, 3), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(memory.get(out[0]), tuple(6, 7).as_slice());
    }
}
