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

//! Disjoint-interval partition joiner
//!
//! Each input, sorted by start, is split into partitions whose intervals do
//! not overlap one another. An interval goes to the partition whose last end
//! is the earliest one not after its start, or opens a new partition. Inside
//! a partition at most one interval is live at any time point, so the merge
//! joiner over a left and a right partition keeps a tiny active set. Every
//! left/right partition pair is joined that way.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use super::interval_checker::IntervalMergeJoinChecker;
use super::interval_index_joiner::IntervalIndexJoiner;
use super::interval_logic::Interval;
use super::merge_joiner::{JoinStatus, Side};
use super::output::ResultAppender;
use super::partition_and_spill::PartitionAndSpill;
use super::stats::JoinStats;
use super::stream::{TupleStatus, TupleStream};
use crate::core::{Error, Result};
use crate::storage::JoinConfig;

/// Greedy assignment of start-sorted intervals to disjoint partitions
#[derive(Debug)]
pub struct DisjointPartitioner {
    last_ends: BinaryHeap<Reverse<(i64, usize)>>,
    store: PartitionAndSpill,
    last_start: Option<i64>,
}

impl DisjointPartitioner {
    pub fn new(config: &JoinConfig, prefix: &'static str) -> Self {
        Self {
            last_ends: BinaryHeap::new(),
            store: PartitionAndSpill::new(config, 0, prefix),
            last_start: None,
        }
    }

    /// Partition for `interval`; intervals must arrive in start order
    pub fn assign(&mut self, interval: &Interval) -> Result<usize> {
        if self.last_start.is_some_and(|s| interval.start < s) {
            return Err(Error::join_state(format!(
                "interval {} arrived out of start order",
                interval
            )));
        }
        self.last_start = Some(interval.start);
        let partition = match self.last_ends.peek() {
            Some(Reverse((end, p))) if *end <= interval.start => {
                let p = *p;
                self.last_ends.pop();
                p
            }
            _ => self.store.add_partition(),
        };
        self.last_ends.push(Reverse((interval.end, partition)));
        Ok(partition)
    }

    /// Assign and store one tuple
    pub fn add(&mut self, interval: &Interval, tuple: &[u8]) -> Result<usize> {
        let partition = self.assign(interval)?;
        self.store.insert(partition, tuple)?;
        Ok(partition)
    }

    pub fn partition_count(&self) -> usize {
        self.store.partition_count()
    }

    pub fn store(&self) -> &PartitionAndSpill {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PartitionAndSpill {
        &mut self.store
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    PartitionLeft,
    PartitionRight,
    JoinPairs,
    Done,
}

/// Partitioned interval join over disjoint-interval partitions
pub struct DisjointPartitionJoiner {
    config: JoinConfig,
    checker: IntervalMergeJoinChecker,
    left: Box<dyn TupleStream>,
    right: Box<dyn TupleStream>,
    left_parts: DisjointPartitioner,
    right_parts: DisjointPartitioner,
    phase: Phase,
    stats: Vec<JoinStats>,
}

impl std::fmt::Debug for DisjointPartitionJoiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisjointPartitionJoiner")
            .field("predicate", &self.checker.predicate())
            .field("left_partitions", &self.left_parts.partition_count())
            .field("right_partitions", &self.right_parts.partition_count())
            .field("phase", &self.phase)
            .finish()
    }
}

impl DisjointPartitionJoiner {
    pub fn new(
        config: &JoinConfig,
        checker: IntervalMergeJoinChecker,
        left: impl TupleStream + 'static,
        right: impl TupleStream + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            checker,
            left: Box::new(left),
            right: Box::new(right),
            left_parts: DisjointPartitioner::new(config, "disjoint-left"),
            right_parts: DisjointPartitioner::new(config, "disjoint-right"),
            phase: Phase::PartitionLeft,
            stats: Vec::new(),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Counters per left partition, summed over its right partners
    pub fn partition_stats(&self) -> &[JoinStats] {
        &self.stats
    }

    pub fn stats(&self) -> JoinStats {
        let mut total = JoinStats::new();
        for s in &self.stats {
            total += *s;
        }
        total
    }

    /// Drive the join until it finishes or an input blocks
    pub fn join(&mut self, output: &mut ResultAppender) -> Result<JoinStatus> {
        loop {
            match self.phase {
                Phase::PartitionLeft => match self.left.load_tuple()? {
                    TupleStatus::Unknown => return Ok(JoinStatus::Blocked(Side::Left)),
                    TupleStatus::Empty => self.phase = Phase::PartitionRight,
                    TupleStatus::Loaded => {
                        let tuple = self.left.tuple();
                        let interval = self.checker.left_interval(tuple);
                        self.left_parts.add(&interval, tuple)?;
                        self.left.consume();
                    }
                },
                Phase::PartitionRight => match self.right.load_tuple()? {
                    TupleStatus::Unknown => return Ok(JoinStatus::Blocked(Side::Right)),
                    TupleStatus::Empty => {
                        self.left_parts.store_mut().spill_all()?;
                        self.right_parts.store_mut().spill_all()?;
                        debug!(
                            left = self.left_parts.partition_count(),
                            right = self.right_parts.partition_count(),
                            "disjoint partitioning done"
                        );
                        self.phase = Phase::JoinPairs;
                    }
                    TupleStatus::Loaded => {
                        let tuple = self.right.tuple();
                        let interval = self.checker.right_interval(tuple);
                        self.right_parts.add(&interval, tuple)?;
                        self.right.consume();
                    }
                },
                Phase::JoinPairs => {
                    self.join_pairs(output)?;
                    output.flush()?;
                    self.left_parts.store_mut().discard();
                    self.right_parts.store_mut().discard();
                    self.phase = Phase::Done;
                    debug!(stats = %self.stats(), "disjoint partition join finished");
                }
                Phase::Done => return Ok(JoinStatus::Finished),
            }
        }
    }

    fn join_pairs(&mut self, output: &mut ResultAppender) -> Result<()> {
        let lefts = self.left_parts.partition_count();
        let rights = self.right_parts.partition_count();
        self.stats = vec![JoinStats::new(); lefts];
        for l in 0..lefts {
            let store = self.left_parts.store();
            self.stats[l].spills += store.spills(l);
            self.stats[l].frames_written += store.frames_written(l);
            for r in 0..rights {
                let left = self.left_parts.store_mut().reader(l)?;
                let right = self.right_parts.store_mut().reader(r)?;
                let mut joiner =
                    IntervalIndexJoiner::new(&self.config, self.checker, left, right)?;
                match joiner.join(output)? {
                    JoinStatus::Finished => {}
                    JoinStatus::Blocked(side) => {
                        return Err(Error::join_state(format!(
                            "run-file partition stream blocked on {:?}",
                            side
                        )));
                    }
                }
                self.stats[l] += joiner.stats();
            }
        }
        Ok(())
    }
}
