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

//! Overlapping-interval partition joiner
//!
//! The right input is bucketed by the time slices of its start and end
//! (see [`IntervalPartitioner`]). Each left tuple is then compared against
//! the buckets whose slice range is compatible with its own under the
//! predicate. Buckets that did not fit in memory were spilled during the
//! build; left tuples bound for them are staged in a per-bucket probe file
//! and joined block by block once the left input is done. Inputs need not
//! be sorted.

use tracing::debug;

use super::checker::MergeJoinChecker;
use super::interval_checker::IntervalMergeJoinChecker;
use super::merge_joiner::{JoinStatus, Side};
use super::output::ResultAppender;
use super::partition::{interval_partition_unmap, IntervalPartitioner};
use super::partition_and_spill::PartitionAndSpill;
use super::stats::JoinStats;
use super::stream::{TupleStatus, TupleStream};
use crate::core::Result;
use crate::storage::{JoinConfig, RunFile, TupleMemory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Build,
    Probe,
    Spilled,
    Done,
}

/// Partitioned interval join for long, overlapping intervals
pub struct OverlappingPartitionJoiner {
    config: JoinConfig,
    checker: IntervalMergeJoinChecker,
    partitioner: IntervalPartitioner,
    left: Box<dyn TupleStream>,
    right: Box<dyn TupleStream>,
    build: PartitionAndSpill,
    probes: Vec<Option<RunFile>>,
    buckets: Vec<(usize, usize)>,
    phase: Phase,
    stats: Vec<JoinStats>,
}

impl std::fmt::Debug for OverlappingPartitionJoiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlappingPartitionJoiner")
            .field("predicate", &self.checker.predicate())
            .field("partitioner", &self.partitioner)
            .field("phase", &self.phase)
            .finish()
    }
}

impl OverlappingPartitionJoiner {
    pub fn new(
        config: &JoinConfig,
        checker: IntervalMergeJoinChecker,
        partitioner: IntervalPartitioner,
        left: impl TupleStream + 'static,
        right: impl TupleStream + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let count = partitioner.bucket_count();
        let k = partitioner.partition_count();
        let mut probes = Vec::with_capacity(count);
        probes.resize_with(count, || None);
        Ok(Self {
            config: config.clone(),
            checker,
            partitioner,
            left: Box::new(left),
            right: Box::new(right),
            build: PartitionAndSpill::new(config, count, "interval-build"),
            probes,
            buckets: (0..count).map(|id| interval_partition_unmap(id, k)).collect(),
            phase: Phase::Build,
            stats: vec![JoinStats::new(); count],
        })
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Counters per right bucket, indexed by bucket id
    pub fn bucket_stats(&self) -> &[JoinStats] {
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
                Phase::Build => match self.right.load_tuple()? {
                    TupleStatus::Unknown => return Ok(JoinStatus::Blocked(Side::Right)),
                    TupleStatus::Empty => {
                        self.phase = Phase::Probe;
                        debug!(
                            spilled = (0..self.buckets.len())
                                .filter(|b| self.build.is_spilled(*b))
                                .count(),
                            "interval partition build done"
                        );
                    }
                    TupleStatus::Loaded => {
                        let tuple = self.right.tuple();
                        let bucket = self.partitioner.bucket(&self.checker.right_interval(tuple));
                        self.build.insert(bucket, tuple)?;
                        self.right.consume();
                    }
                },
                Phase::Probe => match self.left.load_tuple()? {
                    TupleStatus::Unknown => return Ok(JoinStatus::Blocked(Side::Left)),
                    TupleStatus::Empty => {
                        self.build.release_memory();
                        self.phase = Phase::Spilled;
                    }
                    TupleStatus::Loaded => {
                        self.probe_left(output)?;
                        self.left.consume();
                    }
                },
                Phase::Spilled => {
                    for bucket in 0..self.buckets.len() {
                        self.join_spilled_bucket(bucket, output)?;
                    }
                    output.flush()?;
                    self.probes.clear();
                    self.build.discard();
                    self.phase = Phase::Done;
                    debug!(stats = %self.stats(), "interval partition join finished");
                }
                Phase::Done => return Ok(JoinStatus::Finished),
            }
        }
    }

    fn probe_left(&mut self, output: &mut ResultAppender) -> Result<()> {
        let left = self.left.tuple();
        let own = self.partitioner.partitions(&self.checker.left_interval(left));
        for (bucket, &slices) in self.buckets.iter().enumerate() {
            if self.build.is_empty(bucket) || !self.checker.partitions_compatible(own, slices) {
                continue;
            }
            let stats = &mut self.stats[bucket];
            if self.build.is_spilled(bucket) {
                let probe = &mut self.probes[bucket];
                if probe.is_none() {
                    *probe = Some(RunFile::create(
                        &self.config.spill_dir(),
                        "interval-probe",
                        self.config.min_frame_size,
                    )?);
                }
                if let Some(run) = probe.as_mut() {
                    run.append(left)?;
                    stats.tuples_spilled += 1;
                }
                continue;
            }
            for right in self.build.tuples(bucket) {
                stats.comparisons += 1;
                if self.checker.check_to_save_in_result(left, right) {
                    output.append(left, right)?;
                    stats.tuples_emitted += 1;
                }
            }
        }
        Ok(())
    }

    /// Block nested loop over a spilled bucket and its staged left tuples
    fn join_spilled_bucket(&mut self, bucket: usize, output: &mut ResultAppender) -> Result<()> {
        if !self.build.is_spilled(bucket) {
            return Ok(());
        }
        let stats = &mut self.stats[bucket];
        stats.spills += self.build.spills(bucket);
        stats.frames_written += self.build.frames_written(bucket);
        let Some(probe) = self.probes[bucket].as_mut() else {
            return Ok(());
        };

        let mut block = TupleMemory::new(self.config.min_frame_size, self.config.memory_frames);
        let mut pointers = Vec::new();
        let mut rights = self.build.reader(bucket)?;
        loop {
            block.clear();
            pointers.clear();
            while let Some(right) = rights.current()? {
                match block.insert(right)? {
                    Some(ptr) => pointers.push(ptr),
                    None => break,
                }
                rights.advance();
            }
            if pointers.is_empty() {
                break;
            }

            let mut lefts = probe.reader()?;
            while let Some(left) = lefts.current()? {
                for &ptr in &pointers {
                    let right = block.get(ptr);
                    stats.comparisons += 1;
                    if self.checker.check_to_save_in_result(left, right) {
                        output.append(left, right)?;
                        stats.tuples_emitted += 1;
                    }
                }
                lefts.advance();
            }
            stats.frames_read += lefts.frames_read();
        }
        stats.frames_read += rights.frames_read();
        stats.frames_written += probe.frames_written();
        debug!(bucket, stats = %stats, "joined spilled interval bucket");
        Ok(())
    }
}
