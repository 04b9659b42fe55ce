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

//! Partitions sharing one memory budget, spilling whole partitions to disk
//!
//! Tuples are kept in memory per partition until the budget runs out. The
//! largest in-memory partition is then written to its own run file and every
//! later tuple of that partition goes straight to the file.

use std::path::PathBuf;

use tracing::debug;

use crate::core::{Error, Result};
use crate::storage::{JoinConfig, RunFile, RunFileReader, TupleMemory, TuplePointer};

#[derive(Debug, Default)]
struct Partition {
    tuples: Vec<TuplePointer>,
    bytes: usize,
    run: Option<RunFile>,
    spills: u64,
}

/// Partitioned tuple buffer with per-partition spilling
pub struct PartitionAndSpill {
    memory: TupleMemory,
    partitions: Vec<Partition>,
    spill_dir: PathBuf,
    min_frame_size: usize,
    prefix: &'static str,
}

impl std::fmt::Debug for PartitionAndSpill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionAndSpill")
            .field("prefix", &self.prefix)
            .field("partitions", &self.partitions.len())
            .field("memory", &self.memory)
            .finish()
    }
}

impl PartitionAndSpill {
    /// `count` empty partitions; run files are named after `prefix`
    pub fn new(config: &JoinConfig, count: usize, prefix: &'static str) -> Self {
        let mut partitions = Vec::with_capacity(count);
        partitions.resize_with(count, Partition::default);
        Self {
            memory: TupleMemory::new(config.min_frame_size, config.memory_frames),
            partitions,
            spill_dir: config.spill_dir(),
            min_frame_size: config.min_frame_size,
            prefix,
        }
    }

    #[inline]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Append an empty partition and return its index
    pub fn add_partition(&mut self) -> usize {
        self.partitions.push(Partition::default());
        self.partitions.len() - 1
    }

    /// Store `tuple` in partition `p`, spilling partitions until it fits
    pub fn insert(&mut self, p: usize, tuple: &[u8]) -> Result<()> {
        loop {
            if let Some(run) = self.partitions[p].run.as_mut() {
                return run.append(tuple);
            }
            if let Some(ptr) = self.memory.insert(tuple)? {
                let partition = &mut self.partitions[p];
                partition.tuples.push(ptr);
                partition.bytes += tuple.len();
                return Ok(());
            }
            let victim = self
                .largest_in_memory()
                .ok_or_else(|| Error::internal("partition memory full with no partition to spill"))?;
            self.spill(victim)?;
        }
    }

    fn largest_in_memory(&self) -> Option<usize> {
        self.partitions
            .iter()
            .enumerate()
            .filter(|(_, part)| !part.tuples.is_empty())
            .max_by_key(|(_, part)| part.bytes)
            .map(|(p, _)| p)
    }

    /// Move partition `p` to its run file; later inserts go there directly
    pub fn spill(&mut self, p: usize) -> Result<()> {
        if self.partitions[p].run.is_none() {
            let run = RunFile::create(&self.spill_dir, self.prefix, self.min_frame_size)?;
            self.partitions[p].run = Some(run);
        }
        let partition = &mut self.partitions[p];
        let Some(run) = partition.run.as_mut() else {
            return Err(Error::internal("spilled partition has no run file"));
        };
        let moved = partition.tuples.len();
        for ptr in partition.tuples.drain(..) {
            run.append(self.memory.get(ptr))?;
            self.memory.remove(ptr);
        }
        partition.bytes = 0;
        partition.spills += 1;
        debug!(
            prefix = self.prefix,
            partition = p,
            tuples = moved,
            "spilled partition"
        );
        Ok(())
    }

    /// Spill every partition that holds tuples in memory or has a run file
    pub fn spill_all(&mut self) -> Result<()> {
        for p in 0..self.partitions.len() {
            let partition = &self.partitions[p];
            if !partition.tuples.is_empty() || partition.run.is_none() {
                self.spill(p)?;
            }
            if let Some(run) = self.partitions[p].run.as_mut() {
                run.flush()?;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn is_spilled(&self, p: usize) -> bool {
        self.partitions[p].run.is_some()
    }

    /// In-memory tuples of partition `p`
    pub fn tuples(&self, p: usize) -> impl Iterator<Item = &[u8]> + '_ {
        self.partitions[p]
            .tuples
            .iter()
            .map(move |ptr| self.memory.get(*ptr))
    }

    /// Tuples held in memory or on disk by partition `p`
    pub fn len(&self, p: usize) -> u64 {
        let partition = &self.partitions[p];
        partition.tuples.len() as u64 + partition.run.as_ref().map_or(0, |r| r.tuple_count())
    }

    pub fn is_empty(&self, p: usize) -> bool {
        self.len(p) == 0
    }

    /// Times partition `p` was written out
    pub fn spills(&self, p: usize) -> u64 {
        self.partitions[p].spills
    }

    /// Run-file frames written for partition `p`
    pub fn frames_written(&self, p: usize) -> u64 {
        self.partitions[p]
            .run
            .as_ref()
            .map_or(0, |r| r.frames_written())
    }

    /// Reader over the spilled tuples of partition `p`
    pub fn reader(&mut self, p: usize) -> Result<RunFileReader> {
        match self.partitions[p].run.as_mut() {
            Some(run) => run.reader(),
            None => Err(Error::join_state(format!("partition {} is not spilled", p))),
        }
    }

    /// Drop every partition along with its run file
    pub fn discard(&mut self) {
        self.partitions.clear();
        self.memory.clear();
    }

    /// Drop the in-memory tuples of every partition; run files stay
    pub fn release_memory(&mut self) {
        for partition in &mut self.partitions {
            partition.tuples.clear();
            partition.bytes = 0;
        }
        self.memory.clear();
    }
}
