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

//! Time-range partitioning of intervals
//!
//! The time line from `partition_start` is cut into `k` slices of
//! `partition_duration`; values outside fall into the first or last slice.
//! An interval lands in bucket `(i, j)`, the slices of its start and end.
//! Buckets with `i <= j` are numbered row by row:
//!
//! ```text
//! k = 3:   (0,0)=0 (0,1)=1 (0,2)=2
//!                  (1,1)=3 (1,2)=4
//!                          (2,2)=5
//! ```

use super::interval_logic::Interval;
use crate::core::{Error, Result};

/// Bucket id of the slice pair `(i, j)`, `i <= j < k`
#[inline]
pub fn interval_partition_map(i: usize, j: usize, k: usize) -> usize {
    debug_assert!(i <= j && j < k, "bad partition pair ({}, {}) for k={}", i, j, k);
    i * k - i * i.saturating_sub(1) / 2 + (j - i)
}

/// Inverse of [`interval_partition_map`]
pub fn interval_partition_unmap(id: usize, k: usize) -> (usize, usize) {
    let mut row_start = 0;
    for i in 0..k {
        let row_len = k - i;
        if id < row_start + row_len {
            return (i, i + (id - row_start));
        }
        row_start += row_len;
    }
    debug_assert!(false, "bucket {} out of range for k={}", id, k);
    (k - 1, k - 1)
}

/// Number of buckets for `k` slices
#[inline]
pub fn interval_partition_count(k: usize) -> usize {
    k * (k + 1) / 2
}

/// Maps intervals to slice pairs and bucket ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalPartitioner {
    partition_start: i64,
    partition_duration: i64,
    k: usize,
}

impl IntervalPartitioner {
    pub fn new(partition_start: i64, partition_duration: i64, k: usize) -> Result<Self> {
        if partition_duration <= 0 {
            return Err(Error::invalid_join_config(format!(
                "partition duration {} must be positive",
                partition_duration
            )));
        }
        if k == 0 {
            return Err(Error::invalid_join_config("partition count must be positive"));
        }
        Ok(Self {
            partition_start,
            partition_duration,
            k,
        })
    }

    /// `k` slices covering `[min_start, max_end]`
    pub fn covering(min_start: i64, max_end: i64, k: usize) -> Result<Self> {
        let span = max_end.saturating_sub(min_start).max(0) as u64 + 1;
        let k64 = (k.max(1)) as u64;
        let duration = span.div_ceil(k64).max(1);
        Self::new(min_start, duration.min(i64::MAX as u64) as i64, k)
    }

    #[inline]
    pub fn partition_count(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        interval_partition_count(self.k)
    }

    /// Slice holding the time point `v`
    #[inline]
    pub fn partition_of(&self, v: i64) -> usize {
        let offset = v.saturating_sub(self.partition_start);
        if offset <= 0 {
            return 0;
        }
        let p = (offset / self.partition_duration) as u64;
        p.min(self.k as u64 - 1) as usize
    }

    /// Slices of the interval's start and end
    #[inline]
    pub fn partitions(&self, interval: &Interval) -> (usize, usize) {
        (
            self.partition_of(interval.start),
            self.partition_of(interval.end),
        )
    }

    /// Bucket of the interval
    #[inline]
    pub fn bucket(&self, interval: &Interval) -> usize {
        let (i, j) = self.partitions(interval);
        interval_partition_map(i, j, self.k)
    }
}
