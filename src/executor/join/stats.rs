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

//! Join counters, kept per joiner and per partition

use std::fmt;
use std::ops::AddAssign;

/// Counters of one join or one partition of it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    /// Predicate evaluations
    pub comparisons: u64,
    /// Times the joiner or a bucket went to disk
    pub spills: u64,
    /// Tuples written to run files
    pub tuples_spilled: u64,
    /// Run-file frames read back
    pub frames_read: u64,
    /// Run-file frames written
    pub frames_written: u64,
    /// Result tuples produced
    pub tuples_emitted: u64,
}

impl JoinStats {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AddAssign for JoinStats {
    fn add_assign(&mut self, other: Self) {
        self.comparisons += other.comparisons;
        self.spills += other.spills;
        self.tuples_spilled += other.tuples_spilled;
        self.frames_read += other.frames_read;
        self.frames_written += other.frames_written;
        self.tuples_emitted += other.tuples_emitted;
    }
}

impl fmt::Display for JoinStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "comparisons={} spills={} tuples_spilled={} frames_read={} frames_written={} emitted={}",
            self.comparisons,
            self.spills,
            self.tuples_spilled,
            self.frames_read,
            self.frames_written,
            self.tuples_emitted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate() {
        let mut total = JoinStats::new();
        total += JoinStats {
            comparisons: 3,
            tuples_emitted: 1,
            ..Default::default()
        };
        total += JoinStats {
            comparisons: 2,
            spills: 1,
            ..Default::default()
        };
        assert_eq!(total.comparisons, 5);
        assert_eq!(total.spills, 1);
        assert_eq!(total.tuples_emitted, 1);
        assert!(total.to_string().starts_with("comparisons=5 spills=1"));
    }
}
