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

//! Dataset-level lock state

use rustc_hash::FxHashMap;

use crate::core::{JobId, LockMode, NIL};

const MODES: [LockMode; 4] = [
    LockMode::IntentionShared,
    LockMode::IntentionExclusive,
    LockMode::Shared,
    LockMode::Exclusive,
];

/// Acquisition counts per dataset lock mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeCounts {
    counts: [i32; 5],
}

impl ModeCounts {
    #[inline]
    pub fn get(&self, mode: LockMode) -> i32 {
        self.counts[mode.as_u8() as usize]
    }

    #[inline]
    pub fn add(&mut self, mode: LockMode, delta: i32) {
        let c = &mut self.counts[mode.as_u8() as usize];
        *c += delta;
        debug_assert!(*c >= 0, "negative {} count", mode);
    }

    pub fn is_empty(&self) -> bool {
        MODES.iter().all(|m| self.get(*m) == 0)
    }

    /// Whether any held mode covers `requested`
    pub fn covers(&self, requested: LockMode) -> bool {
        MODES
            .iter()
            .any(|m| self.get(*m) > 0 && m.covers(requested))
    }

    /// Whether `requested` is compatible with these holdings minus `own`
    pub fn is_compatible(&self, requested: LockMode, own: Option<&ModeCounts>) -> bool {
        MODES.iter().all(|m| {
            let others = self.get(*m) - own.map_or(0, |o| o.get(*m));
            others == 0 || requested.is_compatible_with(*m)
        })
    }

    /// Modes with a non-zero count
    pub fn held_modes(&self) -> impl Iterator<Item = LockMode> + '_ {
        MODES.iter().copied().filter(|m| self.get(*m) > 0)
    }
}

/// Lock state of one dataset
///
/// Created on the first request for the dataset and kept for the lifetime of
/// the lock manager.
#[derive(Debug)]
pub struct DatasetLockInfo {
    /// IS/IX/S/X acquisitions by every job, including the intention locks
    /// taken for entity requests
    counts: ModeCounts,
    /// Per-job share of `counts`
    job_counts: FxHashMap<JobId, ModeCounts>,
    /// Head of the dataset-granule holder list (entity info slots)
    pub last_holder: i32,
    /// Head of the waiter queue (lock waiter slots)
    pub first_waiter: i32,
    /// Head of the upgrader queue (lock waiter slots)
    pub first_upgrader: i32,
    /// entity hash -> entity lock info slot
    pub entities: FxHashMap<i32, i32>,
}

impl Default for DatasetLockInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetLockInfo {
    pub fn new() -> Self {
        Self {
            counts: ModeCounts::default(),
            job_counts: FxHashMap::default(),
            last_holder: NIL,
            first_waiter: NIL,
            first_upgrader: NIL,
            entities: FxHashMap::default(),
        }
    }

    /// Record `delta` acquisitions of `mode` by `job_id`
    pub fn add_holding(&mut self, job_id: JobId, mode: LockMode, delta: i32) {
        self.counts.add(mode, delta);
        let own = self.job_counts.entry(job_id).or_default();
        own.add(mode, delta);
        if own.is_empty() {
            self.job_counts.remove(&job_id);
        }
    }

    /// All acquisitions
    pub fn counts(&self) -> &ModeCounts {
        &self.counts
    }

    /// Acquisitions held by one job
    pub fn job_holdings(&self, job_id: JobId) -> Option<&ModeCounts> {
        self.job_counts.get(&job_id)
    }

    /// Jobs holding at least one dataset-level lock
    pub fn holders(&self) -> impl Iterator<Item = (&JobId, &ModeCounts)> {
        self.job_counts.iter()
    }

    /// Whether `mode` requested by `job_id` conflicts with no other job
    pub fn is_compatible(&self, job_id: JobId, mode: LockMode) -> bool {
        self.counts.is_compatible(mode, self.job_counts.get(&job_id))
    }

    /// Whether any request is queued on the dataset
    pub fn has_queue(&self) -> bool {
        self.first_waiter != NIL || self.first_upgrader != NIL
    }

    /// Whether no lock is held and nothing is queued
    pub fn is_idle(&self) -> bool {
        self.counts.is_empty() && !self.has_queue()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_holdings_do_not_conflict() {
        let mut ds = DatasetLockInfo::new();
        ds.add_holding(JobId(1), LockMode::Shared, 1);
        // Another job cannot take IX next to S
        assert!(!ds.is_compatible(JobId(2), LockMode::IntentionExclusive));
        // The holder can: S + IX on the same job behaves like SIX
        assert!(ds.is_compatible(JobId(1), LockMode::IntentionExclusive));
        assert!(ds.is_compatible(JobId(1), LockMode::Exclusive));

        ds.add_holding(JobId(2), LockMode::IntentionShared, 2);
        assert!(!ds.is_compatible(JobId(1), LockMode::Exclusive));
        assert!(ds.is_compatible(JobId(1), LockMode::Shared));
    }

    #[test]
    fn test_job_counts_cleared_when_empty() {
        let mut ds = DatasetLockInfo::new();
        ds.add_holding(JobId(5), LockMode::IntentionExclusive, 3);
        assert_eq!(ds.job_holdings(JobId(5)).map(|c| c.get(LockMode::IntentionExclusive)), Some(3));
        ds.add_holding(JobId(5), LockMode::IntentionExclusive, -3);
        assert!(ds.job_holdings(JobId(5)).is_none());
        assert!(ds.is_idle());
    }

    #[test]
    fn test_mode_counts_covers() {
        let mut counts = ModeCounts::default();
        assert!(!counts.covers(LockMode::IntentionShared));
        counts.add(LockMode::IntentionExclusive, 1);
        assert!(counts.covers(LockMode::IntentionShared));
        assert!(!counts.covers(LockMode::Shared));
        assert_eq!(counts.held_modes().collect::<Vec<_>>(), vec![LockMode::IntentionExclusive]);
    }
}
