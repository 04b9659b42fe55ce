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

//! Lock manager counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters, updated without the table latch
#[derive(Debug, Default)]
pub struct LockManagerStats {
    grants: AtomicU64,
    waits: AtomicU64,
    upgrades: AtomicU64,
    try_lock_failures: AtomicU64,
    deadlock_aborts: AtomicU64,
    timeout_victims: AtomicU64,
    releases: AtomicU64,
}

/// Point-in-time copy of [`LockManagerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockStatsSnapshot {
    /// Requests granted, immediately or after waiting
    pub grants: u64,
    /// Requests that parked (coalesced joins included)
    pub waits: u64,
    /// Grants that strengthened an existing holding
    pub upgrades: u64,
    /// try_lock / instant_try_lock calls that returned false
    pub try_lock_failures: u64,
    /// Requests refused because parking would deadlock
    pub deadlock_aborts: u64,
    /// Waiters marked as victims by the timeout sweep
    pub timeout_victims: u64,
    /// release_locks calls
    pub releases: u64,
}

impl LockManagerStats {
    #[inline]
    pub(crate) fn record_grant(&self) {
        self.grants.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_upgrade(&self) {
        self.upgrades.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_try_lock_failure(&self) {
        self.try_lock_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_deadlock(&self) {
        self.deadlock_aborts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_timeout(&self) {
        self.timeout_victims.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values
    pub fn snapshot(&self) -> LockStatsSnapshot {
        LockStatsSnapshot {
            grants: self.grants.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            upgrades: self.upgrades.load(Ordering::Relaxed),
            try_lock_failures: self.try_lock_failures.load(Ordering::Relaxed),
            deadlock_aborts: self.deadlock_aborts.load(Ordering::Relaxed),
            timeout_victims: self.timeout_victims.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for LockStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "grants={} waits={} upgrades={} try_failures={} deadlocks={} timeouts={} releases={}",
            self.grants,
            self.waits,
            self.upgrades,
            self.try_lock_failures,
            self.deadlock_aborts,
            self.timeout_victims,
            self.releases
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = LockManagerStats::default();
        stats.record_grant();
        stats.record_grant();
        stats.record_wait();
        stats.record_deadlock();
        let snap = stats.snapshot();
        assert_eq!(snap.grants, 2);
        assert_eq!(snap.waits, 1);
        assert_eq!(snap.deadlock_aborts, 1);
        assert_eq!(snap.timeout_victims, 0);
        assert!(snap.to_string().starts_with("grants=2 waits=1"));
    }
}
