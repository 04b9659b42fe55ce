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

//! Deadlock detection over the wait-for graph
//!
//! Before a new request parks, the lock manager asks its detector whether
//! adding the edges `job -> blockers` keeps the wait-for graph acyclic. The
//! graph is read under the table latch, so it cannot change during the check.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::core::JobId;

/// Read-only view of the current wait-for graph
pub trait WaitForGraph {
    /// Jobs that `job` is parked behind, through any of its waiters
    fn waits_for(&self, job: JobId) -> SmallVec<[JobId; 4]>;
}

/// Decides whether a request may park
pub trait DeadlockDetector: Send + Sync {
    /// Whether parking `job` behind `blockers` leaves the graph acyclic
    fn is_safe_to_add(&self, graph: &dyn WaitForGraph, job: JobId, blockers: &[JobId]) -> bool;
}

/// Depth-first search from the blockers back to the requesting job
#[derive(Debug, Default, Clone, Copy)]
pub struct WaitForGraphDetector;

impl DeadlockDetector for WaitForGraphDetector {
    fn is_safe_to_add(&self, graph: &dyn WaitForGraph, job: JobId, blockers: &[JobId]) -> bool {
        let mut visited: FxHashSet<JobId> = FxHashSet::default();
        let mut stack: SmallVec<[JobId; 16]> = blockers.iter().copied().collect();
        while let Some(next) = stack.pop() {
            if next == job {
                return false;
            }
            if visited.insert(next) {
                stack.extend(graph.waits_for(next));
            }
        }
        true
    }
}

/// Detector that never refuses; waits are then bounded only by the timeout sweep
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDeadlockDetection;

impl DeadlockDetector for NoDeadlockDetection {
    fn is_safe_to_add(&self, _graph: &dyn WaitForGraph, _job: JobId, _blockers: &[JobId]) -> bool {
        true
    }
}
