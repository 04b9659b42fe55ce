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

//! Hierarchical lock manager
//!
//! Lock state lives in three slab tables (entity lock infos, entity infos and
//! lock waiters) plus per-dataset and per-job records, all behind one latch.

pub mod dataset_lock_info;
pub mod deadlock;
pub mod entity_info;
pub mod entity_lock_info;
pub mod job_info;
pub mod lock_manager;
pub mod lock_waiter;
pub mod stats;
pub mod timeout;

pub use deadlock::{DeadlockDetector, NoDeadlockDetection, WaitForGraph, WaitForGraphDetector};
pub use lock_manager::{LockManager, LockTableOccupancy};
pub use stats::LockStatsSnapshot;
pub use timeout::TimeoutSweepHandle;
