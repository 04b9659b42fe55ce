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

//! # Hyrax - hierarchical locking and interval joins
//!
//! Hyrax holds two building blocks of a parallel query engine:
//!
//! - A two-level (dataset + entity) **lock manager** with intention modes,
//!   lock upgrades, FIFO wait queues, deadlock detection over a wait-for
//!   graph and timeout-based victim selection. Its tables live in slab
//!   allocated fixed-size records linked by slot indices.
//! - A streaming **join engine**: a sort-merge joiner with a memory-bounded
//!   active set that spills to run files, an interval index joiner, and two
//!   partitioned interval joiners.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use hyrax::{DatasetId, JobId, LockManager, LockManagerConfig, LockMode, TransactionContext};
//!
//! let manager = LockManager::new(LockManagerConfig::default());
//! let txn = Arc::new(TransactionContext::new(JobId(1)));
//!
//! manager.lock(DatasetId(7), 42, LockMode::Exclusive, &txn).unwrap();
//! assert_eq!(
//!     manager.held_mode(JobId(1), DatasetId(7), 42),
//!     Some(LockMode::Exclusive)
//! );
//! manager.release_locks(&txn).unwrap();
//! ```
//!
//! ```rust
//! use hyrax::executor::join::{
//!     IntervalField, IntervalIndexJoiner, IntervalPredicate, JoinStatus, ResultAppender,
//!     TupleCollector, VecTupleStream,
//! };
//! use hyrax::JoinConfig;
//!
//! fn interval(start: i64, end: i64) -> Vec<u8> {
//!     [start.to_le_bytes(), end.to_le_bytes()].concat()
//! }
//!
//! let config = JoinConfig::new().with_min_frame_size(4096).with_memory_frames(4);
//! let collector = TupleCollector::new();
//! let mut output = ResultAppender::new(config.min_frame_size, collector.clone());
//! let mut joiner = IntervalIndexJoiner::interval(
//!     &config,
//!     IntervalPredicate::Overlapping,
//!     IntervalField::at(0),
//!     IntervalField::at(0),
//!     VecTupleStream::new(vec![interval(0, 10), interval(20, 30)]),
//!     VecTupleStream::new(vec![interval(5, 25)]),
//! )
//! .unwrap();
//! assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Finished);
//! assert_eq!(collector.len(), 2);
//! ```
//!
//! ## Modules
//!
//! - [`core`] - Error type, lock modes and identifiers
//! - [`common`] - Slot arrays and version information
//! - [`txn`] - Transaction contexts and the lock manager
//! - [`storage`] - Configuration, frames, run files and tuple memory
//! - [`executor`] - Merge and interval joiners

pub mod common;
pub mod core;
pub mod executor;
pub mod storage;
pub mod txn;

// Re-export main types for convenience
pub use core::{AbortReason, DatasetId, Error, JobId, LockMode, Result, DATASET_GRANULE, NIL};

// Re-export common utilities
pub use common::{ChildArrayManager, RecordLayout, SlotArrayManager, DEFAULT_SLOTS_PER_SLAB};

// Re-export config types
pub use storage::{Config, JoinConfig, LockManagerConfig};

// Re-export storage types
pub use storage::{Frame, RunFile, RunFilePointer, RunFileReader, TupleMemory, TuplePointer};

// Re-export locking types
pub use txn::{
    DeadlockDetector, LockManager, LockStatsSnapshot, LockTableOccupancy, NoDeadlockDetection,
    TimeoutSweepHandle, TransactionContext, TransactionState, WaitForGraph, WaitForGraphDetector,
};

// Re-export join types
pub use executor::{
    DisjointPartitionJoiner, FrameWriter, IntervalIndexJoiner, IntervalMergeJoinChecker,
    IntervalPredicate, JoinStats, JoinStatus, MergeJoinChecker, MergeJoiner,
    OverlappingPartitionJoiner, ResultAppender, TupleStream,
};
