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

//! Streaming joins over frame-based tuple streams
//!
//! # Joiners
//!
//! - [`MergeJoiner`] - Sort-merge join driven by a [`MergeJoinChecker`],
//!   spilling left tuples to a run file when its active set fills memory
//! - [`IntervalIndexJoiner`] - Merge join over intervals with an end-point
//!   ordered active set
//! - [`OverlappingPartitionJoiner`] - Bucketed join for long intervals,
//!   spilling whole buckets
//! - [`DisjointPartitionJoiner`] - Merge joins between partitions of
//!   mutually disjoint intervals
//!
//! Every joiner pulls from two [`TupleStream`]s, appends `left ++ right`
//! result tuples to a [`ResultAppender`] and returns [`JoinStatus::Blocked`]
//! when an input has nothing yet, so it can be resumed later.

pub mod active_set;
pub mod checker;
pub mod disjoint_partition_joiner;
pub mod interval_checker;
pub mod interval_index_joiner;
pub mod interval_logic;
pub mod merge_joiner;
pub mod output;
pub mod overlapping_partition_joiner;
pub mod partition;
pub mod partition_and_spill;
pub mod stats;
pub mod stream;

pub use active_set::{ActiveSet, EndPointIndex, ScanActiveSet};
pub use checker::{EquiMergeJoinChecker, MergeJoinChecker};
pub use disjoint_partition_joiner::{DisjointPartitionJoiner, DisjointPartitioner};
pub use interval_checker::IntervalMergeJoinChecker;
pub use interval_index_joiner::IntervalIndexJoiner;
pub use interval_logic::{Interval, IntervalField, IntervalPredicate};
pub use merge_joiner::{JoinStatus, MergeJoiner, Side};
pub use output::{CountingWriter, FrameWriter, ResultAppender, TupleCollector};
pub use overlapping_partition_joiner::OverlappingPartitionJoiner;
pub use partition::{
    interval_partition_count, interval_partition_map, interval_partition_unmap,
    IntervalPartitioner,
};
pub use partition_and_spill::PartitionAndSpill;
pub use stats::JoinStats;
pub use stream::{FrameQueueProducer, FrameQueueStream, TupleStatus, TupleStream, VecTupleStream};
