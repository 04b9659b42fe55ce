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

//! Query-side operators
//!
//! The executor receives already sorted or partitioned tuple streams from
//! its caller and joins them:
//!
//! ```text
//! left stream ──┐
//!               ├─> joiner ──> ResultAppender ──> FrameWriter
//! right stream ─┘     │
//!                     └─> run files (spill)
//! ```

pub mod join;

pub use join::{
    DisjointPartitionJoiner, FrameWriter, IntervalIndexJoiner, IntervalMergeJoinChecker,
    IntervalPredicate, JoinStats, JoinStatus, MergeJoinChecker, MergeJoiner,
    OverlappingPartitionJoiner, ResultAppender, TupleStream,
};
