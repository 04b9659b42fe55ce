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

//! Storage layer for Hyrax
//!
//! - Configuration types for the lock manager and the join engine
//! - Tuple frames and their on-disk run files
//! - Budgeted in-memory tuple storage used by the joiners

pub mod config;
pub mod frame;
pub mod run_file;
pub mod tuple_memory;

pub use config::{Config, JoinConfig, LockManagerConfig};
pub use frame::{
    deserialize_num_of_min_frame, min_frames_for_tuple, serialize_num_of_min_frame, Frame,
    FRAME_HEADER_SIZE, FRAME_TAIL_SIZE,
};
pub use run_file::{RunFile, RunFileReader, RunFilePointer};
pub use tuple_memory::{TupleMemory, TuplePointer};
