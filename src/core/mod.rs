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

//! Core types and definitions for Hyrax
//!
//! - [`Error`] - Error type for lock and join operations
//! - [`LockMode`] - Dataset and entity lock modes
//! - [`JobId`], [`DatasetId`] - Identifiers handed in by transaction contexts

pub mod error;
pub mod types;

pub use error::{AbortReason, Error, Result};
pub use types::{DatasetId, JobId, LockMode, DATASET_GRANULE, NIL};
