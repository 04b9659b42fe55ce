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

//! Per-job lock bookkeeping

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::core::{DatasetId, NIL};
use crate::txn::TransactionContext;

/// Lists of resources a job holds and waits on
#[derive(Debug)]
pub struct JobInfo {
    /// Context of the owning transaction, used by the timeout sweep
    pub txn: Arc<TransactionContext>,
    /// Head of the holding list (entity info slots, newest first)
    pub last_holding_resource: i32,
    /// Head of the waiting list (lock waiter slots)
    pub first_waiting_resource: i32,
    /// (dataset, entity hash) -> entity info slot, for every live record of
    /// the job whether holding or waiting
    pub entity_infos: FxHashMap<(DatasetId, i32), i32>,
}

impl JobInfo {
    pub fn new(txn: Arc<TransactionContext>) -> Self {
        Self {
            txn,
            last_holding_resource: NIL,
            first_waiting_resource: NIL,
            entity_infos: FxHashMap::default(),
        }
    }

    /// Whether the job is parked on at least one resource
    pub fn is_waiting(&self) -> bool {
        self.first_waiting_resource != NIL
    }
}
