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

//! Two-level lock manager
//!
//! Every request first takes a dataset-level lock (the requested mode for a
//! dataset-granule request, IS or IX for an entity request) and then, for
//! entity requests, the entity-level S or X lock. Both levels follow the same
//! protocol:
//!
//! 1. A thread of a job that already has a waiter on the resource for the
//!    same record joins that waiter and parks with it.
//! 2. A request covered by what the job already holds is granted at once.
//! 3. A job that holds something weaker is an upgrader: granted if nothing
//!    else conflicts and no other upgrader is queued, otherwise queued on the
//!    upgrader list.
//! 4. Any other request is granted only if it is compatible and nothing is
//!    queued; otherwise it is queued on the waiter list.
//!
//! Releases run a wakeup pass: upgraders first, then waiters, waking the
//! longest prefix of each queue that is compatible with the holders and with
//! everything woken before it. A woken waiter stays queued until one of its
//! threads re-takes the table latch; that first thread applies the grant for
//! the whole cohort.
//!
//! All table state sits behind one [`RwLock`]; waiting threads park on their
//! waiter's monitor with the latch released.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{RwLock, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, warn};

use super::dataset_lock_info::DatasetLockInfo;
use super::deadlock::{DeadlockDetector, NoDeadlockDetection, WaitForGraph, WaitForGraphDetector};
use super::entity_info::EntityInfoTable;
use super::entity_lock_info::EntityLockInfoTable;
use super::job_info::JobInfo;
use super::lock_waiter::{
    LockWaiterTable, FLAG_ENTITY_LEVEL, FLAG_FIRST_GET_UP, FLAG_UPGRADER, FLAG_VICTIM, FLAG_WAIT,
};
use super::stats::{LockManagerStats, LockStatsSnapshot};
use crate::core::{AbortReason, DatasetId, Error, JobId, LockMode, Result, DATASET_GRANULE, NIL};
use crate::storage::LockManagerConfig;
use crate::txn::{TransactionContext, TransactionState};

/// A queue owner: a dataset or one entity lock info slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Dataset(DatasetId),
    Entity(DatasetId, i32),
}

/// How a dataset-level grant changed the requester's record, so a failed
/// `try_lock` can undo it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrantRevert {
    /// The record went from no dataset holding to one acquisition
    AddedHolder,
    /// The record's mode was strengthened from `previous`
    AddedUpgrader { previous: LockMode },
    /// The record's count went up by one in an already covering mode
    DuplicateIncrement,
}

/// Result of one level of a request
enum Attempt {
    Granted(GrantRevert),
    WouldWait,
    Wait { waiter: i32, joined: bool },
}

/// Occupied record counts of the slab tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockTableOccupancy {
    pub entity_lock_infos: usize,
    pub entity_infos: usize,
    pub lock_waiters: usize,
}

/// Everything guarded by the table latch
pub(crate) struct LockTables {
    datasets: FxHashMap<DatasetId, DatasetLockInfo>,
    jobs: FxHashMap<JobId, JobInfo>,
    elis: EntityLockInfoTable,
    eis: EntityInfoTable,
    waiters: LockWaiterTable,
}

impl LockTables {
    fn new(config: &LockManagerConfig) -> Self {
        let slots = config.slots_per_slab;
        let shrink = config.shrink_timer_threshold();
        Self {
            datasets: FxHashMap::default(),
            jobs: FxHashMap::default(),
            elis: EntityLockInfoTable::new(slots, shrink),
            eis: EntityInfoTable::new(slots, shrink),
            waiters: LockWaiterTable::new(slots, shrink),
        }
    }

    // =========================================================================
    // Record lookup and reclamation
    // =========================================================================

    fn register_job(&mut self, txn: &Arc<TransactionContext>) {
        self.jobs
            .entry(txn.job_id())
            .or_insert_with(|| JobInfo::new(Arc::clone(txn)));
    }

    /// Entity info of (job, dataset, entity), allocated on first use
    fn entity_info_for(&mut self, job: JobId, dataset: DatasetId, entity_hash: i32) -> Option<i32> {
        let info = self.jobs.get_mut(&job)?;
        if let Some(&ei) = info.entity_infos.get(&(dataset, entity_hash)) {
            return Some(ei);
        }
        let ei = self.eis.allocate(job, dataset, entity_hash);
        info.entity_infos.insert((dataset, entity_hash), ei);
        Some(ei)
    }

    /// Entity lock info of (dataset, entity), allocated on first use
    fn entity_lock_info_for(&mut self, dataset: DatasetId, entity_hash: i32) -> i32 {
        let ds = self.datasets.entry(dataset).or_default();
        if let Some(&eli) = ds.entities.get(&entity_hash) {
            return eli;
        }
        let eli = self.elis.allocate();
        ds.entities.insert(entity_hash, eli);
        eli
    }

    fn existing_entity_lock_info(&self, dataset: DatasetId, entity_hash: i32) -> Option<i32> {
        self.datasets
            .get(&dataset)
            .and_then(|ds| ds.entities.get(&entity_hash).copied())
    }

    /// Whether one of the job's waiters still references `ei`
    fn is_waited_on(&self, job: JobId, ei: i32) -> bool {
        match self.jobs.get(&job) {
            Some(info) => self
                .waiters
                .waiting_resources(info.first_waiting_resource)
                .any(|w| self.waiters.entity_info(w) == ei),
            None => false,
        }
    }

    /// Free `ei` once it holds nothing and no waiter references it
    fn maybe_free_entity_info(&mut self, ei: i32) {
        if !self.eis.is_unheld(ei) {
            return;
        }
        let job = self.eis.job_id(ei);
        if self.is_waited_on(job, ei) {
            return;
        }
        let key = (self.eis.dataset_id(ei), self.eis.entity_hash(ei));
        if let Some(info) = self.jobs.get_mut(&job) {
            info.entity_infos.remove(&key);
        }
        self.eis.deallocate(ei);
    }

    /// Free the entity lock info of (dataset, entity) once nothing uses it
    fn maybe_free_entity_lock_info(&mut self, dataset: DatasetId, entity_hash: i32) {
        let Some(ds) = self.datasets.get_mut(&dataset) else {
            return;
        };
        let Some(&eli) = ds.entities.get(&entity_hash) else {
            return;
        };
        if self.elis.is_unused(eli) {
            ds.entities.remove(&entity_hash);
            self.elis.deallocate(eli);
        }
    }

    // =========================================================================
    // Queues
    // =========================================================================

    fn resource_of_waiter(&self, waiter: i32) -> Option<Resource> {
        let ei = self.waiters.entity_info(waiter);
        let dataset = self.eis.dataset_id(ei);
        if self.waiters.has_flag(waiter, FLAG_ENTITY_LEVEL) {
            let eli = self.existing_entity_lock_info(dataset, self.eis.entity_hash(ei))?;
            Some(Resource::Entity(dataset, eli))
        } else {
            Some(Resource::Dataset(dataset))
        }
    }

    fn queue_head(&self, res: Resource, upgrader: bool) -> i32 {
        match res {
            Resource::Dataset(d) => self.datasets.get(&d).map_or(NIL, |ds| {
                if upgrader {
                    ds.first_upgrader
                } else {
                    ds.first_waiter
                }
            }),
            Resource::Entity(_, eli) => {
                if upgrader {
                    self.elis.upgrader(eli)
                } else {
                    self.elis.first_waiter(eli)
                }
            }
        }
    }

    fn set_queue_head(&mut self, res: Resource, upgrader: bool, head: i32) {
        match res {
            Resource::Dataset(d) => {
                let ds = self.datasets.entry(d).or_default();
                if upgrader {
                    ds.first_upgrader = head;
                } else {
                    ds.first_waiter = head;
                }
            }
            Resource::Entity(_, eli) => {
                if upgrader {
                    self.elis.set_upgrader(eli, head);
                } else {
                    self.elis.set_first_waiter(eli, head);
                }
            }
        }
    }

    /// Still-queued waiter for the same record, which a new thread may join
    fn find_inflight_waiter(&self, res: Resource, ei: i32) -> Option<i32> {
        [true, false].into_iter().find_map(|upgrader| {
            self.waiters.queue(self.queue_head(res, upgrader)).find(|&w| {
                self.waiters.entity_info(w) == ei && !self.waiters.has_flag(w, FLAG_FIRST_GET_UP)
            })
        })
    }

    /// Whether `mode` is compatible with waiters that were woken but are not
    /// up yet
    fn pending_compatible(&self, res: Resource, job: JobId, mode: LockMode) -> bool {
        for upgrader in [true, false] {
            for w in self.waiters.queue(self.queue_head(res, upgrader)) {
                if self
                    .waiters
                    .has_flag(w, FLAG_WAIT | FLAG_VICTIM | FLAG_FIRST_GET_UP)
                {
                    continue;
                }
                let other = self.eis.job_id(self.waiters.entity_info(w));
                if other != job && !mode.is_compatible_with(self.waiters.lock_mode(w)) {
                    return false;
                }
            }
        }
        true
    }

    /// Whether the holders of `res`, minus the record's own job, admit `mode`
    fn holders_compatible(&self, res: Resource, ei: i32, mode: LockMode) -> bool {
        match res {
            Resource::Dataset(d) => self
                .datasets
                .get(&d)
                .map_or(true, |ds| ds.is_compatible(self.eis.job_id(ei), mode)),
            Resource::Entity(_, eli) => self.elis.is_compatible(
                eli,
                mode,
                self.eis.entity_lock_mode(ei),
                self.eis.entity_lock_count(ei),
            ),
        }
    }

    /// Queue a new waiter for `ei` and put it on its job's waiting list
    fn enqueue_waiter(
        &mut self,
        res: Resource,
        ei: i32,
        mode: LockMode,
        upgrader: bool,
        now_ms: i64,
    ) -> i32 {
        let mut flags = 0;
        if upgrader {
            flags |= FLAG_UPGRADER;
        }
        if matches!(res, Resource::Entity(..)) {
            flags |= FLAG_ENTITY_LEVEL;
        }
        let waiter = self.waiters.allocate(ei, mode, flags, now_ms);
        let head = self.queue_head(res, upgrader);
        let head = self.waiters.enqueue(head, waiter);
        self.set_queue_head(res, upgrader, head);

        let job = self.eis.job_id(ei);
        if let Some(info) = self.jobs.get_mut(&job) {
            info.first_waiting_resource = self
                .waiters
                .link_waiting_resource(info.first_waiting_resource, waiter);
        }
        waiter
    }

    /// Take a waiter off its resource queue and its job's waiting list
    fn detach_waiter(&mut self, waiter: i32) -> Option<Resource> {
        let res = self.resource_of_waiter(waiter);
        if let Some(res) = res {
            let upgrader = self.waiters.has_flag(waiter, FLAG_UPGRADER);
            let head = self.queue_head(res, upgrader);
            let head = self.waiters.dequeue(head, waiter);
            self.set_queue_head(res, upgrader, head);
        }
        let job = self.eis.job_id(self.waiters.entity_info(waiter));
        if let Some(info) = self.jobs.get_mut(&job) {
            info.first_waiting_resource = self
                .waiters
                .unlink_waiting_resource(info.first_waiting_resource, waiter);
        }
        res
    }

    /// Remove a freshly queued waiter that will never park
    fn abandon_waiter(&mut self, waiter: i32) {
        let ei = self.waiters.entity_info(waiter);
        let res = self.detach_waiter(waiter);
        self.waiters.deallocate(waiter);
        let dataset = self.eis.dataset_id(ei);
        let entity_hash = self.eis.entity_hash(ei);
        if let Some(res) = res {
            self.wake_up(res);
        }
        self.maybe_free_entity_info(ei);
        if entity_hash != DATASET_GRANULE {
            self.maybe_free_entity_lock_info(dataset, entity_hash);
        }
    }

    // =========================================================================
    // Request attempts
    // =========================================================================

    /// Join an in-flight waiter of the same record, if there is one
    fn try_join(
        &mut self,
        res: Resource,
        ei: i32,
        target: LockMode,
        try_only: bool,
    ) -> Result<Option<Attempt>> {
        let Some(waiter) = self.find_inflight_waiter(res, ei) else {
            return Ok(None);
        };
        if try_only {
            return Ok(Some(Attempt::WouldWait));
        }
        let queued = self.waiters.lock_mode(waiter);
        if queued != target {
            debug_assert!(false, "coalesced request asks {} while {} is queued", target, queued);
            return Err(Error::invalid_lock_request(format!(
                "job {} requested {} while another thread of the job waits for {}",
                self.eis.job_id(ei),
                target,
                queued
            )));
        }
        let count = self.waiters.waiter_count(waiter);
        self.waiters.set_waiter_count(waiter, count + 1);
        Ok(Some(Attempt::Wait {
            waiter,
            joined: true,
        }))
    }

    fn attempt_dataset(
        &mut self,
        dataset: DatasetId,
        ei: i32,
        mode: LockMode,
        try_only: bool,
        now_ms: i64,
    ) -> Result<Attempt> {
        let res = Resource::Dataset(dataset);
        let job = self.eis.job_id(ei);
        let target = if self.eis.dataset_lock_count(ei) > 0 {
            self.eis.dataset_lock_mode(ei).join(mode)
        } else {
            mode
        };
        if let Some(joined) = self.try_join(res, ei, target, try_only)? {
            return Ok(joined);
        }

        let ds = self.datasets.entry(dataset).or_default();
        let (grant, upgrader) = match ds.job_holdings(job) {
            Some(own) if own.covers(target) => (true, false),
            Some(_) => (
                ds.first_upgrader == NIL && ds.is_compatible(job, target),
                true,
            ),
            None => (!ds.has_queue() && ds.is_compatible(job, target), false),
        };
        let grant = grant && (!upgrader || self.pending_compatible(res, job, target));

        if grant {
            return Ok(Attempt::Granted(self.apply_dataset_grant(dataset, ei, mode, 1)));
        }
        if try_only {
            return Ok(Attempt::WouldWait);
        }
        let waiter = self.enqueue_waiter(res, ei, target, upgrader, now_ms);
        Ok(Attempt::Wait {
            waiter,
            joined: false,
        })
    }

    fn attempt_entity(
        &mut self,
        dataset: DatasetId,
        eli: i32,
        ei: i32,
        mode: LockMode,
        try_only: bool,
        now_ms: i64,
    ) -> Result<Attempt> {
        let res = Resource::Entity(dataset, eli);
        let job = self.eis.job_id(ei);
        let held = self.eis.entity_lock_mode(ei);
        let held_count = self.eis.entity_lock_count(ei);
        let target = if held_count > 0 { held.join(mode) } else { mode };
        if let Some(joined) = self.try_join(res, ei, target, try_only)? {
            return Ok(joined);
        }

        let compatible = self.elis.is_compatible(eli, target, held, held_count);
        let (grant, upgrader) = if held_count > 0 && held.covers(target) {
            (true, false)
        } else if held_count > 0 {
            (
                self.elis.upgrader(eli) == NIL
                    && compatible
                    && self.pending_compatible(res, job, target),
                true,
            )
        } else {
            (
                self.elis.first_waiter(eli) == NIL && self.elis.upgrader(eli) == NIL && compatible,
                false,
            )
        };

        if grant {
            return Ok(Attempt::Granted(self.apply_entity_grant(eli, ei, mode, 1)));
        }
        if try_only {
            return Ok(Attempt::WouldWait);
        }
        let waiter = self.enqueue_waiter(res, ei, target, upgrader, now_ms);
        Ok(Attempt::Wait {
            waiter,
            joined: false,
        })
    }

    // =========================================================================
    // Grants and releases
    // =========================================================================

    fn link_job_resource(&mut self, ei: i32) {
        let job = self.eis.job_id(ei);
        if let Some(info) = self.jobs.get_mut(&job) {
            info.last_holding_resource = self
                .eis
                .link_job_resource(info.last_holding_resource, ei);
        }
    }

    fn unlink_job_resource(&mut self, ei: i32) {
        let job = self.eis.job_id(ei);
        if let Some(info) = self.jobs.get_mut(&job) {
            info.last_holding_resource = self
                .eis
                .unlink_job_resource(info.last_holding_resource, ei);
        }
    }

    /// Add `n` dataset-level acquisitions of `mode` to `ei`
    fn apply_dataset_grant(&mut self, dataset: DatasetId, ei: i32, mode: LockMode, n: i16) -> GrantRevert {
        let job = self.eis.job_id(ei);
        let was_unheld = self.eis.is_unheld(ei);
        let count = self.eis.dataset_lock_count(ei);
        let held = self.eis.dataset_lock_mode(ei);
        let ds = self.datasets.entry(dataset).or_default();

        let revert = if count == 0 {
            ds.add_holding(job, mode, n as i32);
            self.eis.set_dataset_lock_mode(ei, mode);
            self.eis.set_dataset_lock_count(ei, n);
            if self.eis.entity_hash(ei) == DATASET_GRANULE {
                ds.last_holder = self.eis.link_actor(ds.last_holder, ei);
            }
            GrantRevert::AddedHolder
        } else if held.covers(mode) {
            ds.add_holding(job, held, n as i32);
            self.eis.set_dataset_lock_count(ei, count + n);
            GrantRevert::DuplicateIncrement
        } else {
            let target = held.join(mode);
            ds.add_holding(job, held, -(count as i32));
            ds.add_holding(job, target, (count + n) as i32);
            self.eis.set_dataset_lock_mode(ei, target);
            self.eis.set_dataset_lock_count(ei, count + n);
            GrantRevert::AddedUpgrader { previous: held }
        };
        if was_unheld {
            self.link_job_resource(ei);
        }
        revert
    }

    /// Add `n` entity-level acquisitions of `mode` to `ei`
    fn apply_entity_grant(&mut self, eli: i32, ei: i32, mode: LockMode, n: i16) -> GrantRevert {
        let was_unheld = self.eis.is_unheld(ei);
        let count = self.eis.entity_lock_count(ei);
        let held = self.eis.entity_lock_mode(ei);

        let revert = if count == 0 {
            self.elis.add_count(eli, mode, n);
            self.eis.set_entity_lock_mode(ei, mode);
            self.eis.set_entity_lock_count(ei, n);
            let head = self.eis.link_actor(self.elis.last_holder(eli), ei);
            self.elis.set_last_holder(eli, head);
            GrantRevert::AddedHolder
        } else if held.covers(mode) {
            self.elis.add_count(eli, held, n);
            self.eis.set_entity_lock_count(ei, count + n);
            GrantRevert::DuplicateIncrement
        } else {
            let target = held.join(mode);
            self.elis.add_count(eli, held, -count);
            self.elis.add_count(eli, target, count + n);
            self.eis.set_entity_lock_mode(ei, target);
            self.eis.set_entity_lock_count(ei, count + n);
            GrantRevert::AddedUpgrader { previous: held }
        };
        if was_unheld {
            self.link_job_resource(ei);
        }
        revert
    }

    /// Undo a single dataset-level grant made by a failing `try_lock`
    fn revert_dataset_grant(&mut self, dataset: DatasetId, ei: i32, revert: GrantRevert) {
        let job = self.eis.job_id(ei);
        let count = self.eis.dataset_lock_count(ei);
        let held = self.eis.dataset_lock_mode(ei);
        let ds = self.datasets.entry(dataset).or_default();
        match revert {
            GrantRevert::AddedHolder => {
                ds.add_holding(job, held, -1);
                self.eis.set_dataset_lock_count(ei, 0);
                self.eis.set_dataset_lock_mode(ei, LockMode::None);
                if self.eis.entity_hash(ei) == DATASET_GRANULE {
                    ds.last_holder = self.eis.unlink_actor(ds.last_holder, ei);
                }
            }
            GrantRevert::DuplicateIncrement => {
                ds.add_holding(job, held, -1);
                self.eis.set_dataset_lock_count(ei, count - 1);
            }
            GrantRevert::AddedUpgrader { previous } => {
                ds.add_holding(job, held, -(count as i32));
                ds.add_holding(job, previous, (count - 1) as i32);
                self.eis.set_dataset_lock_mode(ei, previous);
                self.eis.set_dataset_lock_count(ei, count - 1);
            }
        }
        if self.eis.is_unheld(ei) {
            self.unlink_job_resource(ei);
        }
    }

    /// Drop `n` dataset-level acquisitions of `ei`
    fn release_dataset_acquisitions(&mut self, dataset: DatasetId, ei: i32, n: i16) {
        let job = self.eis.job_id(ei);
        let count = self.eis.dataset_lock_count(ei);
        let n = n.min(count);
        if n == 0 {
            return;
        }
        let held = self.eis.dataset_lock_mode(ei);
        let ds = self.datasets.entry(dataset).or_default();
        ds.add_holding(job, held, -(n as i32));
        self.eis.set_dataset_lock_count(ei, count - n);
        if count == n {
            self.eis.set_dataset_lock_mode(ei, LockMode::None);
            if self.eis.entity_hash(ei) == DATASET_GRANULE {
                ds.last_holder = self.eis.unlink_actor(ds.last_holder, ei);
            }
        }
        if self.eis.is_unheld(ei) {
            self.unlink_job_resource(ei);
        }
    }

    /// Drop `n` entity-level acquisitions of `ei`
    fn release_entity_acquisitions(&mut self, eli: i32, ei: i32, n: i16) {
        let count = self.eis.entity_lock_count(ei);
        let n = n.min(count);
        if n == 0 {
            return;
        }
        let held = self.eis.entity_lock_mode(ei);
        self.elis.add_count(eli, held, -n);
        self.eis.set_entity_lock_count(ei, count - n);
        if count == n {
            self.eis.set_entity_lock_mode(ei, LockMode::None);
            let head = self.eis.unlink_actor(self.elis.last_holder(eli), ei);
            self.elis.set_last_holder(eli, head);
        }
        if self.eis.is_unheld(ei) {
            self.unlink_job_resource(ei);
        }
    }

    /// Release everything `ei` holds and free it
    fn release_entity_info(&mut self, ei: i32) {
        let dataset = self.eis.dataset_id(ei);
        let entity_hash = self.eis.entity_hash(ei);
        if entity_hash != DATASET_GRANULE {
            if let Some(eli) = self.existing_entity_lock_info(dataset, entity_hash) {
                let count = self.eis.entity_lock_count(ei);
                self.release_entity_acquisitions(eli, ei, count);
                self.wake_up(Resource::Entity(dataset, eli));
            } else {
                self.eis.set_entity_lock_count(ei, 0);
                self.eis.set_entity_lock_mode(ei, LockMode::None);
                if self.eis.is_unheld(ei) {
                    self.unlink_job_resource(ei);
                }
            }
        }
        let count = self.eis.dataset_lock_count(ei);
        self.release_dataset_acquisitions(dataset, ei, count);
        self.wake_up(Resource::Dataset(dataset));
        self.maybe_free_entity_info(ei);
        if entity_hash != DATASET_GRANULE {
            self.maybe_free_entity_lock_info(dataset, entity_hash);
        }
    }

    // =========================================================================
    // Wakeup
    // =========================================================================

    /// Wake the longest compatible prefix of the upgrader queue, then of the
    /// waiter queue; returns the number of waiters woken
    fn wake_up(&mut self, res: Resource) -> usize {
        // Woken-but-not-up waiters already own their slot in the cohort
        let mut cohort: SmallVec<[(JobId, LockMode); 8]> = SmallVec::new();
        for upgrader in [true, false] {
            for w in self.waiters.queue(self.queue_head(res, upgrader)) {
                if !self
                    .waiters
                    .has_flag(w, FLAG_WAIT | FLAG_VICTIM | FLAG_FIRST_GET_UP)
                {
                    let job = self.eis.job_id(self.waiters.entity_info(w));
                    cohort.push((job, self.waiters.lock_mode(w)));
                }
            }
        }

        let mut woken = 0;
        for upgrader in [true, false] {
            let mut cur = self.queue_head(res, upgrader);
            while cur != NIL {
                let next = self.waiters.next_waiter(cur);
                if !self.waiters.has_flag(cur, FLAG_WAIT)
                    || self.waiters.has_flag(cur, FLAG_VICTIM | FLAG_FIRST_GET_UP)
                {
                    cur = next;
                    continue;
                }
                let ei = self.waiters.entity_info(cur);
                let job = self.eis.job_id(ei);
                let mode = self.waiters.lock_mode(cur);
                let fits_cohort = cohort
                    .iter()
                    .all(|(other, m)| *other == job || mode.is_compatible_with(*m));
                if !fits_cohort || !self.holders_compatible(res, ei, mode) {
                    return woken;
                }
                self.waiters.set_flag(cur, FLAG_WAIT, false);
                self.waiters.signal(cur);
                cohort.push((job, mode));
                woken += 1;
                cur = next;
            }
        }
        woken
    }

    /// Bookkeeping for a thread returning from its monitor
    ///
    /// The first thread of the cohort removes the waiter from its queues and
    /// applies `waiter_count` acquisitions; every thread drops one reference
    /// and the last one frees the waiter. Returns whether the waiter was a
    /// victim, and whether the grant strengthened an existing holding.
    fn get_up(&mut self, waiter: i32) -> Result<(bool, bool)> {
        let victim = self.waiters.has_flag(waiter, FLAG_VICTIM);
        let mut upgraded = false;
        if !self.waiters.has_flag(waiter, FLAG_FIRST_GET_UP) {
            let n = i16::try_from(self.waiters.waiter_count(waiter)).map_err(|_| {
                Error::internal(format!("waiter {} coalesces too many requests", waiter))
            })?;
            self.waiters.set_flag(waiter, FLAG_FIRST_GET_UP, true);
            let ei = self.waiters.entity_info(waiter);
            let dataset = self.eis.dataset_id(ei);
            let entity_hash = self.eis.entity_hash(ei);
            let res = self.detach_waiter(waiter);
            if !victim {
                let mode = self.waiters.lock_mode(waiter);
                let revert = match res {
                    Some(Resource::Dataset(d)) => Some(self.apply_dataset_grant(d, ei, mode, n)),
                    Some(Resource::Entity(_, eli)) => Some(self.apply_entity_grant(eli, ei, mode, n)),
                    None => None,
                };
                upgraded = matches!(revert, Some(GrantRevert::AddedUpgrader { .. }));
            }
            if let Some(res) = res {
                self.wake_up(res);
            }
            if victim {
                self.maybe_free_entity_info(ei);
                if entity_hash != DATASET_GRANULE {
                    self.maybe_free_entity_lock_info(dataset, entity_hash);
                }
            }
        }
        let remaining = self.waiters.waiter_count(waiter) - 1;
        if remaining == 0 {
            self.waiters.deallocate(waiter);
        } else {
            self.waiters.set_waiter_count(waiter, remaining);
        }
        Ok((victim, upgraded))
    }

    // =========================================================================
    // Wait-for graph
    // =========================================================================

    /// Jobs a queued waiter is blocked by: conflicting holders of its
    /// resource and every request queued ahead of it
    fn blockers_of_waiter(&self, waiter: i32) -> SmallVec<[JobId; 4]> {
        let mut out: SmallVec<[JobId; 4]> = SmallVec::new();
        let Some(res) = self.resource_of_waiter(waiter) else {
            return out;
        };
        let ei = self.waiters.entity_info(waiter);
        let job = self.eis.job_id(ei);
        let mode = self.waiters.lock_mode(waiter);
        let push = |out: &mut SmallVec<[JobId; 4]>, other: JobId| {
            if other != job && !out.contains(&other) {
                out.push(other);
            }
        };

        match res {
            Resource::Dataset(d) => {
                if let Some(ds) = self.datasets.get(&d) {
                    for (holder, counts) in ds.holders() {
                        if counts.held_modes().any(|m| !mode.is_compatible_with(m)) {
                            push(&mut out, *holder);
                        }
                    }
                }
            }
            Resource::Entity(_, eli) => {
                for holder in self.eis.actors(self.elis.last_holder(eli)) {
                    if !mode.is_compatible_with(self.eis.entity_lock_mode(holder)) {
                        push(&mut out, self.eis.job_id(holder));
                    }
                }
            }
        }

        let is_upgrader = self.waiters.has_flag(waiter, FLAG_UPGRADER);
        let queues: &[bool] = if is_upgrader { &[true] } else { &[true, false] };
        for &upgrader in queues {
            for w in self.waiters.queue(self.queue_head(res, upgrader)) {
                if w == waiter {
                    break;
                }
                if self.waiters.has_flag(w, FLAG_VICTIM) {
                    continue;
                }
                push(&mut out, self.eis.job_id(self.waiters.entity_info(w)));
            }
        }
        out
    }

    fn occupancy(&self) -> LockTableOccupancy {
        LockTableOccupancy {
            entity_lock_infos: self.elis.occupied_slots(),
            entity_infos: self.eis.occupied_slots(),
            lock_waiters: self.waiters.occupied_slots(),
        }
    }
}

impl WaitForGraph for LockTables {
    fn waits_for(&self, job: JobId) -> SmallVec<[JobId; 4]> {
        let mut out: SmallVec<[JobId; 4]> = SmallVec::new();
        let Some(info) = self.jobs.get(&job) else {
            return out;
        };
        for w in self.waiters.waiting_resources(info.first_waiting_resource) {
            if self.waiters.has_flag(w, FLAG_VICTIM) {
                continue;
            }
            for blocker in self.blockers_of_waiter(w) {
                if !out.contains(&blocker) {
                    out.push(blocker);
                }
            }
        }
        out
    }
}

/// Hierarchical dataset/entity lock manager
///
/// Shared between worker threads through an `Arc`. Failed requests return
/// [`Error::Aborted`]; the caller is expected to call
/// [`release_locks`](Self::release_locks) and abort its transaction.
pub struct LockManager {
    config: LockManagerConfig,
    tables: RwLock<LockTables>,
    detector: Box<dyn DeadlockDetector>,
    stats: LockManagerStats,
    epoch: Instant,
}

impl LockManager {
    /// Create a lock manager; the wait-for graph detector is used when
    /// deadlock detection is enabled
    pub fn new(config: LockManagerConfig) -> Self {
        let detector: Box<dyn DeadlockDetector> = if config.deadlock_detection {
            Box::new(WaitForGraphDetector)
        } else {
            Box::new(NoDeadlockDetection)
        };
        Self::with_detector(config, detector)
    }

    /// Create a lock manager with a custom deadlock detector
    pub fn with_detector(config: LockManagerConfig, detector: Box<dyn DeadlockDetector>) -> Self {
        debug!(
            version = %crate::common::version_info(),
            slots_per_slab = config.slots_per_slab,
            wait_timeout_ms = config.lock_wait_timeout_ms,
            "starting lock manager"
        );
        Self {
            tables: RwLock::new(LockTables::new(&config)),
            config,
            detector,
            stats: LockManagerStats::default(),
            epoch: Instant::now(),
        }
    }

    pub fn config(&self) -> &LockManagerConfig {
        &self.config
    }

    /// Acquire a lock, parking the calling thread until it is granted
    ///
    /// `entity_hash == DATASET_GRANULE` locks the whole dataset in any mode;
    /// entity requests take S or X and imply IS or IX on the dataset.
    pub fn lock(
        &self,
        dataset_id: DatasetId,
        entity_hash: i32,
        mode: LockMode,
        txn: &Arc<TransactionContext>,
    ) -> Result<()> {
        self.acquire(dataset_id, entity_hash, mode, txn, false)
            .map(|_| ())
    }

    /// Acquire a lock if that is possible without waiting
    pub fn try_lock(
        &self,
        dataset_id: DatasetId,
        entity_hash: i32,
        mode: LockMode,
        txn: &Arc<TransactionContext>,
    ) -> Result<bool> {
        self.acquire(dataset_id, entity_hash, mode, txn, true)
    }

    /// Wait until the lock could be granted, then release it at once
    pub fn instant_lock(
        &self,
        dataset_id: DatasetId,
        entity_hash: i32,
        mode: LockMode,
        txn: &Arc<TransactionContext>,
    ) -> Result<()> {
        self.acquire(dataset_id, entity_hash, mode, txn, false)?;
        self.release_one(dataset_id, entity_hash, mode, txn)
    }

    /// Check whether the lock could be granted without waiting, holding
    /// nothing afterwards
    pub fn instant_try_lock(
        &self,
        dataset_id: DatasetId,
        entity_hash: i32,
        mode: LockMode,
        txn: &Arc<TransactionContext>,
    ) -> Result<bool> {
        if !self.acquire(dataset_id, entity_hash, mode, txn, true)? {
            return Ok(false);
        }
        self.release_one(dataset_id, entity_hash, mode, txn)?;
        Ok(true)
    }

    /// Release one entity-level acquisition and its dataset intention lock
    ///
    /// Dataset-granule locks are only released by
    /// [`release_locks`](Self::release_locks).
    pub fn unlock(
        &self,
        dataset_id: DatasetId,
        entity_hash: i32,
        mode: LockMode,
        txn: &Arc<TransactionContext>,
    ) -> Result<()> {
        debug_assert!(
            entity_hash != DATASET_GRANULE,
            "dataset-granule locks are released with release_locks"
        );
        if entity_hash == DATASET_GRANULE {
            return Err(Error::invalid_lock_request(
                "unlock of a dataset-granule lock",
            ));
        }
        self.release_one(dataset_id, entity_hash, mode, txn)
    }

    fn release_one(
        &self,
        dataset_id: DatasetId,
        entity_hash: i32,
        mode: LockMode,
        txn: &Arc<TransactionContext>,
    ) -> Result<()> {
        let job = txn.job_id();
        let not_held = || Error::LockNotHeld {
            job_id: job,
            dataset_id: dataset_id.0,
            entity_hash,
        };
        let mut tables = self.tables.write();
        let ei = tables
            .jobs
            .get(&job)
            .and_then(|info| info.entity_infos.get(&(dataset_id, entity_hash)).copied())
            .ok_or_else(not_held)?;

        if entity_hash == DATASET_GRANULE {
            if tables.eis.dataset_lock_count(ei) == 0
                || !tables.eis.dataset_lock_mode(ei).covers(mode)
            {
                return Err(not_held());
            }
            tables.release_dataset_acquisitions(dataset_id, ei, 1);
            tables.wake_up(Resource::Dataset(dataset_id));
            tables.maybe_free_entity_info(ei);
            return Ok(());
        }

        let eli = tables
            .existing_entity_lock_info(dataset_id, entity_hash)
            .ok_or_else(not_held)?;
        if tables.eis.entity_lock_count(ei) == 0 || !tables.eis.entity_lock_mode(ei).covers(mode) {
            return Err(not_held());
        }
        tables.release_entity_acquisitions(eli, ei, 1);
        tables.release_dataset_acquisitions(dataset_id, ei, 1);
        tables.wake_up(Resource::Entity(dataset_id, eli));
        tables.wake_up(Resource::Dataset(dataset_id));
        tables.maybe_free_entity_info(ei);
        tables.maybe_free_entity_lock_info(dataset_id, entity_hash);
        Ok(())
    }

    /// Release every lock of the transaction and forget the job
    ///
    /// Threads of the job still parked are woken as victims. A job that was
    /// waiting is forced to [`TransactionState::Aborted`].
    pub fn release_locks(&self, txn: &Arc<TransactionContext>) -> Result<()> {
        let job = txn.job_id();
        let mut tables = self.tables.write();
        if !tables.jobs.contains_key(&job) {
            return Ok(());
        }

        let mut was_waiting = false;
        loop {
            let head = tables
                .jobs
                .get(&job)
                .map_or(NIL, |info| info.first_waiting_resource);
            if head == NIL {
                break;
            }
            was_waiting = true;
            tables.waiters.set_flag(head, FLAG_VICTIM, true);
            tables.waiters.set_flag(head, FLAG_FIRST_GET_UP, true);
            let ei = tables.waiters.entity_info(head);
            let res = tables.detach_waiter(head);
            tables.waiters.signal(head);
            if let Some(res) = res {
                tables.wake_up(res);
            }
            tables.maybe_free_entity_info(ei);
        }
        if was_waiting {
            txn.set_state(TransactionState::Aborted);
        }

        loop {
            let head = tables
                .jobs
                .get(&job)
                .map_or(NIL, |info| info.last_holding_resource);
            if head == NIL {
                break;
            }
            tables.release_entity_info(head);
        }

        // Records that neither hold nor wait (left by an aborted attempt)
        let leftovers: Vec<i32> = tables
            .jobs
            .get(&job)
            .map(|info| info.entity_infos.values().copied().collect())
            .unwrap_or_default();
        for ei in leftovers {
            let dataset = tables.eis.dataset_id(ei);
            let entity_hash = tables.eis.entity_hash(ei);
            tables.maybe_free_entity_info(ei);
            if entity_hash != DATASET_GRANULE {
                tables.maybe_free_entity_lock_info(dataset, entity_hash);
            }
        }

        tables.jobs.remove(&job);
        self.stats.record_release();
        debug!(job = %job, was_waiting, "released all locks");
        Ok(())
    }

    /// Mark waiters parked longer than the wait timeout as victims
    ///
    /// Returns the number of new victims. Each victim's transaction gets its
    /// timeout flag set and the parked threads abort when they get up.
    pub fn sweep_for_timeout(&self) -> usize {
        let now = self.now_ms();
        let timeout = self.config.lock_wait_timeout_ms as i64;
        let mut tables = self.tables.write();

        let mut victims: Vec<(i32, Arc<TransactionContext>)> = Vec::new();
        for info in tables.jobs.values() {
            for w in tables.waiters.waiting_resources(info.first_waiting_resource) {
                if tables.waiters.has_flag(w, FLAG_WAIT)
                    && !tables.waiters.has_flag(w, FLAG_VICTIM)
                    && now - tables.waiters.begin_wait_ms(w) >= timeout
                {
                    victims.push((w, Arc::clone(&info.txn)));
                }
            }
        }

        for (w, txn) in &victims {
            tables.waiters.set_flag(*w, FLAG_VICTIM, true);
            txn.set_timeout(true);
            tables.waiters.signal(*w);
            self.stats.record_timeout();
            warn!(job = %txn.job_id(), waiter = *w, "lock wait timed out");
        }
        victims.len()
    }

    fn acquire(
        &self,
        dataset_id: DatasetId,
        entity_hash: i32,
        mode: LockMode,
        txn: &Arc<TransactionContext>,
        try_only: bool,
    ) -> Result<bool> {
        validate_request(entity_hash, mode)?;
        let job = txn.job_id();
        let mut tables = self.tables.write();
        check_transaction(txn)?;
        tables.register_job(txn);
        let ei = tables
            .entity_info_for(job, dataset_id, entity_hash)
            .ok_or_else(|| Error::internal(format!("job {} is not registered", job)))?;
        if tables.eis.dataset_lock_count(ei) == i16::MAX
            || tables.eis.entity_lock_count(ei) == i16::MAX
        {
            return Err(Error::internal(format!(
                "job {} holds too many acquisitions of {}:{}",
                job, dataset_id, entity_hash
            )));
        }

        let dataset_mode = if entity_hash == DATASET_GRANULE {
            mode
        } else {
            mode.intention()
        };
        let now = self.now_ms();
        let attempt = tables.attempt_dataset(dataset_id, ei, dataset_mode, try_only, now)?;
        let dataset_grant = match attempt {
            Attempt::Granted(revert) => {
                if matches!(revert, GrantRevert::AddedUpgrader { .. }) {
                    self.stats.record_upgrade();
                }
                Some(revert)
            }
            Attempt::WouldWait => {
                tables.maybe_free_entity_info(ei);
                self.stats.record_try_lock_failure();
                return Ok(false);
            }
            Attempt::Wait { waiter, joined } => {
                tables = self.wait_on(tables, waiter, joined, txn)?;
                None
            }
        };

        if entity_hash == DATASET_GRANULE {
            self.stats.record_grant();
            return Ok(true);
        }

        let eli = tables.entity_lock_info_for(dataset_id, entity_hash);
        let now = self.now_ms();
        let attempt = tables.attempt_entity(dataset_id, eli, ei, mode, try_only, now)?;
        match attempt {
            Attempt::Granted(revert) => {
                if matches!(revert, GrantRevert::AddedUpgrader { .. }) {
                    self.stats.record_upgrade();
                }
            }
            Attempt::WouldWait => {
                if let Some(revert) = dataset_grant {
                    tables.revert_dataset_grant(dataset_id, ei, revert);
                }
                tables.maybe_free_entity_info(ei);
                tables.maybe_free_entity_lock_info(dataset_id, entity_hash);
                self.stats.record_try_lock_failure();
                return Ok(false);
            }
            Attempt::Wait { waiter, joined } => {
                tables = self.wait_on(tables, waiter, joined, txn)?;
            }
        }
        drop(tables);
        self.stats.record_grant();
        Ok(true)
    }

    /// Park on `waiter` and complete the request once woken
    fn wait_on<'a>(
        &'a self,
        mut tables: RwLockWriteGuard<'a, LockTables>,
        waiter: i32,
        joined: bool,
        txn: &TransactionContext,
    ) -> Result<RwLockWriteGuard<'a, LockTables>> {
        let job = txn.job_id();
        if !joined {
            let blockers = tables.blockers_of_waiter(waiter);
            if !self.detector.is_safe_to_add(&*tables, job, &blockers) {
                tables.abandon_waiter(waiter);
                self.stats.record_deadlock();
                warn!(job = %job, ?blockers, "lock request would deadlock");
                return Err(Error::aborted(job, AbortReason::Deadlock));
            }
        }
        self.stats.record_wait();
        let monitor = tables
            .waiters
            .monitor(waiter)
            .ok_or_else(|| Error::internal(format!("waiter {} has no monitor", waiter)))?;
        debug!(job = %job, waiter, joined, "parking lock request");

        drop(tables);
        monitor.wait();
        let mut tables = self.tables.write();

        let (victim, upgraded) = tables.get_up(waiter)?;
        if victim {
            let reason = if txn.is_timeout() {
                AbortReason::Timeout
            } else {
                AbortReason::Released
            };
            debug!(job = %job, waiter, %reason, "woken as victim");
            return Err(Error::aborted(job, reason));
        }
        if upgraded {
            self.stats.record_upgrade();
        }
        Ok(tables)
    }

    fn now_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Counter snapshot
    pub fn stats(&self) -> LockStatsSnapshot {
        self.stats.snapshot()
    }

    /// Mode the job holds on a resource: the entity mode for entity requests,
    /// the dataset mode for `DATASET_GRANULE`
    pub fn held_mode(&self, job: JobId, dataset_id: DatasetId, entity_hash: i32) -> Option<LockMode> {
        let tables = self.tables.read();
        let ei = *tables
            .jobs
            .get(&job)?
            .entity_infos
            .get(&(dataset_id, entity_hash))?;
        let (mode, count) = if entity_hash == DATASET_GRANULE {
            (tables.eis.dataset_lock_mode(ei), tables.eis.dataset_lock_count(ei))
        } else {
            (tables.eis.entity_lock_mode(ei), tables.eis.entity_lock_count(ei))
        };
        (count > 0).then_some(mode)
    }

    /// Whether the job has at least one parked request
    pub fn is_waiting(&self, job: JobId) -> bool {
        self.tables
            .read()
            .jobs
            .get(&job)
            .is_some_and(|info| info.is_waiting())
    }

    /// Number of jobs with lock state
    pub fn job_count(&self) -> usize {
        self.tables.read().jobs.len()
    }

    /// Occupied slots per slab table
    pub fn occupancy(&self) -> LockTableOccupancy {
        self.tables.read().occupancy()
    }

    /// Human-readable dump of datasets, jobs and slab occupancy
    pub fn pretty_print(&self) -> String {
        let tables = self.tables.read();
        let mut out = String::new();
        let _ = writeln!(out, "LockManager [{}]", self.stats.snapshot());

        let mut datasets: Vec<_> = tables.datasets.iter().collect();
        datasets.sort_by_key(|(id, _)| **id);
        for (id, ds) in datasets {
            let counts = ds.counts();
            let _ = writeln!(
                out,
                "dataset {}: IS={} IX={} S={} X={} waiters={} upgraders={}",
                id,
                counts.get(LockMode::IntentionShared),
                counts.get(LockMode::IntentionExclusive),
                counts.get(LockMode::Shared),
                counts.get(LockMode::Exclusive),
                format_queue(&tables, ds.first_waiter),
                format_queue(&tables, ds.first_upgrader),
            );
            let mut entities: Vec<_> = ds.entities.iter().collect();
            entities.sort();
            for (hash, eli) in entities {
                let holders: Vec<String> = tables
                    .eis
                    .actors(tables.elis.last_holder(*eli))
                    .map(|h| {
                        format!(
                            "{}:{}x{}",
                            tables.eis.job_id(h),
                            tables.eis.entity_lock_mode(h),
                            tables.eis.entity_lock_count(h)
                        )
                    })
                    .collect();
                let _ = writeln!(
                    out,
                    "  entity {}: S={} X={} holders=[{}] waiters={} upgraders={}",
                    hash,
                    tables.elis.s_count(*eli),
                    tables.elis.x_count(*eli),
                    holders.join(", "),
                    format_queue(&tables, tables.elis.first_waiter(*eli)),
                    format_queue(&tables, tables.elis.upgrader(*eli)),
                );
            }
        }

        let mut jobs: Vec<_> = tables.jobs.iter().collect();
        jobs.sort_by_key(|(id, _)| **id);
        for (id, info) in jobs {
            let mut holding = Vec::new();
            let mut cur = info.last_holding_resource;
            while cur != NIL {
                holding.push(format!(
                    "{}/{}:{}x{}/{}x{}",
                    tables.eis.dataset_id(cur),
                    tables.eis.entity_hash(cur),
                    tables.eis.dataset_lock_mode(cur),
                    tables.eis.dataset_lock_count(cur),
                    tables.eis.entity_lock_mode(cur),
                    tables.eis.entity_lock_count(cur),
                ));
                cur = tables.eis.prev_job_resource(cur);
            }
            let waiting: Vec<String> = tables
                .waiters
                .waiting_resources(info.first_waiting_resource)
                .map(|w| w.to_string())
                .collect();
            let _ = writeln!(
                out,
                "job {} ({:?}): holding=[{}] waiting=[{}]",
                id,
                info.txn.state(),
                holding.join(", "),
                waiting.join(", ")
            );
        }

        let occ = tables.occupancy();
        let _ = writeln!(
            out,
            "slots: entity_lock_info={} entity_info={} lock_waiter={}",
            occ.entity_lock_infos, occ.entity_infos, occ.lock_waiters
        );
        out.push_str(&tables.elis.pretty_print());
        out.push_str(&tables.eis.pretty_print());
        out.push_str(&tables.waiters.pretty_print());
        out
    }
}

fn format_queue(tables: &LockTables, head: i32) -> String {
    let entries: Vec<String> = tables
        .waiters
        .queue(head)
        .map(|w| {
            let job = tables.eis.job_id(tables.waiters.entity_info(w));
            let state = if tables.waiters.has_flag(w, FLAG_VICTIM) {
                "victim"
            } else if tables.waiters.has_flag(w, FLAG_WAIT) {
                "wait"
            } else {
                "woken"
            };
            format!(
                "{}:{}({}x{})",
                job,
                tables.waiters.lock_mode(w),
                state,
                tables.waiters.waiter_count(w)
            )
        })
        .collect();
    format!("[{}]", entries.join(", "))
}

fn validate_request(entity_hash: i32, mode: LockMode) -> Result<()> {
    match (entity_hash == DATASET_GRANULE, mode) {
        (_, LockMode::None) => Err(Error::invalid_lock_request("lock mode NL")),
        (false, LockMode::IntentionShared | LockMode::IntentionExclusive) => Err(
            Error::invalid_lock_request(format!("{} is not an entity lock mode", mode)),
        ),
        _ => Ok(()),
    }
}

fn check_transaction(txn: &TransactionContext) -> Result<()> {
    if txn.is_aborted() {
        return Err(Error::aborted(txn.job_id(), AbortReason::TransactionAborted));
    }
    if txn.is_timeout() {
        return Err(Error::aborted(txn.job_id(), AbortReason::Timeout));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LockManager {
        LockManager::new(LockManagerConfig::compact())
    }

    fn txn(id: i32) -> Arc<TransactionContext> {
        Arc::new(TransactionContext::new(JobId(id)))
    }

    const D: DatasetId = DatasetId(1);

    #[test]
    fn test_entity_lock_takes_intention_lock() {
        let lm = manager();
        let t1 = txn(1);
        lm.lock(D, 10, LockMode::Exclusive, &t1).unwrap();
        assert_eq!(lm.held_mode(JobId(1), D, 10), Some(LockMode::Exclusive));

        let tables = lm.tables.read();
        let ds = tables.datasets.get(&D).unwrap();
        assert_eq!(ds.counts().get(LockMode::IntentionExclusive), 1);
    }

    #[test]
    fn test_duplicate_and_unlock_counts() {
        let lm = manager();
        let t1 = txn(1);
        lm.lock(D, 10, LockMode::Shared, &t1).unwrap();
        lm.lock(D, 10, LockMode::Shared, &t1).unwrap();
        lm.unlock(D, 10, LockMode::Shared, &t1).unwrap();
        assert_eq!(lm.held_mode(JobId(1), D, 10), Some(LockMode::Shared));
        lm.unlock(D, 10, LockMode::Shared, &t1).unwrap();
        assert_eq!(lm.held_mode(JobId(1), D, 10), None);
        // Both records are reclaimed
        let occ = lm.occupancy();
        assert_eq!(occ.entity_infos, 0);
        assert_eq!(occ.entity_lock_infos, 0);
    }

    #[test]
    fn test_unlock_not_held() {
        let lm = manager();
        let t1 = txn(1);
        let err = lm.unlock(D, 3, LockMode::Shared, &t1).unwrap_err();
        assert!(matches!(err, Error::LockNotHeld { .. }));
    }

    #[test]
    fn test_invalid_modes() {
        let lm = manager();
        let t1 = txn(1);
        assert!(matches!(
            lm.lock(D, 3, LockMode::IntentionShared, &t1),
            Err(Error::InvalidLockRequest(_))
        ));
        assert!(matches!(
            lm.lock(D, DATASET_GRANULE, LockMode::None, &t1),
            Err(Error::InvalidLockRequest(_))
        ));
    }

    #[test]
    fn test_try_lock_reverts_dataset_grant() {
        let lm = manager();
        let t1 = txn(1);
        let t2 = txn(2);
        lm.lock(D, 10, LockMode::Exclusive, &t1).unwrap();
        assert!(!lm.try_lock(D, 10, LockMode::Shared, &t2).unwrap());

        let tables = lm.tables.read();
        let ds = tables.datasets.get(&D).unwrap();
        // Only job 1's IX remains; the IS added for job 2 was reverted
        assert_eq!(ds.counts().get(LockMode::IntentionShared), 0);
        assert!(ds.job_holdings(JobId(2)).is_none());
        drop(tables);
        assert_eq!(lm.stats().try_lock_failures, 1);
    }

    #[test]
    fn test_try_lock_reverts_duplicate_increment() {
        let lm = manager();
        let t1 = txn(1);
        let t2 = txn(2);
        lm.lock(D, 10, LockMode::Exclusive, &t1).unwrap();
        lm.lock(D, 20, LockMode::Shared, &t2).unwrap();
        // Job 2's IS covers the new request's IS, then entity 10 is busy
        assert!(!lm.try_lock(D, 10, LockMode::Shared, &t2).unwrap());
        let tables = lm.tables.read();
        let ds = tables.datasets.get(&D).unwrap();
        assert_eq!(ds.counts().get(LockMode::IntentionShared), 1);
    }

    #[test]
    fn test_try_lock_reverts_upgrade() {
        let lm = manager();
        let t1 = txn(1);
        let t2 = txn(2);
        lm.lock(D, 20, LockMode::Shared, &t1).unwrap();
        lm.lock(D, 20, LockMode::Shared, &t2).unwrap();
        // IS -> IX at the dataset succeeds, the entity upgrade S -> X cannot
        assert!(!lm.try_lock(D, 20, LockMode::Exclusive, &t1).unwrap());
        assert_eq!(lm.held_mode(JobId(1), D, 20), Some(LockMode::Shared));
        let tables = lm.tables.read();
        let ds = tables.datasets.get(&D).unwrap();
        assert_eq!(ds.counts().get(LockMode::IntentionExclusive), 0);
        assert_eq!(ds.counts().get(LockMode::IntentionShared), 2);
    }

    #[test]
    fn test_instant_lock_leaves_nothing() {
        let lm = manager();
        let t1 = txn(1);
        lm.instant_lock(D, DATASET_GRANULE, LockMode::Exclusive, &t1).unwrap();
        assert_eq!(lm.held_mode(JobId(1), D, DATASET_GRANULE), None);
        assert!(lm.instant_try_lock(D, 5, LockMode::Exclusive, &t1).unwrap());
        assert_eq!(lm.held_mode(JobId(1), D, 5), None);
        assert_eq!(lm.occupancy().entity_infos, 0);
    }

    #[test]
    fn test_aborted_transaction_is_rejected() {
        let lm = manager();
        let t1 = txn(1);
        t1.abort();
        let err = lm.lock(D, 1, LockMode::Shared, &t1).unwrap_err();
        assert_eq!(
            err,
            Error::aborted(JobId(1), AbortReason::TransactionAborted)
        );
    }

    #[test]
    fn test_release_locks_frees_everything() {
        let lm = manager();
        let t1 = txn(1);
        lm.lock(D, DATASET_GRANULE, LockMode::Shared, &t1).unwrap();
        for e in 0..20 {
            lm.lock(D, e, LockMode::Shared, &t1).unwrap();
        }
        lm.lock(DatasetId(2), 7, LockMode::Exclusive, &t1).unwrap();
        lm.release_locks(&t1).unwrap();
        assert_eq!(lm.job_count(), 0);
        assert_eq!(lm.occupancy(), LockTableOccupancy::default());
    }

    #[test]
    fn test_wait_for_graph_blockers() {
        let lm = manager();
        let t1 = txn(1);
        let t2 = txn(2);
        lm.lock(D, 10, LockMode::Shared, &t1).unwrap();
        let mut tables = lm.tables.write();
        tables.register_job(&t2);
        let ei = tables.entity_info_for(JobId(2), D, 10).unwrap();
        let eli = tables.entity_lock_info_for(D, 10);
        let w = tables.enqueue_waiter(Resource::Entity(D, eli), ei, LockMode::Exclusive, false, 0);
        assert_eq!(tables.blockers_of_waiter(w).as_slice(), &[JobId(1)]);
        assert_eq!(tables.waits_for(JobId(2)).as_slice(), &[JobId(1)]);
        assert!(tables.waits_for(JobId(1)).is_empty());
        tables.abandon_waiter(w);
        assert_eq!(tables.occupancy().lock_waiters, 0);
    }

    #[test]
    fn test_pretty_print_mentions_holders() {
        let lm = manager();
        let t1 = txn(1);
        lm.lock(D, 42, LockMode::Exclusive, &t1).unwrap();
        let dump = lm.pretty_print();
        assert!(dump.contains("dataset 1: IS=0 IX=1"));
        assert!(dump.contains("entity 42: S=0 X=1 holders=[1:Xx1]"));
        assert!(dump.contains("job 1 (Active)"));
    }
}
