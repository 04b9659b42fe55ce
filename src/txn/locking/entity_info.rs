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

//! Per-(job, dataset, entity) lock request records
//!
//! One record exists for every triple a job has requested. The record carries
//! both the dataset-level part of the request (IS/IX for entity requests, any
//! mode for dataset-granule requests) and the entity-level part.
//!
//! Each record sits on two intrusive lists:
//!
//! - the holder list of its resource (`prev/next_entity_actor`): the entity
//!   lock info for entity requests, the dataset lock info for dataset-granule
//!   requests
//! - the holding list of its job (`prev/next_job_resource`)
//!
//! A record is on the job list exactly while one of its counts is non-zero.

use std::time::Duration;

use crate::common::{RecordLayout, SlotArrayManager};
use crate::core::{DatasetId, JobId, LockMode, NIL};

const JOB_ID_OFFSET: usize = 0;
const DATASET_ID_OFFSET: usize = 4;
const ENTITY_HASH_OFFSET: usize = 8;
const DATASET_LOCK_MODE_OFFSET: usize = 12;
const ENTITY_LOCK_MODE_OFFSET: usize = 13;
const DATASET_LOCK_COUNT_OFFSET: usize = 14;
const ENTITY_LOCK_COUNT_OFFSET: usize = 16;
const PREV_ENTITY_ACTOR_OFFSET: usize = 20;
const NEXT_ENTITY_ACTOR_OFFSET: usize = 24;
const PREV_JOB_RESOURCE_OFFSET: usize = 28;
const NEXT_JOB_RESOURCE_OFFSET: usize = 32;

/// Record size in bytes
pub const ENTITY_INFO_SIZE: usize = 36;

fn init_entity_info(record: &mut [u8]) {
    record.fill(0);
    for offset in [
        JOB_ID_OFFSET,
        DATASET_ID_OFFSET,
        ENTITY_HASH_OFFSET,
        PREV_ENTITY_ACTOR_OFFSET,
        NEXT_ENTITY_ACTOR_OFFSET,
        PREV_JOB_RESOURCE_OFFSET,
        NEXT_JOB_RESOURCE_OFFSET,
    ] {
        record[offset..offset + 4].copy_from_slice(&NIL.to_le_bytes());
    }
}

const LAYOUT: RecordLayout = RecordLayout {
    record_size: ENTITY_INFO_SIZE,
    init: init_entity_info,
};

/// Slab table of entity info records
pub struct EntityInfoTable {
    slots: SlotArrayManager,
}

impl EntityInfoTable {
    pub fn new(slots_per_slab: usize, shrink_threshold: Duration) -> Self {
        Self {
            slots: SlotArrayManager::new("EntityInfo", LAYOUT, slots_per_slab, shrink_threshold),
        }
    }

    /// Allocate a record for the triple with zero counts and no links
    pub fn allocate(&mut self, job_id: JobId, dataset_id: DatasetId, entity_hash: i32) -> i32 {
        let slot = self.slots.allocate();
        self.slots.set_i32(slot, JOB_ID_OFFSET, job_id.0);
        self.slots.set_i32(slot, DATASET_ID_OFFSET, dataset_id.0);
        self.slots.set_i32(slot, ENTITY_HASH_OFFSET, entity_hash);
        slot
    }

    pub fn deallocate(&mut self, slot: i32) {
        debug_assert_eq!(self.dataset_lock_count(slot), 0);
        debug_assert_eq!(self.entity_lock_count(slot), 0);
        self.slots.deallocate(slot);
    }

    #[inline]
    pub fn job_id(&self, slot: i32) -> JobId {
        JobId(self.slots.get_i32(slot, JOB_ID_OFFSET))
    }

    #[inline]
    pub fn dataset_id(&self, slot: i32) -> DatasetId {
        DatasetId(self.slots.get_i32(slot, DATASET_ID_OFFSET))
    }

    #[inline]
    pub fn entity_hash(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, ENTITY_HASH_OFFSET)
    }

    #[inline]
    pub fn dataset_lock_mode(&self, slot: i32) -> LockMode {
        LockMode::from_u8(self.slots.get_u8(slot, DATASET_LOCK_MODE_OFFSET))
    }

    #[inline]
    pub fn set_dataset_lock_mode(&mut self, slot: i32, mode: LockMode) {
        self.slots.set_u8(slot, DATASET_LOCK_MODE_OFFSET, mode.as_u8());
    }

    #[inline]
    pub fn entity_lock_mode(&self, slot: i32) -> LockMode {
        LockMode::from_u8(self.slots.get_u8(slot, ENTITY_LOCK_MODE_OFFSET))
    }

    #[inline]
    pub fn set_entity_lock_mode(&mut self, slot: i32, mode: LockMode) {
        self.slots.set_u8(slot, ENTITY_LOCK_MODE_OFFSET, mode.as_u8());
    }

    #[inline]
    pub fn dataset_lock_count(&self, slot: i32) -> i16 {
        self.slots.get_i16(slot, DATASET_LOCK_COUNT_OFFSET)
    }

    #[inline]
    pub fn set_dataset_lock_count(&mut self, slot: i32, count: i16) {
        self.slots.set_i16(slot, DATASET_LOCK_COUNT_OFFSET, count);
    }

    #[inline]
    pub fn entity_lock_count(&self, slot: i32) -> i16 {
        self.slots.get_i16(slot, ENTITY_LOCK_COUNT_OFFSET)
    }

    #[inline]
    pub fn set_entity_lock_count(&mut self, slot: i32, count: i16) {
        self.slots.set_i16(slot, ENTITY_LOCK_COUNT_OFFSET, count);
    }

    /// Whether the record holds nothing at either level
    #[inline]
    pub fn is_unheld(&self, slot: i32) -> bool {
        self.dataset_lock_count(slot) == 0 && self.entity_lock_count(slot) == 0
    }

    #[inline]
    pub fn prev_entity_actor(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, PREV_ENTITY_ACTOR_OFFSET)
    }

    #[inline]
    pub fn next_entity_actor(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, NEXT_ENTITY_ACTOR_OFFSET)
    }

    #[inline]
    pub fn prev_job_resource(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, PREV_JOB_RESOURCE_OFFSET)
    }

    #[inline]
    pub fn next_job_resource(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, NEXT_JOB_RESOURCE_OFFSET)
    }

    // =========================================================================
    // Holder lists (head is the most recently added holder)
    // =========================================================================

    /// Push `slot` onto a holder list, returning the new head
    pub fn link_actor(&mut self, head: i32, slot: i32) -> i32 {
        self.slots.set_i32(slot, PREV_ENTITY_ACTOR_OFFSET, head);
        self.slots.set_i32(slot, NEXT_ENTITY_ACTOR_OFFSET, NIL);
        if head != NIL {
            self.slots.set_i32(head, NEXT_ENTITY_ACTOR_OFFSET, slot);
        }
        slot
    }

    /// Remove `slot` from a holder list, returning the new head
    pub fn unlink_actor(&mut self, head: i32, slot: i32) -> i32 {
        let prev = self.prev_entity_actor(slot);
        let next = self.next_entity_actor(slot);
        if prev != NIL {
            self.slots.set_i32(prev, NEXT_ENTITY_ACTOR_OFFSET, next);
        }
        if next != NIL {
            self.slots.set_i32(next, PREV_ENTITY_ACTOR_OFFSET, prev);
        }
        self.slots.set_i32(slot, PREV_ENTITY_ACTOR_OFFSET, NIL);
        self.slots.set_i32(slot, NEXT_ENTITY_ACTOR_OFFSET, NIL);
        if head == slot {
            prev
        } else {
            head
        }
    }

    /// Find the record of `job_id` on a holder list
    pub fn find_actor(&self, head: i32, job_id: JobId) -> Option<i32> {
        let mut cur = head;
        while cur != NIL {
            if self.job_id(cur) == job_id {
                return Some(cur);
            }
            cur = self.prev_entity_actor(cur);
        }
        None
    }

    /// Iterate a holder list from its head
    pub fn actors(&self, head: i32) -> ActorIter<'_> {
        ActorIter {
            table: self,
            cur: head,
        }
    }

    // =========================================================================
    // Job holding lists
    // =========================================================================

    /// Push `slot` onto a job holding list, returning the new head
    pub fn link_job_resource(&mut self, head: i32, slot: i32) -> i32 {
        self.slots.set_i32(slot, PREV_JOB_RESOURCE_OFFSET, head);
        self.slots.set_i32(slot, NEXT_JOB_RESOURCE_OFFSET, NIL);
        if head != NIL {
            self.slots.set_i32(head, NEXT_JOB_RESOURCE_OFFSET, slot);
        }
        slot
    }

    /// Remove `slot` from a job holding list, returning the new head
    pub fn unlink_job_resource(&mut self, head: i32, slot: i32) -> i32 {
        let prev = self.prev_job_resource(slot);
        let next = self.next_job_resource(slot);
        if prev != NIL {
            self.slots.set_i32(prev, NEXT_JOB_RESOURCE_OFFSET, next);
        }
        if next != NIL {
            self.slots.set_i32(next, PREV_JOB_RESOURCE_OFFSET, prev);
        }
        self.slots.set_i32(slot, PREV_JOB_RESOURCE_OFFSET, NIL);
        self.slots.set_i32(slot, NEXT_JOB_RESOURCE_OFFSET, NIL);
        if head == slot {
            prev
        } else {
            head
        }
    }

    /// Find the record for (dataset, entity) on a job holding list
    pub fn find_job_resource(&self, head: i32, dataset_id: DatasetId, entity_hash: i32) -> Option<i32> {
        let mut cur = head;
        while cur != NIL {
            if self.dataset_id(cur) == dataset_id && self.entity_hash(cur) == entity_hash {
                return Some(cur);
            }
            cur = self.prev_job_resource(cur);
        }
        None
    }

    pub fn occupied_slots(&self) -> usize {
        self.slots.occupied_slots()
    }

    pub fn slab_count(&self) -> usize {
        self.slots.slab_count()
    }

    pub fn pretty_print(&self) -> String {
        self.slots.pretty_print()
    }
}

/// Iterator over a holder list
pub struct ActorIter<'a> {
    table: &'a EntityInfoTable,
    cur: i32,
}

impl Iterator for ActorIter<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        if self.cur == NIL {
            return None;
        }
        let slot = self.cur;
        self.cur = self.table.prev_entity_actor(slot);
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EntityInfoTable {
        EntityInfoTable::new(4, Duration::ZERO)
    }

    #[test]
    fn test_allocate_initializes_record() {
        let mut t = table();
        let ei = t.allocate(JobId(3), DatasetId(7), 42);
        assert_eq!(t.job_id(ei), JobId(3));
        assert_eq!(t.dataset_id(ei), DatasetId(7));
        assert_eq!(t.entity_hash(ei), 42);
        assert_eq!(t.dataset_lock_mode(ei), LockMode::None);
        assert_eq!(t.entity_lock_count(ei), 0);
        assert_eq!(t.prev_entity_actor(ei), NIL);
        assert_eq!(t.next_job_resource(ei), NIL);
        assert!(t.is_unheld(ei));
    }

    #[test]
    fn test_holder_list_link_unlink() {
        let mut t = table();
        let a = t.allocate(JobId(1), DatasetId(1), 5);
        let b = t.allocate(JobId(2), DatasetId(1), 5);
        let c = t.allocate(JobId(3), DatasetId(1), 5);

        let mut head = NIL;
        head = t.link_actor(head, a);
        head = t.link_actor(head, b);
        head = t.link_actor(head, c);
        assert_eq!(t.actors(head).collect::<Vec<_>>(), vec![c, b, a]);
        assert_eq!(t.find_actor(head, JobId(2)), Some(b));

        // Middle
        head = t.unlink_actor(head, b);
        assert_eq!(t.actors(head).collect::<Vec<_>>(), vec![c, a]);
        // Head
        head = t.unlink_actor(head, c);
        assert_eq!(head, a);
        head = t.unlink_actor(head, a);
        assert_eq!(head, NIL);
        assert_eq!(t.find_actor(head, JobId(1)), None);
    }

    #[test]
    fn test_job_resource_list() {
        let mut t = table();
        let a = t.allocate(JobId(1), DatasetId(1), -1);
        let b = t.allocate(JobId(1), DatasetId(1), 9);
        let mut head = NIL;
        head = t.link_job_resource(head, a);
        head = t.link_job_resource(head, b);
        assert_eq!(t.find_job_resource(head, DatasetId(1), -1), Some(a));
        assert_eq!(t.find_job_resource(head, DatasetId(2), 9), None);
        head = t.unlink_job_resource(head, b);
        assert_eq!(head, a);
        assert_eq!(t.next_job_resource(a), NIL);
    }
}
