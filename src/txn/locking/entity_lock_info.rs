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

//! Per-entity lock state
//!
//! | offset | field          |
//! |--------|----------------|
//! | 0      | x_count (i16)  |
//! | 2      | s_count (i16)  |
//! | 4      | last_holder    |
//! | 8      | first_waiter   |
//! | 12     | upgrader       |
//!
//! Links are entity info slots (`last_holder`) or lock waiter slots
//! (`first_waiter`, `upgrader`), `-1` when empty.

use std::time::Duration;

use crate::common::{RecordLayout, SlotArrayManager};
use crate::core::{LockMode, NIL};

const X_COUNT_OFFSET: usize = 0;
const S_COUNT_OFFSET: usize = 2;
const LAST_HOLDER_OFFSET: usize = 4;
const FIRST_WAITER_OFFSET: usize = 8;
const UPGRADER_OFFSET: usize = 12;

/// Record size in bytes
pub const ENTITY_LOCK_INFO_SIZE: usize = 16;

fn init_entity_lock_info(record: &mut [u8]) {
    record[X_COUNT_OFFSET..X_COUNT_OFFSET + 2].fill(0);
    record[S_COUNT_OFFSET..S_COUNT_OFFSET + 2].fill(0);
    for offset in [LAST_HOLDER_OFFSET, FIRST_WAITER_OFFSET, UPGRADER_OFFSET] {
        record[offset..offset + 4].copy_from_slice(&NIL.to_le_bytes());
    }
}

const LAYOUT: RecordLayout = RecordLayout {
    record_size: ENTITY_LOCK_INFO_SIZE,
    init: init_entity_lock_info,
};

/// Slab table of entity lock info records
pub struct EntityLockInfoTable {
    slots: SlotArrayManager,
}

impl EntityLockInfoTable {
    pub fn new(slots_per_slab: usize, shrink_threshold: Duration) -> Self {
        Self {
            slots: SlotArrayManager::new(
                "EntityLockInfo",
                LAYOUT,
                slots_per_slab,
                shrink_threshold,
            ),
        }
    }

    pub fn allocate(&mut self) -> i32 {
        self.slots.allocate()
    }

    pub fn deallocate(&mut self, slot: i32) {
        debug_assert!(self.is_unused(slot), "deallocating a live entity lock");
        self.slots.deallocate(slot);
    }

    #[inline]
    pub fn x_count(&self, slot: i32) -> i16 {
        self.slots.get_i16(slot, X_COUNT_OFFSET)
    }

    #[inline]
    pub fn set_x_count(&mut self, slot: i32, count: i16) {
        self.slots.set_i16(slot, X_COUNT_OFFSET, count);
    }

    #[inline]
    pub fn s_count(&self, slot: i32) -> i16 {
        self.slots.get_i16(slot, S_COUNT_OFFSET)
    }

    #[inline]
    pub fn set_s_count(&mut self, slot: i32, count: i16) {
        self.slots.set_i16(slot, S_COUNT_OFFSET, count);
    }

    #[inline]
    pub fn last_holder(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, LAST_HOLDER_OFFSET)
    }

    #[inline]
    pub fn set_last_holder(&mut self, slot: i32, holder: i32) {
        self.slots.set_i32(slot, LAST_HOLDER_OFFSET, holder);
    }

    #[inline]
    pub fn first_waiter(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, FIRST_WAITER_OFFSET)
    }

    #[inline]
    pub fn set_first_waiter(&mut self, slot: i32, waiter: i32) {
        self.slots.set_i32(slot, FIRST_WAITER_OFFSET, waiter);
    }

    #[inline]
    pub fn upgrader(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, UPGRADER_OFFSET)
    }

    #[inline]
    pub fn set_upgrader(&mut self, slot: i32, waiter: i32) {
        self.slots.set_i32(slot, UPGRADER_OFFSET, waiter);
    }

    /// Held count for an entity mode
    #[inline]
    pub fn count(&self, slot: i32, mode: LockMode) -> i16 {
        match mode {
            LockMode::Shared => self.s_count(slot),
            LockMode::Exclusive => self.x_count(slot),
            _ => 0,
        }
    }

    /// Add `delta` acquisitions of an entity mode
    pub fn add_count(&mut self, slot: i32, mode: LockMode, delta: i16) {
        match mode {
            LockMode::Shared => {
                let c = self.s_count(slot) + delta;
                debug_assert!(c >= 0);
                self.set_s_count(slot, c);
            }
            LockMode::Exclusive => {
                let c = self.x_count(slot) + delta;
                debug_assert!(c >= 0);
                self.set_x_count(slot, c);
            }
            other => debug_assert!(false, "{} is not an entity lock mode", other),
        }
    }

    /// Whether `mode` can be granted when `own` acquisitions of `own_mode`
    /// belong to the requester
    pub fn is_compatible(&self, slot: i32, mode: LockMode, own_mode: LockMode, own: i16) -> bool {
        let mut x = self.x_count(slot);
        let mut s = self.s_count(slot);
        match own_mode {
            LockMode::Exclusive => x -= own,
            LockMode::Shared => s -= own,
            _ => {}
        }
        (x == 0 || mode.is_compatible_with(LockMode::Exclusive))
            && (s == 0 || mode.is_compatible_with(LockMode::Shared))
    }

    /// Whether nothing references the record any more
    pub fn is_unused(&self, slot: i32) -> bool {
        self.x_count(slot) == 0
            && self.s_count(slot) == 0
            && self.last_holder(slot) == NIL
            && self.first_waiter(slot) == NIL
            && self.upgrader(slot) == NIL
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
