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

//! Parked lock requests
//!
//! A waiter record stands for every thread of one job parked on one resource
//! in one mode. Threads of the same job that ask for the same resource while a
//! waiter exists join it and bump `waiter_count`; all of them park on the
//! waiter's [`WaiterMonitor`].
//!
//! Waiters sit on two intrusive lists: the resource queue (`next_waiter`,
//! singly linked, FIFO) and the job's waiting list
//! (`prev/next_waiting_resource`).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::common::{RecordLayout, SlotArrayManager};
use crate::core::{LockMode, NIL};

const ENTITY_INFO_OFFSET: usize = 0;
const NEXT_WAITER_OFFSET: usize = 4;
const NEXT_WAITING_RESOURCE_OFFSET: usize = 8;
const PREV_WAITING_RESOURCE_OFFSET: usize = 12;
const WAITER_COUNT_OFFSET: usize = 16;
const FLAGS_OFFSET: usize = 20;
const LOCK_MODE_OFFSET: usize = 21;
const BEGIN_WAIT_TIME_OFFSET: usize = 24;

/// Record size in bytes
pub const LOCK_WAITER_SIZE: usize = 32;

/// Still parked; cleared by a wakeup pass
pub const FLAG_WAIT: u8 = 0x01;
/// Must abort when it gets up
pub const FLAG_VICTIM: u8 = 0x02;
/// Cohort bookkeeping already applied by an earlier thread
pub const FLAG_FIRST_GET_UP: u8 = 0x04;
/// Queued on an upgrader list
pub const FLAG_UPGRADER: u8 = 0x08;
/// Queued on an entity lock rather than the dataset
pub const FLAG_ENTITY_LEVEL: u8 = 0x10;

fn init_lock_waiter(record: &mut [u8]) {
    record.fill(0);
    for offset in [
        ENTITY_INFO_OFFSET,
        NEXT_WAITER_OFFSET,
        NEXT_WAITING_RESOURCE_OFFSET,
        PREV_WAITING_RESOURCE_OFFSET,
    ] {
        record[offset..offset + 4].copy_from_slice(&NIL.to_le_bytes());
    }
}

const LAYOUT: RecordLayout = RecordLayout {
    record_size: LOCK_WAITER_SIZE,
    init: init_lock_waiter,
};

/// Wait/notify latch for one waiter record
///
/// The `signaled` flag is set under the monitor mutex, so a signal sent
/// between the table latch being dropped and the thread parking is not lost.
#[derive(Debug, Default)]
pub struct WaiterMonitor {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl WaiterMonitor {
    /// Wake every thread parked on this monitor
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_all();
    }

    /// Park until signalled
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
    }

    /// Whether a signal has been delivered
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }
}

/// Slab table of waiter records with their monitors
pub struct LockWaiterTable {
    slots: SlotArrayManager,
    monitors: FxHashMap<i32, Arc<WaiterMonitor>>,
}

impl LockWaiterTable {
    pub fn new(slots_per_slab: usize, shrink_threshold: Duration) -> Self {
        Self {
            slots: SlotArrayManager::new("LockWaiter", LAYOUT, slots_per_slab, shrink_threshold),
            monitors: FxHashMap::default(),
        }
    }

    /// Allocate a parked waiter for one thread
    pub fn allocate(
        &mut self,
        entity_info: i32,
        mode: LockMode,
        flags: u8,
        begin_wait_ms: i64,
    ) -> i32 {
        let slot = self.slots.allocate();
        self.slots.set_i32(slot, ENTITY_INFO_OFFSET, entity_info);
        self.slots.set_u8(slot, LOCK_MODE_OFFSET, mode.as_u8());
        self.slots.set_u8(slot, FLAGS_OFFSET, flags | FLAG_WAIT);
        self.slots.set_i32(slot, WAITER_COUNT_OFFSET, 1);
        self.slots.set_i64(slot, BEGIN_WAIT_TIME_OFFSET, begin_wait_ms);
        self.monitors.insert(slot, Arc::new(WaiterMonitor::default()));
        slot
    }

    pub fn deallocate(&mut self, slot: i32) {
        self.monitors.remove(&slot);
        self.slots.deallocate(slot);
    }

    /// Monitor the threads of `slot` park on
    pub fn monitor(&self, slot: i32) -> Option<Arc<WaiterMonitor>> {
        self.monitors.get(&slot).cloned()
    }

    /// Signal the monitor of `slot`
    pub fn signal(&self, slot: i32) {
        if let Some(monitor) = self.monitors.get(&slot) {
            monitor.signal();
        }
    }

    #[inline]
    pub fn entity_info(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, ENTITY_INFO_OFFSET)
    }

    #[inline]
    pub fn next_waiter(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, NEXT_WAITER_OFFSET)
    }

    #[inline]
    pub fn next_waiting_resource(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, NEXT_WAITING_RESOURCE_OFFSET)
    }

    #[inline]
    pub fn prev_waiting_resource(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, PREV_WAITING_RESOURCE_OFFSET)
    }

    #[inline]
    pub fn waiter_count(&self, slot: i32) -> i32 {
        self.slots.get_i32(slot, WAITER_COUNT_OFFSET)
    }

    #[inline]
    pub fn set_waiter_count(&mut self, slot: i32, count: i32) {
        self.slots.set_i32(slot, WAITER_COUNT_OFFSET, count);
    }

    #[inline]
    pub fn lock_mode(&self, slot: i32) -> LockMode {
        LockMode::from_u8(self.slots.get_u8(slot, LOCK_MODE_OFFSET))
    }

    #[inline]
    pub fn begin_wait_ms(&self, slot: i32) -> i64 {
        self.slots.get_i64(slot, BEGIN_WAIT_TIME_OFFSET)
    }

    #[inline]
    pub fn has_flag(&self, slot: i32, flag: u8) -> bool {
        self.slots.get_u8(slot, FLAGS_OFFSET) & flag != 0
    }

    #[inline]
    pub fn set_flag(&mut self, slot: i32, flag: u8, on: bool) {
        let flags = self.slots.get_u8(slot, FLAGS_OFFSET);
        let flags = if on { flags | flag } else { flags & !flag };
        self.slots.set_u8(slot, FLAGS_OFFSET, flags);
    }

    // =========================================================================
    // Resource queues (FIFO, singly linked)
    // =========================================================================

    /// Append `slot` at the tail of a queue, returning the head
    pub fn enqueue(&mut self, head: i32, slot: i32) -> i32 {
        self.slots.set_i32(slot, NEXT_WAITER_OFFSET, NIL);
        if head == NIL {
            return slot;
        }
        let mut cur = head;
        loop {
            let next = self.next_waiter(cur);
            if next == NIL {
                break;
            }
            cur = next;
        }
        self.slots.set_i32(cur, NEXT_WAITER_OFFSET, slot);
        head
    }

    /// Remove `slot` from a queue, returning the head
    pub fn dequeue(&mut self, head: i32, slot: i32) -> i32 {
        let next = self.next_waiter(slot);
        self.slots.set_i32(slot, NEXT_WAITER_OFFSET, NIL);
        if head == slot {
            return next;
        }
        let mut cur = head;
        while cur != NIL {
            let cur_next = self.next_waiter(cur);
            if cur_next == slot {
                self.slots.set_i32(cur, NEXT_WAITER_OFFSET, next);
                break;
            }
            cur = cur_next;
        }
        head
    }

    /// Iterate a queue from its head
    pub fn queue(&self, head: i32) -> QueueIter<'_> {
        QueueIter {
            table: self,
            cur: head,
        }
    }

    // =========================================================================
    // Job waiting lists
    // =========================================================================

    /// Push `slot` onto a job waiting list, returning the new head
    pub fn link_waiting_resource(&mut self, head: i32, slot: i32) -> i32 {
        self.slots.set_i32(slot, PREV_WAITING_RESOURCE_OFFSET, NIL);
        self.slots.set_i32(slot, NEXT_WAITING_RESOURCE_OFFSET, head);
        if head != NIL {
            self.slots.set_i32(head, PREV_WAITING_RESOURCE_OFFSET, slot);
        }
        slot
    }

    /// Remove `slot` from a job waiting list, returning the new head
    pub fn unlink_waiting_resource(&mut self, head: i32, slot: i32) -> i32 {
        let prev = self.prev_waiting_resource(slot);
        let next = self.next_waiting_resource(slot);
        if prev != NIL {
            self.slots.set_i32(prev, NEXT_WAITING_RESOURCE_OFFSET, next);
        }
        if next != NIL {
            self.slots.set_i32(next, PREV_WAITING_RESOURCE_OFFSET, prev);
        }
        self.slots.set_i32(slot, PREV_WAITING_RESOURCE_OFFSET, NIL);
        self.slots.set_i32(slot, NEXT_WAITING_RESOURCE_OFFSET, NIL);
        if head == slot {
            next
        } else {
            head
        }
    }

    /// Iterate a job waiting list from its head
    pub fn waiting_resources(&self, head: i32) -> WaitingIter<'_> {
        WaitingIter {
            table: self,
            cur: head,
        }
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

/// Iterator over a resource queue
pub struct QueueIter<'a> {
    table: &'a LockWaiterTable,
    cur: i32,
}

impl Iterator for QueueIter<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        if self.cur == NIL {
            return None;
        }
        let slot = self.cur;
        self.cur = self.table.next_waiter(slot);
        Some(slot)
    }
}

/// Iterator over a job waiting list
pub struct WaitingIter<'a> {
    table: &'a LockWaiterTable,
    cur: i32,
}

impl Iterator for WaitingIter<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        if self.cur == NIL {
            return None;
        }
        let slot = self.cur;
        self.cur = self.table.next_waiting_resource(slot);
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LockWaiterTable {
        LockWaiterTable::new(4, Duration::ZERO)
    }

    #[test]
    fn test_allocate_sets_fields() {
        let mut t = table();
        let w = t.allocate(11, LockMode::Exclusive, FLAG_UPGRADER, 1234);
        assert_eq!(t.entity_info(w), 11);
        assert_eq!(t.lock_mode(w), LockMode::Exclusive);
        assert_eq!(t.waiter_count(w), 1);
        assert_eq!(t.begin_wait_ms(w), 1234);
        assert!(t.has_flag(w, FLAG_WAIT));
        assert!(t.has_flag(w, FLAG_UPGRADER));
        assert!(!t.has_flag(w, FLAG_VICTIM));
        assert!(t.monitor(w).is_some());

        t.set_flag(w, FLAG_WAIT, false);
        assert!(!t.has_flag(w, FLAG_WAIT));
        t.deallocate(w);
        assert!(t.monitor(w).is_none());
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut t = table();
        let a = t.allocate(1, LockMode::Shared, 0, 0);
        let b = t.allocate(2, LockMode::Shared, 0, 0);
        let c = t.allocate(3, LockMode::Shared, 0, 0);
        let mut head = NIL;
        head = t.enqueue(head, a);
        head = t.enqueue(head, b);
        head = t.enqueue(head, c);
        assert_eq!(t.queue(head).collect::<Vec<_>>(), vec![a, b, c]);

        head = t.dequeue(head, b);
        assert_eq!(t.queue(head).collect::<Vec<_>>(), vec![a, c]);
        head = t.dequeue(head, a);
        assert_eq!(head, c);
        head = t.dequeue(head, c);
        assert_eq!(head, NIL);
    }

    #[test]
    fn test_waiting_list() {
        let mut t = table();
        let a = t.allocate(1, LockMode::Shared, 0, 0);
        let b = t.allocate(2, LockMode::Shared, 0, 0);
        let mut head = NIL;
        head = t.link_waiting_resource(head, a);
        head = t.link_waiting_resource(head, b);
        assert_eq!(t.waiting_resources(head).collect::<Vec<_>>(), vec![b, a]);
        head = t.unlink_waiting_resource(head, b);
        assert_eq!(head, a);
        head = t.unlink_waiting_resource(head, a);
        assert_eq!(head, NIL);
    }

    #[test]
    fn test_monitor_signal_before_wait() {
        let monitor = WaiterMonitor::default();
        monitor.signal();
        // Returns immediately: the flag was set before parking
        monitor.wait();
        assert!(monitor.is_signaled());
    }

    #[test]
    fn test_monitor_cross_thread() {
        let monitor = Arc::new(WaiterMonitor::default());
        let m = Arc::clone(&monitor);
        let handle = std::thread::spawn(move || m.wait());
        std::thread::sleep(Duration::from_millis(20));
        monitor.signal();
        handle.join().unwrap();
    }
}
