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

//! Slab-backed slot arrays of fixed-size records
//!
//! A [`SlotArrayManager`] hands out integer slots for records of one fixed
//! size. Records live in flat byte buffers (one buffer per slab, a
//! [`ChildArrayManager`]); a free record stores the index of the next free
//! record at offset 0, so the free list costs no memory beyond the records
//! themselves.
//!
//! # Slot numbering
//!
//! ```text
//! global_slot = slab_index * slots_per_slab + local_slot
//! ```
//!
//! # Growth and shrink
//!
//! Allocation fills the cursor slab first. When it is full the manager moves
//! to another initialized slab with free records, then to a deinitialized
//! slab (reinitializing its buffer), and only then appends a new slab.
//!
//! Shrinking is debounced: a deallocation that finds the table at or below
//! one third utilization starts a timer, and the shrink runs only once the
//! condition has held for the whole threshold. A shrink pass touches at most
//! half of the slabs, removing empty slabs at the tail and deinitializing the
//! first empty slab that is not part of the tail run.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::core::NIL;

/// Default number of records per slab
pub const DEFAULT_SLOTS_PER_SLAB: usize = 1024;

/// Offset of the next-free link inside a free record
const NEXT_FREE_SLOT_OFFSET: usize = 0;

/// Occupied count marking a slab whose buffer has been released
const DEINITIALIZED: i32 = -1;

/// Allocation ratio (capacity / occupied) at which shrinking is considered
const SHRINK_RATIO: usize = 3;

/// Record layout shared by every slab of a table
#[derive(Clone, Copy)]
pub struct RecordLayout {
    /// Record size in bytes, at least 4 to hold the free link
    pub record_size: usize,
    /// Writes the initial field values of a freshly allocated record
    pub init: fn(&mut [u8]),
}

impl std::fmt::Debug for RecordLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLayout")
            .field("record_size", &self.record_size)
            .finish()
    }
}

/// One slab: a byte buffer of `slots` records with an embedded free list
pub struct ChildArrayManager {
    buffer: Option<Box<[u8]>>,
    record_size: usize,
    slots: usize,
    free_slot: i32,
    occupied: i32,
}

impl ChildArrayManager {
    fn new(record_size: usize, slots: usize) -> Self {
        let mut child = Self {
            buffer: None,
            record_size,
            slots,
            free_slot: NIL,
            occupied: DEINITIALIZED,
        };
        child.initialize();
        child
    }

    /// Allocate the buffer and thread the free list through every record
    fn initialize(&mut self) {
        self.buffer = Some(vec![0u8; self.record_size * self.slots].into_boxed_slice());
        for slot in 0..self.slots {
            let next = if slot + 1 < self.slots {
                (slot + 1) as i32
            } else {
                NIL
            };
            self.set_next_free(slot, next);
        }
        self.free_slot = 0;
        self.occupied = 0;
    }

    /// Release the buffer; the slab stays as a placeholder
    fn deinitialize(&mut self) {
        self.buffer = None;
        self.free_slot = NIL;
        self.occupied = DEINITIALIZED;
    }

    fn allocate(&mut self, init: fn(&mut [u8])) -> usize {
        debug_assert!(!self.is_full() && !self.is_deinitialized());
        let slot = self.free_slot as usize;
        self.free_slot = self.next_free(slot);
        init(self.record_mut(slot));
        self.occupied += 1;
        slot
    }

    fn deallocate(&mut self, slot: usize) {
        debug_assert!(self.occupied > 0, "deallocate on an empty slab");
        self.set_next_free(slot, self.free_slot);
        self.free_slot = slot as i32;
        self.occupied -= 1;
    }

    #[inline]
    fn next_free(&self, slot: usize) -> i32 {
        read_i32(self.record(slot), NEXT_FREE_SLOT_OFFSET)
    }

    #[inline]
    fn set_next_free(&mut self, slot: usize, next: i32) {
        write_i32(self.record_mut(slot), NEXT_FREE_SLOT_OFFSET, next);
    }

    #[inline]
    fn record(&self, slot: usize) -> &[u8] {
        let start = slot * self.record_size;
        match &self.buffer {
            Some(buf) => &buf[start..start + self.record_size],
            None => panic!("access to slot {} of a deinitialized slab", slot),
        }
    }

    #[inline]
    fn record_mut(&mut self, slot: usize) -> &mut [u8] {
        let start = slot * self.record_size;
        let size = self.record_size;
        match &mut self.buffer {
            Some(buf) => &mut buf[start..start + size],
            None => panic!("access to slot {} of a deinitialized slab", slot),
        }
    }

    /// Whether every record is allocated
    pub fn is_full(&self) -> bool {
        self.occupied == self.slots as i32
    }

    /// Whether no record is allocated (and the buffer is live)
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Whether the buffer has been released
    pub fn is_deinitialized(&self) -> bool {
        self.occupied == DEINITIALIZED
    }

    /// Allocated records in this slab (0 when deinitialized)
    pub fn occupied(&self) -> usize {
        self.occupied.max(0) as usize
    }
}

/// Debounce timer for the shrink condition
#[derive(Debug)]
struct ShrinkTimer {
    threshold: Duration,
    started_at: Option<Instant>,
}

impl ShrinkTimer {
    /// Record one observation of the shrink condition
    ///
    /// Returns true when the condition has held continuously for the
    /// threshold; the timer is then reset.
    fn observe(&mut self, condition: bool, now: Instant) -> bool {
        if !condition {
            self.started_at = None;
            return false;
        }
        match self.started_at {
            Some(started) if now.saturating_duration_since(started) >= self.threshold => {
                self.started_at = None;
                true
            }
            Some(_) => false,
            None => {
                self.started_at = Some(now);
                false
            }
        }
    }
}

/// Growable, shrinkable table of fixed-size records addressed by slot
pub struct SlotArrayManager {
    name: &'static str,
    layout: RecordLayout,
    slots_per_slab: usize,
    slabs: Vec<ChildArrayManager>,
    alloc_cursor: usize,
    occupied: usize,
    shrink_timer: ShrinkTimer,
}

impl SlotArrayManager {
    /// Create a table with one initialized slab
    pub fn new(
        name: &'static str,
        layout: RecordLayout,
        slots_per_slab: usize,
        shrink_threshold: Duration,
    ) -> Self {
        assert!(layout.record_size >= 4, "record must hold the free link");
        assert!(slots_per_slab > 0, "slabs must hold at least one record");
        Self {
            name,
            layout,
            slots_per_slab,
            slabs: vec![ChildArrayManager::new(layout.record_size, slots_per_slab)],
            alloc_cursor: 0,
            occupied: 0,
            shrink_timer: ShrinkTimer {
                threshold: shrink_threshold,
                started_at: None,
            },
        }
    }

    /// Allocate a record and return its global slot
    pub fn allocate(&mut self) -> i32 {
        let cursor_usable = {
            let child = &self.slabs[self.alloc_cursor];
            !child.is_full() && !child.is_deinitialized()
        };
        if !cursor_usable {
            self.alloc_cursor = self.find_allocatable_slab();
        }
        let local = self.slabs[self.alloc_cursor].allocate(self.layout.init);
        self.occupied += 1;
        (self.alloc_cursor * self.slots_per_slab + local) as i32
    }

    fn find_allocatable_slab(&mut self) -> usize {
        if let Some(idx) = self
            .slabs
            .iter()
            .position(|c| !c.is_deinitialized() && !c.is_full())
        {
            return idx;
        }
        if let Some(idx) = self.slabs.iter().position(|c| c.is_deinitialized()) {
            self.slabs[idx].initialize();
            return idx;
        }
        self.slabs
            .push(ChildArrayManager::new(self.layout.record_size, self.slots_per_slab));
        self.slabs.len() - 1
    }

    /// Return a record to its slab
    pub fn deallocate(&mut self, slot: i32) {
        self.deallocate_at(slot, Instant::now());
    }

    /// Return a record to its slab, evaluating the shrink timer at `now`
    pub fn deallocate_at(&mut self, slot: i32, now: Instant) {
        let (slab, local) = self.locate(slot);
        self.slabs[slab].deallocate(local);
        self.occupied -= 1;
        if self.shrink_timer.observe(self.needs_shrink(), now) {
            self.shrink();
        }
    }

    fn needs_shrink(&self) -> bool {
        let size = self.slabs.len();
        let used = self.occupied.max(1);
        size > 1 && size * self.slots_per_slab / used >= SHRINK_RATIO
    }

    fn shrink(&mut self) {
        let before = self.slabs.len();
        let max_touched = before / 2;
        let mut touched = 0;

        // Contiguous empty or deinitialized slabs at the tail are removed.
        while touched < max_touched && self.slabs.len() > 1 {
            let tail = self.slabs.len() - 1;
            let child = &self.slabs[tail];
            if child.is_empty() || child.is_deinitialized() {
                self.slabs.pop();
                touched += 1;
            } else {
                break;
            }
        }

        // The first empty slab past the tail run is released in place.
        if touched < max_touched && self.initialized_slab_count() > 1 {
            if let Some(idx) = self.slabs.iter().rposition(|c| c.is_empty()) {
                self.slabs[idx].deinitialize();
                touched += 1;
            }
        }

        if self.alloc_cursor >= self.slabs.len() || self.slabs[self.alloc_cursor].is_deinitialized()
        {
            match self.slabs.iter().position(|c| !c.is_deinitialized()) {
                Some(idx) => self.alloc_cursor = idx,
                None => {
                    self.slabs[0].initialize();
                    self.alloc_cursor = 0;
                }
            }
        }

        debug!(
            table = self.name,
            slabs_before = before,
            slabs_after = self.slabs.len(),
            touched,
            occupied = self.occupied,
            "slot array shrunk"
        );
    }

    #[inline]
    fn locate(&self, slot: i32) -> (usize, usize) {
        debug_assert!(slot >= 0, "negative slot {}", slot);
        let slot = slot as usize;
        (slot / self.slots_per_slab, slot % self.slots_per_slab)
    }

    #[inline]
    fn record(&self, slot: i32) -> &[u8] {
        let (slab, local) = self.locate(slot);
        self.slabs[slab].record(local)
    }

    #[inline]
    fn record_mut(&mut self, slot: i32) -> &mut [u8] {
        let (slab, local) = self.locate(slot);
        self.slabs[slab].record_mut(local)
    }

    /// Read an i8-sized unsigned field
    #[inline]
    pub fn get_u8(&self, slot: i32, offset: usize) -> u8 {
        self.record(slot)[offset]
    }

    /// Write an unsigned byte field
    #[inline]
    pub fn set_u8(&mut self, slot: i32, offset: usize, value: u8) {
        self.record_mut(slot)[offset] = value;
    }

    /// Read an i16 field
    #[inline]
    pub fn get_i16(&self, slot: i32, offset: usize) -> i16 {
        let rec = self.record(slot);
        i16::from_le_bytes([rec[offset], rec[offset + 1]])
    }

    /// Write an i16 field
    #[inline]
    pub fn set_i16(&mut self, slot: i32, offset: usize, value: i16) {
        self.record_mut(slot)[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Read an i32 field
    #[inline]
    pub fn get_i32(&self, slot: i32, offset: usize) -> i32 {
        read_i32(self.record(slot), offset)
    }

    /// Write an i32 field
    #[inline]
    pub fn set_i32(&mut self, slot: i32, offset: usize, value: i32) {
        write_i32(self.record_mut(slot), offset, value);
    }

    /// Read an i64 field
    #[inline]
    pub fn get_i64(&self, slot: i32, offset: usize) -> i64 {
        let rec = self.record(slot);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&rec[offset..offset + 8]);
        i64::from_le_bytes(bytes)
    }

    /// Write an i64 field
    #[inline]
    pub fn set_i64(&mut self, slot: i32, offset: usize, value: i64) {
        self.record_mut(slot)[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Number of allocated records
    pub fn occupied_slots(&self) -> usize {
        self.occupied
    }

    /// Number of slabs, including deinitialized placeholders
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// Number of slabs with a live buffer
    pub fn initialized_slab_count(&self) -> usize {
        self.slabs.iter().filter(|c| !c.is_deinitialized()).count()
    }

    /// Records per slab
    pub fn slots_per_slab(&self) -> usize {
        self.slots_per_slab
    }

    /// Human-readable dump of slab occupancy
    pub fn pretty_print(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{}: {} occupied, {} slabs x {} slots, cursor {}",
            self.name,
            self.occupied,
            self.slabs.len(),
            self.slots_per_slab,
            self.alloc_cursor
        );
        for (idx, child) in self.slabs.iter().enumerate() {
            if child.is_deinitialized() {
                let _ = writeln!(out, "  [{}] deinitialized", idx);
            } else {
                let _ = writeln!(out, "  [{}] {}/{}", idx, child.occupied(), self.slots_per_slab);
            }
        }
        out
    }
}

#[inline]
fn read_i32(record: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        record[offset],
        record[offset + 1],
        record[offset + 2],
        record[offset + 3],
    ])
}

#[inline]
fn write_i32(record: &mut [u8], offset: usize, value: i32) {
    record[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
