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

//! Budgeted in-memory tuple store
//!
//! Tuples are appended into frames drawn from a fixed budget of minimum
//! frames and addressed by [`TuplePointer`]. A frame goes back to the budget
//! once every tuple in it has been removed.

use super::frame::{min_frames_for_tuple, Frame};
use crate::core::{Error, Result};

/// Address of a tuple held in [`TupleMemory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TuplePointer {
    pub frame_id: u32,
    pub tuple_index: u32,
}

struct MemoryFrame {
    frame: Frame,
    live: usize,
}

/// Frame pool with deletable tuples
pub struct TupleMemory {
    min_frame_size: usize,
    budget_min_frames: usize,
    used_min_frames: usize,
    frames: Vec<Option<MemoryFrame>>,
    free_ids: Vec<usize>,
    current: Option<usize>,
    live_tuples: usize,
}

impl std::fmt::Debug for TupleMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TupleMemory")
            .field("budget_min_frames", &self.budget_min_frames)
            .field("used_min_frames", &self.used_min_frames)
            .field("live_tuples", &self.live_tuples)
            .finish()
    }
}

impl TupleMemory {
    pub fn new(min_frame_size: usize, budget_min_frames: usize) -> Self {
        Self {
            min_frame_size,
            budget_min_frames,
            used_min_frames: 0,
            frames: Vec::new(),
            free_ids: Vec::new(),
            current: None,
            live_tuples: 0,
        }
    }

    /// Store a copy of `tuple`
    ///
    /// Returns `Ok(None)` when the budget is exhausted, and
    /// [`Error::TupleTooLarge`] when the tuple could never fit in the budget.
    pub fn insert(&mut self, tuple: &[u8]) -> Result<Option<TuplePointer>> {
        if let Some(id) = self.current {
            if let Some(ptr) = self.append_to(id, tuple) {
                return Ok(Some(ptr));
            }
        }

        let needed = min_frames_for_tuple(tuple.len(), self.min_frame_size);
        if needed > self.budget_min_frames {
            return Err(Error::TupleTooLarge {
                size: tuple.len(),
                capacity: self.budget_bytes(),
            });
        }
        // An emptied current frame goes back before the budget check
        if let Some(old) = self.current {
            if self.frames[old].as_ref().is_some_and(|f| f.live == 0) {
                self.current = None;
                self.release(old);
            }
        }
        if self.used_min_frames + needed > self.budget_min_frames {
            return Ok(None);
        }
        self.current = None;

        let memory_frame = MemoryFrame {
            frame: Frame::with_min_frames(self.min_frame_size, needed),
            live: 0,
        };
        let id = match self.free_ids.pop() {
            Some(id) => {
                self.frames[id] = Some(memory_frame);
                id
            }
            None => {
                self.frames.push(Some(memory_frame));
                self.frames.len() - 1
            }
        };
        self.used_min_frames += needed;
        self.current = Some(id);
        self.append_to(id, tuple)
            .map(Some)
            .ok_or_else(|| Error::internal("tuple does not fit a freshly sized frame"))
    }

    fn append_to(&mut self, id: usize, tuple: &[u8]) -> Option<TuplePointer> {
        let slot = self.frames[id].as_mut()?;
        if !slot.frame.append(tuple) {
            return None;
        }
        slot.live += 1;
        self.live_tuples += 1;
        Some(TuplePointer {
            frame_id: id as u32,
            tuple_index: (slot.frame.tuple_count() - 1) as u32,
        })
    }

    /// Bytes of a live tuple
    pub fn get(&self, ptr: TuplePointer) -> &[u8] {
        match &self.frames[ptr.frame_id as usize] {
            Some(slot) => slot.frame.tuple(ptr.tuple_index as usize),
            None => &[],
        }
    }

    /// Drop a tuple; its frame is returned to the budget when it empties
    pub fn remove(&mut self, ptr: TuplePointer) {
        let id = ptr.frame_id as usize;
        let Some(slot) = self.frames[id].as_mut() else {
            return;
        };
        debug_assert!(slot.live > 0);
        slot.live -= 1;
        self.live_tuples -= 1;
        if slot.live > 0 {
            return;
        }
        if self.current == Some(id) {
            slot.frame.reset();
        } else {
            self.release(id);
        }
    }

    fn release(&mut self, id: usize) {
        if let Some(slot) = self.frames[id].take() {
            self.used_min_frames -= slot.frame.num_min_frames();
            self.free_ids.push(id);
        }
    }

    /// Drop every tuple and frame
    pub fn clear(&mut self) {
        self.frames.clear();
        self.free_ids.clear();
        self.current = None;
        self.used_min_frames = 0;
        self.live_tuples = 0;
    }

    /// Live tuples
    #[inline]
    pub fn len(&self) -> usize {
        self.live_tuples
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live_tuples == 0
    }

    #[inline]
    pub fn min_frame_size(&self) -> usize {
        self.min_frame_size
    }

    /// Minimum frames currently taken from the budget
    #[inline]
    pub fn used_min_frames(&self) -> usize {
        self.used_min_frames
    }

    #[inline]
    pub fn budget_bytes(&self) -> usize {
        self.budget_min_frames * self.min_frame_size
    }
}
