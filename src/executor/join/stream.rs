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

//! Pull-based tuple streams feeding the joiners
//!
//! A stream exposes one current tuple at a time. `load_tuple` makes a tuple
//! current if none is, `tuple` reads it and `consume` drops it. A producer
//! that has nothing yet answers [`TupleStatus::Unknown`]; the joiner then
//! returns and can be resumed later without losing state.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::Result;
use crate::storage::{Frame, RunFileReader};

/// Outcome of [`TupleStream::load_tuple`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleStatus {
    /// The stream is exhausted
    Empty,
    /// A tuple is current
    Loaded,
    /// No tuple yet; try again after the producer has made progress
    Unknown,
}

/// Source of sorted tuples for one join input
pub trait TupleStream: Send {
    fn load_tuple(&mut self) -> Result<TupleStatus>;

    /// Current tuple; only valid after `load_tuple` returned `Loaded`
    fn tuple(&self) -> &[u8];

    /// Drop the current tuple
    fn consume(&mut self);
}

/// Stream over tuples already in memory
#[derive(Debug, Default)]
pub struct VecTupleStream {
    tuples: Vec<Vec<u8>>,
    position: usize,
}

impl VecTupleStream {
    pub fn new(tuples: Vec<Vec<u8>>) -> Self {
        Self {
            tuples,
            position: 0,
        }
    }

    /// Tuples not consumed yet
    pub fn remaining(&self) -> usize {
        self.tuples.len() - self.position
    }
}

impl TupleStream for VecTupleStream {
    fn load_tuple(&mut self) -> Result<TupleStatus> {
        Ok(if self.position < self.tuples.len() {
            TupleStatus::Loaded
        } else {
            TupleStatus::Empty
        })
    }

    fn tuple(&self) -> &[u8] {
        self.tuples
            .get(self.position)
            .map_or(&[][..], |t| t.as_slice())
    }

    fn consume(&mut self) {
        self.position += 1;
    }
}

#[derive(Debug, Default)]
struct FrameQueueState {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Producer side of a [`FrameQueueStream`]
#[derive(Debug, Clone)]
pub struct FrameQueueProducer {
    state: Arc<Mutex<FrameQueueState>>,
}

impl FrameQueueProducer {
    /// Hand one frame of tuples to the consumer
    pub fn push(&self, frame: Frame) {
        self.state.lock().frames.push_back(frame);
    }

    /// Mark the end of the input
    pub fn close(&self) {
        self.state.lock().closed = true;
    }
}

/// Stream fed frame by frame by a producer; answers `Unknown` while the
/// queue is empty and the producer has not closed it
#[derive(Debug)]
pub struct FrameQueueStream {
    state: Arc<Mutex<FrameQueueState>>,
    current: Option<Frame>,
    index: usize,
}

impl FrameQueueStream {
    /// Connected producer and stream
    pub fn channel() -> (FrameQueueProducer, FrameQueueStream) {
        let state = Arc::new(Mutex::new(FrameQueueState::default()));
        (
            FrameQueueProducer {
                state: Arc::clone(&state),
            },
            FrameQueueStream {
                state,
                current: None,
                index: 0,
            },
        )
    }
}

impl TupleStream for FrameQueueStream {
    fn load_tuple(&mut self) -> Result<TupleStatus> {
        loop {
            if let Some(frame) = &self.current {
                if self.index < frame.tuple_count() {
                    return Ok(TupleStatus::Loaded);
                }
            }
            let mut state = self.state.lock();
            match state.frames.pop_front() {
                Some(frame) => {
                    self.current = Some(frame);
                    self.index = 0;
                }
                None if state.closed => return Ok(TupleStatus::Empty),
                None => return Ok(TupleStatus::Unknown),
            }
        }
    }

    fn tuple(&self) -> &[u8] {
        match &self.current {
            Some(frame) if self.index < frame.tuple_count() => frame.tuple(self.index),
            _ => &[],
        }
    }

    fn consume(&mut self) {
        self.index += 1;
    }
}

impl TupleStream for RunFileReader {
    fn load_tuple(&mut self) -> Result<TupleStatus> {
        Ok(match self.current()? {
            Some(_) => TupleStatus::Loaded,
            None => TupleStatus::Empty,
        })
    }

    fn tuple(&self) -> &[u8] {
        self.loaded()
    }

    fn consume(&mut self) {
        self.advance();
    }
}
