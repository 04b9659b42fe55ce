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

//! Join output: result tuples packed into frames and pushed downstream

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{Error, Result};
use crate::storage::Frame;

/// Downstream consumer of result frames
pub trait FrameWriter: Send {
    /// Take one full frame; the frame is reused after the call returns
    fn next_frame(&mut self, frame: &Frame) -> Result<()>;
}

/// Packs concatenated left and right tuples into frames
pub struct ResultAppender {
    frame: Frame,
    writer: Box<dyn FrameWriter>,
    tuples: u64,
    frames: u64,
}

impl std::fmt::Debug for ResultAppender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultAppender")
            .field("buffered", &self.frame.tuple_count())
            .field("tuples", &self.tuples)
            .field("frames", &self.frames)
            .finish()
    }
}

impl ResultAppender {
    pub fn new(min_frame_size: usize, writer: impl FrameWriter + 'static) -> Self {
        Self {
            frame: Frame::new(min_frame_size),
            writer: Box::new(writer),
            tuples: 0,
            frames: 0,
        }
    }

    /// Append `left ++ right` as one result tuple
    pub fn append(&mut self, left: &[u8], right: &[u8]) -> Result<()> {
        if !self.frame.append_concat(left, right) {
            self.flush()?;
            self.frame.reset_for(left.len() + right.len());
            if !self.frame.append_concat(left, right) {
                return Err(Error::internal("result tuple does not fit a resized frame"));
            }
        }
        self.tuples += 1;
        Ok(())
    }

    /// Hand the buffered frame to the writer
    pub fn flush(&mut self) -> Result<()> {
        if self.frame.is_empty() {
            return Ok(());
        }
        self.writer.next_frame(&self.frame)?;
        self.frames += 1;
        self.frame.reset_for(0);
        Ok(())
    }

    /// Result tuples appended so far
    #[inline]
    pub fn tuples_appended(&self) -> u64 {
        self.tuples
    }

    /// Frames handed to the writer so far
    #[inline]
    pub fn frames_flushed(&self) -> u64 {
        self.frames
    }
}

/// Writer that keeps every result tuple; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct TupleCollector {
    tuples: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl TupleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the collected tuples
    pub fn tuples(&self) -> Vec<Vec<u8>> {
        self.tuples.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.tuples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.lock().is_empty()
    }
}

impl FrameWriter for TupleCollector {
    fn next_frame(&mut self, frame: &Frame) -> Result<()> {
        self.tuples
            .lock()
            .extend(frame.tuples().map(|t| t.to_vec()));
        Ok(())
    }
}

/// Writer that only counts
#[derive(Debug, Clone, Default)]
pub struct CountingWriter {
    tuples: Arc<Mutex<u64>>,
}

impl CountingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        *self.tuples.lock()
    }
}

impl FrameWriter for CountingWriter {
    fn next_frame(&mut self, frame: &Frame) -> Result<()> {
        *self.tuples.lock() += frame.tuple_count() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appender_flushes_full_frames() {
        let collector = TupleCollector::new();
        let mut appender = ResultAppender::new(64, collector.clone());
        for i in 0u8..10 {
            appender.append(&[i; 4], &[i; 4]).unwrap();
        }
        // 64-byte frames hold four 8-byte results
        assert_eq!(collector.len(), 8);
        appender.flush().unwrap();
        assert_eq!(collector.len(), 10);
        assert_eq!(appender.tuples_appended(), 10);
        assert_eq!(appender.frames_flushed(), 3);
        assert_eq!(collector.tuples()[9], vec![9u8; 8]);
    }

    #[test]
    fn test_appender_big_result() {
        let counter = CountingWriter::new();
        let mut appender = ResultAppender::new(64, counter.clone());
        appender.append(&[1; 10], &[2; 10]).unwrap();
        appender.append(&[1; 100], &[2; 100]).unwrap();
        appender.append(&[1; 10], &[2; 10]).unwrap();
        appender.flush().unwrap();
        assert_eq!(counter.count(), 3);
    }
}
