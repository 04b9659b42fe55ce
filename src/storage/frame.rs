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

//! Fixed-size tuple frames
//!
//! A frame is a byte buffer whose length is a multiple of the minimum frame
//! size. Layout:
//!
//! ```text
//! +--------+----------------------+------ free ------+-----------+-------+
//! | n: u32 | tuple 0 | tuple 1 ...|                  | end1 end0 | count |
//! +--------+----------------------+------------------+-----------+-------+
//! ```
//!
//! `n` is the number of minimum frames the frame spans, so a reader can size
//! the rest of the read from the first four bytes. Tuple end offsets grow
//! down from the tail, in front of the tuple count.

use crate::core::{Error, Result};

/// Bytes in front of the tuple data
pub const FRAME_HEADER_SIZE: usize = 4;

/// Bytes of the tuple count at the tail
pub const FRAME_TAIL_SIZE: usize = 4;

/// Bytes per entry of the end offset table
const OFFSET_ENTRY_SIZE: usize = 4;

/// Write the minimum-frame count into a frame header
#[inline]
pub fn serialize_num_of_min_frame(buf: &mut [u8], num_min_frames: u32) {
    buf[..FRAME_HEADER_SIZE].copy_from_slice(&num_min_frames.to_le_bytes());
}

/// Read the minimum-frame count from a frame header
#[inline]
pub fn deserialize_num_of_min_frame(buf: &[u8]) -> u32 {
    let mut bytes = [0u8; FRAME_HEADER_SIZE];
    bytes.copy_from_slice(&buf[..FRAME_HEADER_SIZE]);
    u32::from_le_bytes(bytes)
}

/// Minimum frames needed by a frame that holds one tuple of `tuple_len` bytes
pub fn min_frames_for_tuple(tuple_len: usize, min_frame_size: usize) -> usize {
    let needed = FRAME_HEADER_SIZE + tuple_len + OFFSET_ENTRY_SIZE + FRAME_TAIL_SIZE;
    needed.div_ceil(min_frame_size)
}

/// Tuple frame with an append cursor
#[derive(Clone)]
pub struct Frame {
    buf: Vec<u8>,
    min_frame_size: usize,
    data_end: usize,
    count: usize,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("size", &self.buf.len())
            .field("tuples", &self.count)
            .field("data_end", &self.data_end)
            .finish()
    }
}

impl Frame {
    /// Empty frame of one minimum frame
    pub fn new(min_frame_size: usize) -> Self {
        Self::with_min_frames(min_frame_size, 1)
    }

    /// Empty frame spanning `num_min_frames` minimum frames
    pub fn with_min_frames(min_frame_size: usize, num_min_frames: usize) -> Self {
        let mut frame = Self {
            buf: vec![0; min_frame_size * num_min_frames.max(1)],
            min_frame_size,
            data_end: FRAME_HEADER_SIZE,
            count: 0,
        };
        frame.write_header();
        frame.write_count();
        frame
    }

    /// Frame over bytes read back from a run file
    pub fn from_bytes(buf: Vec<u8>, min_frame_size: usize) -> Result<Self> {
        if buf.len() < min_frame_size || buf.len() % min_frame_size != 0 {
            return Err(Error::corrupt_frame(format!(
                "frame of {} bytes is not a multiple of {}",
                buf.len(),
                min_frame_size
            )));
        }
        let declared = deserialize_num_of_min_frame(&buf) as usize;
        if declared * min_frame_size != buf.len() {
            return Err(Error::corrupt_frame(format!(
                "header declares {} minimum frames for {} bytes",
                declared,
                buf.len()
            )));
        }
        let mut frame = Self {
            buf,
            min_frame_size,
            data_end: FRAME_HEADER_SIZE,
            count: 0,
        };
        let count = frame.read_i32(frame.buf.len() - FRAME_TAIL_SIZE);
        let table_start = frame
            .buf
            .len()
            .checked_sub(FRAME_TAIL_SIZE + OFFSET_ENTRY_SIZE * count.max(0) as usize);
        let Some(table_start) = table_start.filter(|_| count >= 0) else {
            return Err(Error::corrupt_frame(format!("bad tuple count {}", count)));
        };
        frame.count = count as usize;

        let mut prev = FRAME_HEADER_SIZE;
        for i in 0..frame.count {
            let end = frame.read_i32(frame.offset_slot(i));
            if end < prev as i32 || end as usize > table_start {
                return Err(Error::corrupt_frame(format!(
                    "tuple {} ends at {} outside {}..{}",
                    i, end, prev, table_start
                )));
            }
            prev = end as usize;
        }
        frame.data_end = prev;
        Ok(frame)
    }

    #[inline]
    pub fn min_frame_size(&self) -> usize {
        self.min_frame_size
    }

    /// Number of minimum frames this frame spans
    #[inline]
    pub fn num_min_frames(&self) -> usize {
        self.buf.len() / self.min_frame_size
    }

    /// Size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn tuple_count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Serialized frame, valid after every append
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Start offset of tuple `index`
    pub fn tuple_start(&self, index: usize) -> usize {
        if index == 0 {
            FRAME_HEADER_SIZE
        } else {
            self.tuple_end(index - 1)
        }
    }

    /// End offset (exclusive) of tuple `index`
    pub fn tuple_end(&self, index: usize) -> usize {
        self.read_i32(self.offset_slot(index)) as usize
    }

    /// Bytes of tuple `index`
    pub fn tuple(&self, index: usize) -> &[u8] {
        &self.buf[self.tuple_start(index)..self.tuple_end(index)]
    }

    pub fn tuples(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.count).map(move |i| self.tuple(i))
    }

    /// Whether a tuple of `len` bytes fits in the remaining space
    pub fn can_fit(&self, len: usize) -> bool {
        let table = FRAME_TAIL_SIZE + OFFSET_ENTRY_SIZE * (self.count + 1);
        self.data_end + len + table <= self.buf.len()
    }

    /// Append one tuple; false when it does not fit
    pub fn append(&mut self, tuple: &[u8]) -> bool {
        self.append_parts(&[tuple])
    }

    /// Append the concatenation of `left` and `right` as one tuple
    pub fn append_concat(&mut self, left: &[u8], right: &[u8]) -> bool {
        self.append_parts(&[left, right])
    }

    fn append_parts(&mut self, parts: &[&[u8]]) -> bool {
        let len: usize = parts.iter().map(|p| p.len()).sum();
        if !self.can_fit(len) {
            return false;
        }
        let mut at = self.data_end;
        for part in parts {
            self.buf[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        }
        self.data_end = at;
        self.count += 1;
        let slot = self.offset_slot(self.count - 1);
        self.write_i32(slot, at as i32);
        self.write_count();
        true
    }

    /// Drop all tuples, keeping the size
    pub fn reset(&mut self) {
        self.data_end = FRAME_HEADER_SIZE;
        self.count = 0;
        self.write_count();
    }

    /// Drop all tuples and resize to fit a tuple of `tuple_len` bytes, or back
    /// to one minimum frame when it already fits there
    pub fn reset_for(&mut self, tuple_len: usize) {
        let frames = min_frames_for_tuple(tuple_len, self.min_frame_size);
        if frames != self.num_min_frames() {
            self.buf = vec![0; frames * self.min_frame_size];
            self.write_header();
        }
        self.reset();
    }

    #[inline]
    fn offset_slot(&self, index: usize) -> usize {
        self.buf.len() - FRAME_TAIL_SIZE - OFFSET_ENTRY_SIZE * (index + 1)
    }

    fn write_header(&mut self) {
        let n = self.num_min_frames() as u32;
        serialize_num_of_min_frame(&mut self.buf, n);
    }

    fn write_count(&mut self) {
        let at = self.buf.len() - FRAME_TAIL_SIZE;
        self.write_i32(at, self.count as i32);
    }

    #[inline]
    fn read_i32(&self, at: usize) -> i32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[at..at + 4]);
        i32::from_le_bytes(bytes)
    }

    #[inline]
    fn write_i32(&mut self, at: usize, value: i32) {
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_back() {
        let mut frame = Frame::new(64);
        assert!(frame.append(b"hello"));
        assert!(frame.append(b""));
        assert!(frame.append_concat(b"ab", b"cd"));
        assert_eq!(frame.tuple_count(), 3);
        assert_eq!(frame.tuple(0), b"hello");
        assert_eq!(frame.tuple(1), b"");
        assert_eq!(frame.tuple(2), b"abcd");

        let copy = Frame::from_bytes(frame.as_bytes().to_vec(), 64).unwrap();
        assert_eq!(copy.tuples().collect::<Vec<_>>(), vec![&b"hello"[..], b"", b"abcd"]);
    }

    #[test]
    fn test_frame_full() {
        let mut frame = Frame::new(64);
        // 64 - header 4 - tail 4 = 56 bytes; each tuple takes 10 + 4
        for _ in 0..4 {
            assert!(frame.append(&[7u8; 10]));
        }
        assert!(!frame.append(&[7u8; 10]));
        frame.reset();
        assert!(frame.is_empty());
        assert!(frame.append(&[7u8; 10]));
    }

    #[test]
    fn test_large_tuple_spans_min_frames() {
        let mut frame = Frame::new(64);
        assert!(!frame.append(&[1u8; 100]));
        frame.reset_for(100);
        assert_eq!(frame.num_min_frames(), 2);
        assert_eq!(deserialize_num_of_min_frame(frame.as_bytes()), 2);
        assert!(frame.append(&[1u8; 100]));
        frame.reset_for(10);
        assert_eq!(frame.num_min_frames(), 1);
    }

    #[test]
    fn test_min_frames_for_tuple() {
        assert_eq!(min_frames_for_tuple(0, 64), 1);
        assert_eq!(min_frames_for_tuple(52, 64), 1);
        assert_eq!(min_frames_for_tuple(53, 64), 2);
    }

    #[test]
    fn test_corrupt_frames_rejected() {
        assert!(Frame::from_bytes(vec![0; 63], 64).is_err());
        let mut bytes = Frame::new(64).as_bytes().to_vec();
        serialize_num_of_min_frame(&mut bytes, 3);
        assert!(matches!(
            Frame::from_bytes(bytes, 64),
            Err(Error::CorruptFrame(_))
        ));

        let mut frame = Frame::new(64);
        frame.append(b"abc");
        let mut bytes = frame.as_bytes().to_vec();
        // Point tuple 0 past the offset table
        let slot = 64 - FRAME_TAIL_SIZE - 4;
        bytes[slot..slot + 4].copy_from_slice(&60i32.to_le_bytes());
        assert!(Frame::from_bytes(bytes, 64).is_err());
    }
}
