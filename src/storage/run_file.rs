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

//! Run files: append-only scratch files of frames
//!
//! A [`RunFile`] buffers appended tuples in one frame and writes whole frames
//! at the end of the file. Readers open their own handle and walk frames
//! between two byte offsets; positions are exposed as [`RunFilePointer`]s so
//! a reader can be reopened exactly where another stopped.
//!
//! The file is removed when the [`RunFile`] is dropped. A failed removal is
//! logged and otherwise ignored.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use super::frame::{deserialize_num_of_min_frame, Frame, FRAME_HEADER_SIZE};
use crate::core::{Error, Result};

static RUN_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Position of one tuple in a run file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct RunFilePointer {
    /// Byte offset of the frame holding the tuple
    pub file_offset: u64,
    /// Index of the tuple within that frame
    pub tuple_index: usize,
}

impl RunFilePointer {
    pub fn new(file_offset: u64, tuple_index: usize) -> Self {
        Self {
            file_offset,
            tuple_index,
        }
    }
}

/// Append-only run file with a one-frame write buffer
pub struct RunFile {
    path: PathBuf,
    file: File,
    frame: Frame,
    write_offset: u64,
    frames_written: u64,
    tuples_written: u64,
}

impl std::fmt::Debug for RunFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunFile")
            .field("path", &self.path)
            .field("write_offset", &self.write_offset)
            .field("buffered", &self.frame.tuple_count())
            .finish()
    }
}

impl RunFile {
    /// Create a new, uniquely named run file in `dir`
    pub fn create(dir: &Path, prefix: &str, min_frame_size: usize) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let seq = RUN_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("{}-{}-{}.run", prefix, std::process::id(), seq));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| Error::io(format!("failed to create run file {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "created run file");
        Ok(Self {
            path,
            file,
            frame: Frame::new(min_frame_size),
            write_offset: 0,
            frames_written: 0,
            tuples_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn min_frame_size(&self) -> usize {
        self.frame.min_frame_size()
    }

    /// Buffer one tuple, writing the current frame out when it is full
    pub fn append(&mut self, tuple: &[u8]) -> Result<()> {
        if self.frame.append(tuple) {
            self.tuples_written += 1;
            return Ok(());
        }
        self.flush()?;
        self.frame.reset_for(tuple.len());
        if !self.frame.append(tuple) {
            return Err(Error::internal(format!(
                "tuple of {} bytes does not fit a resized frame",
                tuple.len()
            )));
        }
        self.tuples_written += 1;
        Ok(())
    }

    /// Write the buffered frame, if it holds any tuple
    pub fn flush(&mut self) -> Result<()> {
        if self.frame.is_empty() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(self.write_offset))?;
        self.file.write_all(self.frame.as_bytes())?;
        self.write_offset += self.frame.size() as u64;
        self.frames_written += 1;
        self.frame.reset_for(0);
        Ok(())
    }

    /// End of the flushed data
    #[inline]
    pub fn write_offset(&self) -> u64 {
        self.write_offset
    }

    /// Pointer to the first tuple written after the last flush
    #[inline]
    pub fn write_pointer(&self) -> RunFilePointer {
        RunFilePointer::new(self.write_offset, 0)
    }

    /// Tuples appended since creation or the last truncate
    #[inline]
    pub fn tuple_count(&self) -> u64 {
        self.tuples_written
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tuples_written == 0
    }

    #[inline]
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Discard all contents
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.write_offset = 0;
        self.tuples_written = 0;
        self.frame.reset_for(0);
        Ok(())
    }

    /// Flush and open a reader over the whole file
    pub fn reader(&mut self) -> Result<RunFileReader> {
        self.flush()?;
        RunFileReader::open(
            &self.path,
            RunFilePointer::default(),
            self.write_offset,
            self.min_frame_size(),
        )
    }

    /// Flush and open a reader from `from` up to the byte offset `end`
    pub fn reader_between(&mut self, from: RunFilePointer, end: u64) -> Result<RunFileReader> {
        self.flush()?;
        RunFileReader::open(&self.path, from, end, self.min_frame_size())
    }
}

impl Drop for RunFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to delete run file");
        }
    }
}

/// Sequential tuple reader over a byte range of a run file
pub struct RunFileReader {
    file: BufReader<File>,
    min_frame_size: usize,
    frame: Option<Frame>,
    frame_offset: u64,
    next_offset: u64,
    end_offset: u64,
    tuple_index: usize,
    frames_read: u64,
}

impl RunFileReader {
    /// Open `path` positioned at `from`; reading stops at byte offset `end`
    pub fn open(path: &Path, from: RunFilePointer, end: u64, min_frame_size: usize) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::io(format!("failed to open run file {}: {}", path.display(), e)))?;
        let mut reader = Self {
            file: BufReader::new(file),
            min_frame_size,
            frame: None,
            frame_offset: from.file_offset,
            next_offset: from.file_offset,
            end_offset: end,
            tuple_index: 0,
            frames_read: 0,
        };
        if from.file_offset < end {
            reader.file.seek(SeekFrom::Start(from.file_offset))?;
            reader.read_frame()?;
            reader.tuple_index = from.tuple_index;
        }
        Ok(reader)
    }

    fn read_frame(&mut self) -> Result<()> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.file.read_exact(&mut header)?;
        let n = deserialize_num_of_min_frame(&header) as usize;
        if n == 0 {
            return Err(Error::corrupt_frame(format!(
                "zero-length frame at offset {}",
                self.next_offset
            )));
        }
        let size = n * self.min_frame_size;
        let mut buf = vec![0u8; size];
        buf[..FRAME_HEADER_SIZE].copy_from_slice(&header);
        self.file.read_exact(&mut buf[FRAME_HEADER_SIZE..])?;

        self.frame_offset = self.next_offset;
        self.next_offset += size as u64;
        self.frame = Some(Frame::from_bytes(buf, self.min_frame_size)?);
        self.tuple_index = 0;
        self.frames_read += 1;
        Ok(())
    }

    /// Current tuple, reading the next frame when the loaded one is used up;
    /// `None` at the end of the range
    pub fn current(&mut self) -> Result<Option<&[u8]>> {
        loop {
            let in_frame = self
                .frame
                .as_ref()
                .is_some_and(|f| self.tuple_index < f.tuple_count());
            if in_frame {
                break;
            }
            if self.next_offset >= self.end_offset {
                return Ok(None);
            }
            self.read_frame()?;
        }
        Ok(self.frame.as_ref().map(|f| f.tuple(self.tuple_index)))
    }

    /// Current tuple without reading; valid after `current` returned a tuple
    pub fn loaded(&self) -> &[u8] {
        match &self.frame {
            Some(frame) if self.tuple_index < frame.tuple_count() => frame.tuple(self.tuple_index),
            _ => &[],
        }
    }

    /// Move past the current tuple
    #[inline]
    pub fn advance(&mut self) {
        self.tuple_index += 1;
    }

    /// Position of the current tuple
    pub fn pointer(&self) -> RunFilePointer {
        match &self.frame {
            Some(frame) if self.tuple_index < frame.tuple_count() => {
                RunFilePointer::new(self.frame_offset, self.tuple_index)
            }
            _ => RunFilePointer::new(self.next_offset, 0),
        }
    }

    #[inline]
    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    #[inline]
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}
