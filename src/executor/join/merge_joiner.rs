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

//! Sort-merge joiner with a bounded active set
//!
//! Right tuples are loaded into memory while the checker says the current
//! left tuple may need them, and dropped once the checker says no later left
//! tuple can match them. When memory is full the joiner freezes: later left
//! tuples are still compared against the frozen active set and appended to a
//! run file. Once the active set drains, or the left input ends, the joiner
//! unfreezes, clears memory and replays the spilled left tuples against the
//! right tuples that were never loaded.
//!
//! The left input is therefore a queue of sources: spilled run-file segments
//! in front of the live left stream. Every pair is compared exactly once and
//! the result equals the nested-loop join for any memory budget.

use std::collections::VecDeque;
use std::path::PathBuf;

use tracing::debug;

use super::active_set::{ActiveSet, ScanActiveSet};
use super::checker::MergeJoinChecker;
use super::output::ResultAppender;
use super::stats::JoinStats;
use super::stream::{TupleStatus, TupleStream};
use crate::core::{Error, Result};
use crate::storage::{JoinConfig, RunFile, RunFileReader, RunFilePointer, TupleMemory, TuplePointer};

/// Input side of a join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Result of driving a joiner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    /// Every result has been appended and flushed
    Finished,
    /// The named input answered `Unknown`; call again once it has data
    Blocked(Side),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeftSource {
    /// Spilled left tuples from `from` up to byte offset `end`
    Run { from: RunFilePointer, end: u64 },
    /// The left input stream
    Stream,
}

/// Merge joiner over two sorted streams
pub struct MergeJoiner<C: MergeJoinChecker, A: ActiveSet<C> = ScanActiveSet> {
    checker: C,
    active: A,
    memory: TupleMemory,
    left: Box<dyn TupleStream>,
    right: Box<dyn TupleStream>,
    right_done: bool,

    spill_dir: PathBuf,
    min_frame_size: usize,
    run_file: Option<RunFile>,
    sources: VecDeque<LeftSource>,
    reader: Option<RunFileReader>,
    frozen: bool,
    freeze_start: RunFilePointer,

    left_buf: Vec<u8>,
    candidates: Vec<TuplePointer>,
    stats: JoinStats,
    finished: bool,
}

impl<C: MergeJoinChecker, A: ActiveSet<C>> std::fmt::Debug for MergeJoiner<C, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeJoiner")
            .field("active", &self.active.len())
            .field("frozen", &self.frozen)
            .field("sources", &self.sources)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<C: MergeJoinChecker, A: ActiveSet<C> + Default> MergeJoiner<C, A> {
    pub fn new(
        config: &JoinConfig,
        checker: C,
        left: impl TupleStream + 'static,
        right: impl TupleStream + 'static,
    ) -> Result<Self> {
        Self::with_active_set(config, checker, A::default(), left, right)
    }
}

impl<C: MergeJoinChecker, A: ActiveSet<C>> MergeJoiner<C, A> {
    pub fn with_active_set(
        config: &JoinConfig,
        checker: C,
        active: A,
        left: impl TupleStream + 'static,
        right: impl TupleStream + 'static,
    ) -> Result<Self> {
        Self::from_boxed(config, checker, active, Box::new(left), Box::new(right))
    }

    pub(crate) fn from_boxed(
        config: &JoinConfig,
        checker: C,
        active: A,
        left: Box<dyn TupleStream>,
        right: Box<dyn TupleStream>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            checker,
            active,
            memory: TupleMemory::new(config.min_frame_size, config.memory_frames),
            left,
            right,
            right_done: false,
            spill_dir: config.spill_dir(),
            min_frame_size: config.min_frame_size,
            run_file: None,
            sources: VecDeque::from([LeftSource::Stream]),
            reader: None,
            frozen: false,
            freeze_start: RunFilePointer::default(),
            left_buf: Vec::new(),
            candidates: Vec::new(),
            stats: JoinStats::new(),
            finished: false,
        })
    }

    pub fn checker(&self) -> &C {
        &self.checker
    }

    /// Whether the joiner is currently spilling left tuples
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Right tuples held in memory
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn stats(&self) -> JoinStats {
        let mut stats = self.stats;
        if let Some(run) = &self.run_file {
            stats.frames_written = run.frames_written();
        }
        if let Some(reader) = &self.reader {
            stats.frames_read += reader.frames_read();
        }
        stats
    }

    /// Drive the join until it finishes or an input blocks
    ///
    /// Results are appended to `output`, which is flushed on completion.
    /// After `Blocked` the call can be repeated and picks up where it stopped.
    pub fn join(&mut self, output: &mut ResultAppender) -> Result<JoinStatus> {
        if self.finished {
            return Ok(JoinStatus::Finished);
        }
        loop {
            if self.right_done && !self.frozen && self.active.is_empty() {
                // Nothing left that any remaining left tuple could match
                return self.finish(output);
            }
            match self.load_left()? {
                TupleStatus::Unknown => return Ok(JoinStatus::Blocked(Side::Left)),
                TupleStatus::Empty => {
                    if self.frozen {
                        self.unfreeze()?;
                        continue;
                    }
                    return self.finish(output);
                }
                TupleStatus::Loaded => {}
            }

            let left = std::mem::take(&mut self.left_buf);
            let outcome = self.process_left(&left, output);
            self.left_buf = left;
            if let Some(side) = outcome? {
                return Ok(JoinStatus::Blocked(side));
            }
            self.consume_left();

            if self.frozen && self.active.is_empty() {
                self.unfreeze()?;
            }
        }
    }

    fn finish(&mut self, output: &mut ResultAppender) -> Result<JoinStatus> {
        output.flush()?;
        let stats = self.stats();
        self.stats = stats;
        self.reader = None;
        self.run_file = None;
        self.active.clear();
        self.memory.clear();
        self.finished = true;
        debug!(%stats, "merge join finished");
        Ok(JoinStatus::Finished)
    }

    /// Make the next left tuple current in `left_buf`
    fn load_left(&mut self) -> Result<TupleStatus> {
        loop {
            match self.sources.front().copied() {
                None => return Ok(TupleStatus::Empty),
                Some(LeftSource::Stream) => {
                    let status = self.left.load_tuple()?;
                    match status {
                        TupleStatus::Loaded => {
                            self.left_buf.clear();
                            self.left_buf.extend_from_slice(self.left.tuple());
                        }
                        TupleStatus::Empty => {
                            self.sources.pop_front();
                            continue;
                        }
                        TupleStatus::Unknown => {}
                    }
                    return Ok(status);
                }
                Some(LeftSource::Run { from, end }) => {
                    if self.reader.is_none() {
                        let reader = self.run_file()?.reader_between(from, end)?;
                        self.reader = Some(reader);
                    }
                    let Some(reader) = self.reader.as_mut() else {
                        return Err(Error::internal("left run reader missing"));
                    };
                    let loaded = match reader.current()? {
                        Some(tuple) => {
                            self.left_buf.clear();
                            self.left_buf.extend_from_slice(tuple);
                            true
                        }
                        None => false,
                    };
                    if loaded {
                        return Ok(TupleStatus::Loaded);
                    }
                    self.end_run_segment()?;
                }
            }
        }
    }

    fn end_run_segment(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            self.stats.frames_read += reader.frames_read();
        }
        self.sources.pop_front();
        let replaying = self
            .sources
            .iter()
            .any(|s| matches!(s, LeftSource::Run { .. }));
        if !replaying && !self.frozen {
            if let Some(run) = self.run_file.as_mut() {
                if !run.is_empty() {
                    run.truncate()?;
                }
            }
        }
        Ok(())
    }

    fn consume_left(&mut self) {
        match self.sources.front() {
            Some(LeftSource::Stream) => self.left.consume(),
            Some(LeftSource::Run { .. }) => {
                if let Some(reader) = self.reader.as_mut() {
                    reader.advance();
                }
            }
            None => {}
        }
    }

    /// Join one left tuple; `Some(side)` if an input blocked first
    fn process_left(&mut self, left: &[u8], output: &mut ResultAppender) -> Result<Option<Side>> {
        self.active.expire(&self.checker, &mut self.memory, left);

        if !self.frozen {
            while !self.right_done {
                match self.right.load_tuple()? {
                    TupleStatus::Unknown => return Ok(Some(Side::Right)),
                    TupleStatus::Empty => self.right_done = true,
                    TupleStatus::Loaded => {
                        let right = self.right.tuple();
                        if !self.checker.check_to_load_next_right_tuple(left, right) {
                            break;
                        }
                        match self.memory.insert(right)? {
                            Some(ptr) => {
                                self.active.insert(&self.checker, right, ptr);
                                self.right.consume();
                            }
                            None => {
                                self.freeze()?;
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.candidates.clear();
        self.active
            .candidates(&self.checker, left, &mut self.candidates);
        for &ptr in &self.candidates {
            let right = self.memory.get(ptr);
            self.stats.comparisons += 1;
            if self.checker.check_to_save_in_result(left, right) {
                output.append(left, right)?;
                self.stats.tuples_emitted += 1;
            }
        }

        if self.frozen {
            self.run_file()?.append(left)?;
            self.stats.tuples_spilled += 1;
        }
        Ok(None)
    }

    fn run_file(&mut self) -> Result<&mut RunFile> {
        if self.run_file.is_none() {
            let run = RunFile::create(&self.spill_dir, "merge-join", self.min_frame_size)?;
            self.run_file = Some(run);
        }
        self.run_file
            .as_mut()
            .ok_or_else(|| Error::internal("merge join run file missing"))
    }

    fn freeze(&mut self) -> Result<()> {
        let run = self.run_file()?;
        run.flush()?;
        let start = run.write_pointer();
        self.freeze_start = start;
        self.frozen = true;
        self.stats.spills += 1;
        debug!(
            active = self.active.len(),
            memory = self.memory.used_min_frames(),
            "merge join memory full, freezing"
        );
        Ok(())
    }

    fn unfreeze(&mut self) -> Result<()> {
        let run = self.run_file()?;
        run.flush()?;
        let end = run.write_offset();

        // The rest of a segment being replayed goes after the new one
        if let Some(reader) = self.reader.take() {
            self.stats.frames_read += reader.frames_read();
            if let Some(front) = self.sources.front_mut() {
                *front = LeftSource::Run {
                    from: reader.pointer(),
                    end: reader.end_offset(),
                };
            }
        }
        self.sources.push_front(LeftSource::Run {
            from: self.freeze_start,
            end,
        });

        self.active.clear();
        self.memory.clear();
        self.frozen = false;
        debug!(
            from = self.freeze_start.file_offset,
            end, "merge join unfreezing, replaying spilled left tuples"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::join::checker::EquiMergeJoinChecker;
    use crate::executor::join::output::TupleCollector;
    use crate::executor::join::stream::{FrameQueueStream, VecTupleStream};
    use crate::storage::Frame;

    fn keyed(key: i64, tag: u8) -> Vec<u8> {
        let mut t = key.to_le_bytes().to_vec();
        t.push(tag);
        t
    }

    fn nested_loop(left: &[Vec<u8>], right: &[Vec<u8>]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for l in left {
            for r in right {
                if l[..8] == r[..8] {
                    let mut t = l.clone();
                    t.extend_from_slice(r);
                    out.push(t);
                }
            }
        }
        out.sort();
        out
    }

    fn run(config: &JoinConfig, left: Vec<Vec<u8>>, right: Vec<Vec<u8>>) -> (Vec<Vec<u8>>, JoinStats) {
        let collector = TupleCollector::new();
        let mut output = ResultAppender::new(config.min_frame_size, collector.clone());
        let mut joiner: MergeJoiner<_> = MergeJoiner::new(
            config,
            EquiMergeJoinChecker::new(0, 0),
            VecTupleStream::new(left),
            VecTupleStream::new(right),
        )
        .unwrap();
        assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Finished);
        let mut tuples = collector.tuples();
        tuples.sort();
        (tuples, joiner.stats())
    }

    #[test]
    fn test_equi_join_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let config = JoinConfig::new()
            .with_min_frame_size(256)
            .with_memory_frames(4)
            .with_spill_dir(dir.path());
        let left = vec![keyed(1, 0), keyed(2, 1), keyed(2, 2), keyed(5, 3)];
        let right = vec![keyed(2, 10), keyed(2, 11), keyed(3, 12), keyed(5, 13)];
        let (got, stats) = run(&config, left.clone(), right.clone());
        assert_eq!(got, nested_loop(&left, &right));
        assert_eq!(got.len(), 5);
        assert_eq!(stats.spills, 0);
    }

    #[test]
    fn test_freeze_on_large_duplicate_group() {
        let dir = tempfile::tempdir().unwrap();
        // One 64-byte frame holds four 9-byte tuples
        let config = JoinConfig::new()
            .with_min_frame_size(64)
            .with_memory_frames(1)
            .with_spill_dir(dir.path());
        let left: Vec<_> = (0..6).map(|i| keyed(7, i)).chain([keyed(8, 50)]).collect();
        let right: Vec<_> = (0..10).map(|i| keyed(7, 100 + i)).chain([keyed(8, 200)]).collect();
        let (got, stats) = run(&config, left.clone(), right.clone());
        assert_eq!(got.len(), 6 * 10 + 1);
        assert_eq!(got, nested_loop(&left, &right));
        assert!(stats.spills >= 2);
        assert!(stats.tuples_spilled > 0);
        // Run files are removed once the joiner finishes
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_inputs() {
        let config = JoinConfig::new().with_min_frame_size(64);
        let (got, _) = run(&config, vec![], vec![keyed(1, 0)]);
        assert!(got.is_empty());
        let (got, _) = run(&config, vec![keyed(1, 0)], vec![]);
        assert!(got.is_empty());
    }

    #[test]
    fn test_resumes_after_blocked_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = JoinConfig::new()
            .with_min_frame_size(64)
            .with_memory_frames(2)
            .with_spill_dir(dir.path());
        let (left_tx, left) = FrameQueueStream::channel();
        let (right_tx, right) = FrameQueueStream::channel();
        let collector = TupleCollector::new();
        let mut output = ResultAppender::new(64, collector.clone());
        let mut joiner: MergeJoiner<_> =
            MergeJoiner::new(&config, EquiMergeJoinChecker::new(0, 0), left, right).unwrap();

        assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Blocked(Side::Left));

        let mut frame = Frame::new(64);
        frame.append(&keyed(1, 0));
        frame.append(&keyed(2, 1));
        left_tx.push(frame);
        left_tx.close();
        assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Blocked(Side::Right));

        let mut frame = Frame::new(64);
        frame.append(&keyed(1, 10));
        right_tx.push(frame);
        assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Blocked(Side::Right));

        let mut frame = Frame::new(64);
        frame.append(&keyed(2, 11));
        frame.append(&keyed(3, 12));
        right_tx.push(frame);
        right_tx.close();
        assert_eq!(joiner.join(&mut output).unwrap(), JoinStatus::Finished);
        assert!(joiner.is_finished());

        let mut got = collector.tuples();
        got.sort();
        let mut expected = vec![
            [keyed(1, 0), keyed(1, 10)].concat(),
            [keyed(2, 1), keyed(2, 11)].concat(),
        ];
        expected.sort();
        assert_eq!(got, expected);
    }
}
