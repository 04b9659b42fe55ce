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

//! Join checkers drive the merge joiner
//!
//! Both inputs arrive sorted on the checker's sort key. The remove and load
//! decisions must be monotonic in that order: once a right tuple is removed
//! for one left tuple it can match no later left tuple, and once a right
//! tuple is not loaded for a left tuple no later right tuple would be either.

use super::interval_logic::read_i64;

/// Join predicate plus the sweep decisions the merge joiner needs
pub trait MergeJoinChecker: Send {
    /// Whether the pair belongs in the result
    fn check_to_save_in_result(&self, left: &[u8], right: &[u8]) -> bool;

    /// Whether an in-memory right tuple can match neither `left` nor any
    /// left tuple after it
    fn check_to_remove_in_memory(&self, left: &[u8], right: &[u8]) -> bool;

    /// Whether the next unloaded right tuple may match `left`, so it has to
    /// be in memory before `left` is probed
    fn check_to_load_next_right_tuple(&self, left: &[u8], right: &[u8]) -> bool;
}

/// Equality on one little-endian i64 key per side
#[derive(Debug, Clone, Copy)]
pub struct EquiMergeJoinChecker {
    left_key_offset: usize,
    right_key_offset: usize,
}

impl EquiMergeJoinChecker {
    pub fn new(left_key_offset: usize, right_key_offset: usize) -> Self {
        Self {
            left_key_offset,
            right_key_offset,
        }
    }

    #[inline]
    fn keys(&self, left: &[u8], right: &[u8]) -> (i64, i64) {
        (
            read_i64(left, self.left_key_offset),
            read_i64(right, self.right_key_offset),
        )
    }
}

impl MergeJoinChecker for EquiMergeJoinChecker {
    fn check_to_save_in_result(&self, left: &[u8], right: &[u8]) -> bool {
        let (l, r) = self.keys(left, right);
        l == r
    }

    fn check_to_remove_in_memory(&self, left: &[u8], right: &[u8]) -> bool {
        let (l, r) = self.keys(left, right);
        r < l
    }

    fn check_to_load_next_right_tuple(&self, left: &[u8], right: &[u8]) -> bool {
        let (l, r) = self.keys(left, right);
        r <= l
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: i64) -> Vec<u8> {
        k.to_le_bytes().to_vec()
    }

    #[test]
    fn test_equi_checker() {
        let c = EquiMergeJoinChecker::new(0, 0);
        assert!(c.check_to_save_in_result(&key(3), &key(3)));
        assert!(!c.check_to_save_in_result(&key(3), &key(4)));
        assert!(c.check_to_remove_in_memory(&key(3), &key(2)));
        assert!(!c.check_to_remove_in_memory(&key(3), &key(3)));
        assert!(c.check_to_load_next_right_tuple(&key(3), &key(3)));
        assert!(!c.check_to_load_next_right_tuple(&key(3), &key(4)));
    }
}
