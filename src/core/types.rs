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

//! Identifier and lock mode types shared across the crate

use std::fmt;

/// Entity hash value that marks a dataset-granule request
pub const DATASET_GRANULE: i32 = -1;

/// Sentinel for "no slot" in every intrusive list
pub const NIL: i32 = -1;

/// Job (transaction) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub i32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dataset identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId(pub i32);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lock modes for both granules
///
/// Entity-granule requests use `Shared` and `Exclusive` only. The dataset
/// granule additionally carries the intention modes derived from entity
/// requests beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum LockMode {
    /// No lock held
    #[default]
    None = 0,
    /// Intention shared (IS)
    IntentionShared = 1,
    /// Intention exclusive (IX)
    IntentionExclusive = 2,
    /// Shared (S)
    Shared = 3,
    /// Exclusive (X)
    Exclusive = 4,
}

impl LockMode {
    /// Decode from the byte stored in slab records
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => LockMode::IntentionShared,
            2 => LockMode::IntentionExclusive,
            3 => LockMode::Shared,
            4 => LockMode::Exclusive,
            _ => LockMode::None,
        }
    }

    /// Encode for slab records
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Dataset-level intention mode implied by an entity-level request
    #[inline]
    pub fn intention(self) -> LockMode {
        match self {
            LockMode::Shared | LockMode::IntentionShared => LockMode::IntentionShared,
            LockMode::Exclusive | LockMode::IntentionExclusive => LockMode::IntentionExclusive,
            LockMode::None => LockMode::None,
        }
    }

    /// Whether a request in `self` can be granted next to a holder in `held`
    pub fn is_compatible_with(self, held: LockMode) -> bool {
        use LockMode::*;
        match (self, held) {
            (None, _) | (_, None) => true,
            (IntentionShared, Exclusive) => false,
            (IntentionShared, _) => true,
            (IntentionExclusive, IntentionShared | IntentionExclusive) => true,
            (IntentionExclusive, _) => false,
            (Shared, IntentionShared | Shared) => true,
            (Shared, _) => false,
            (Exclusive, _) => false,
        }
    }

    /// Whether moving from `held` to `self` strengthens the lock
    ///
    /// Only S→X and IS→IX escalations are upgrades; every other pair with an
    /// existing holding is treated as a duplicate of the held mode.
    #[inline]
    pub fn is_upgrade_from(self, held: LockMode) -> bool {
        matches!(
            (held, self),
            (LockMode::Shared, LockMode::Exclusive)
                | (LockMode::IntentionShared, LockMode::IntentionExclusive)
        )
    }

    /// Whether holding `self` already grants everything `requested` grants
    ///
    /// A covered request needs no new compatibility check: any holder
    /// compatible with `self` is compatible with `requested`.
    pub fn covers(self, requested: LockMode) -> bool {
        use LockMode::*;
        match (self, requested) {
            (_, None) => true,
            (Exclusive, _) => true,
            (Shared, Shared | IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive | IntentionShared) => true,
            (IntentionShared, IntentionShared) => true,
            _ => false,
        }
    }

    /// Weakest mode that covers both `self` and `other`
    pub fn join(self, other: LockMode) -> LockMode {
        if self.covers(other) {
            self
        } else if other.covers(self) {
            other
        } else {
            // S with IX has no common mode below X
            LockMode::Exclusive
        }
    }

    /// Short name used in diagnostics
    pub fn short_name(self) -> &'static str {
        match self {
            LockMode::None => "NL",
            LockMode::IntentionShared => "IS",
            LockMode::IntentionExclusive => "IX",
            LockMode::Shared => "S",
            LockMode::Exclusive => "X",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_mode_roundtrip() {
        for mode in [
            LockMode::None,
            LockMode::IntentionShared,
            LockMode::IntentionExclusive,
            LockMode::Shared,
            LockMode::Exclusive,
        ] {
            assert_eq!(LockMode::from_u8(mode.as_u8()), mode);
        }
        assert_eq!(LockMode::from_u8(200), LockMode::None);
    }

    #[test]
    fn test_compatibility_matrix() {
        use LockMode::*;
        // X excludes everything
        for held in [IntentionShared, IntentionExclusive, Shared, Exclusive] {
            assert!(!Exclusive.is_compatible_with(held));
        }
        assert!(Shared.is_compatible_with(Shared));
        assert!(Shared.is_compatible_with(IntentionShared));
        assert!(!Shared.is_compatible_with(IntentionExclusive));
        assert!(IntentionExclusive.is_compatible_with(IntentionExclusive));
        assert!(!IntentionExclusive.is_compatible_with(Shared));
        assert!(IntentionShared.is_compatible_with(IntentionExclusive));
        assert!(!IntentionShared.is_compatible_with(Exclusive));
    }

    #[test]
    fn test_compatibility_is_symmetric() {
        use LockMode::*;
        let modes = [IntentionShared, IntentionExclusive, Shared, Exclusive];
        for a in modes {
            for b in modes {
                assert_eq!(a.is_compatible_with(b), b.is_compatible_with(a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_intention_and_upgrade() {
        assert_eq!(LockMode::Shared.intention(), LockMode::IntentionShared);
        assert_eq!(LockMode::Exclusive.intention(), LockMode::IntentionExclusive);
        assert!(LockMode::Exclusive.is_upgrade_from(LockMode::Shared));
        assert!(LockMode::IntentionExclusive.is_upgrade_from(LockMode::IntentionShared));
        assert!(!LockMode::Shared.is_upgrade_from(LockMode::Exclusive));
        assert!(!LockMode::Shared.is_upgrade_from(LockMode::Shared));
    }

    #[test]
    fn test_join() {
        use LockMode::*;
        assert_eq!(Shared.join(Exclusive), Exclusive);
        assert_eq!(IntentionShared.join(IntentionExclusive), IntentionExclusive);
        assert_eq!(IntentionShared.join(Shared), Shared);
        assert_eq!(Shared.join(IntentionExclusive), Exclusive);
        assert_eq!(None.join(Shared), Shared);
        assert_eq!(Shared.join(Shared), Shared);
    }

    #[test]
    fn test_covers() {
        use LockMode::*;
        assert!(Exclusive.covers(Shared));
        assert!(Exclusive.covers(IntentionExclusive));
        assert!(Shared.covers(IntentionShared));
        assert!(!Shared.covers(IntentionExclusive));
        assert!(IntentionExclusive.covers(IntentionShared));
        assert!(!IntentionExclusive.covers(Shared));
        assert!(!IntentionShared.covers(IntentionExclusive));
        // Covering implies every mode compatible with the holder is
        // compatible with the covered request
        let modes = [IntentionShared, IntentionExclusive, Shared, Exclusive];
        for held in modes {
            for req in modes {
                if !held.covers(req) {
                    continue;
                }
                for other in modes {
                    if other.is_compatible_with(held) {
                        assert!(other.is_compatible_with(req), "{held} {req} {other}");
                    }
                }
            }
        }
    }
}
