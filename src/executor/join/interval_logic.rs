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

//! Allen-style interval predicates over half-open `[start, end)` intervals

use std::fmt;

/// Half-open interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> Self {
        debug_assert!(start <= end, "interval [{}, {}) ends before it starts", start, end);
        Self { start, end }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Where the interval end points live inside a tuple (little-endian i64s)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalField {
    pub start_offset: usize,
    pub end_offset: usize,
}

impl IntervalField {
    pub fn new(start_offset: usize, end_offset: usize) -> Self {
        Self {
            start_offset,
            end_offset,
        }
    }

    /// Start at `offset`, end right after it
    pub fn at(offset: usize) -> Self {
        Self::new(offset, offset + 8)
    }

    #[inline]
    pub fn read(&self, tuple: &[u8]) -> Interval {
        Interval {
            start: read_i64(tuple, self.start_offset),
            end: read_i64(tuple, self.end_offset),
        }
    }
}

#[inline]
pub(crate) fn read_i64(tuple: &[u8], offset: usize) -> i64 {
    match tuple.get(offset..offset + 8) {
        Some(bytes) => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            i64::from_le_bytes(buf)
        }
        None => {
            debug_assert!(false, "tuple of {} bytes has no i64 at {}", tuple.len(), offset);
            0
        }
    }
}

#[inline]
pub fn before(a: &Interval, b: &Interval) -> bool {
    a.end < b.start
}

#[inline]
pub fn after(a: &Interval, b: &Interval) -> bool {
    before(b, a)
}

#[inline]
pub fn meets(a: &Interval, b: &Interval) -> bool {
    a.end == b.start
}

#[inline]
pub fn met_by(a: &Interval, b: &Interval) -> bool {
    meets(b, a)
}

#[inline]
pub fn overlaps(a: &Interval, b: &Interval) -> bool {
    a.start < b.start && b.start < a.end && a.end < b.end
}

#[inline]
pub fn overlapped_by(a: &Interval, b: &Interval) -> bool {
    overlaps(b, a)
}

/// Any shared point
#[inline]
pub fn overlapping(a: &Interval, b: &Interval) -> bool {
    a.start < b.end && b.start < a.end
}

#[inline]
pub fn starts(a: &Interval, b: &Interval) -> bool {
    a.start == b.start && a.end <= b.end
}

#[inline]
pub fn started_by(a: &Interval, b: &Interval) -> bool {
    starts(b, a)
}

#[inline]
pub fn ends(a: &Interval, b: &Interval) -> bool {
    a.end == b.end && a.start >= b.start
}

#[inline]
pub fn ended_by(a: &Interval, b: &Interval) -> bool {
    ends(b, a)
}

#[inline]
pub fn covers(a: &Interval, b: &Interval) -> bool {
    a.start <= b.start && b.end <= a.end
}

#[inline]
pub fn covered_by(a: &Interval, b: &Interval) -> bool {
    covers(b, a)
}

#[inline]
pub fn equals(a: &Interval, b: &Interval) -> bool {
    a.start == b.start && a.end == b.end
}

/// Join predicate between a left and a right interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalPredicate {
    Before,
    After,
    Meets,
    MetBy,
    Overlaps,
    OverlappedBy,
    Overlapping,
    Starts,
    StartedBy,
    Ends,
    EndedBy,
    Covers,
    CoveredBy,
    Equals,
}

impl IntervalPredicate {
    pub const ALL: [IntervalPredicate; 14] = [
        IntervalPredicate::Before,
        IntervalPredicate::After,
        IntervalPredicate::Meets,
        IntervalPredicate::MetBy,
        IntervalPredicate::Overlaps,
        IntervalPredicate::OverlappedBy,
        IntervalPredicate::Overlapping,
        IntervalPredicate::Starts,
        IntervalPredicate::StartedBy,
        IntervalPredicate::Ends,
        IntervalPredicate::EndedBy,
        IntervalPredicate::Covers,
        IntervalPredicate::CoveredBy,
        IntervalPredicate::Equals,
    ];

    /// Evaluate `left <predicate> right`
    pub fn evaluate(self, left: &Interval, right: &Interval) -> bool {
        use IntervalPredicate::*;
        match self {
            Before => before(left, right),
            After => after(left, right),
            Meets => meets(left, right),
            MetBy => met_by(left, right),
            Overlaps => overlaps(left, right),
            OverlappedBy => overlapped_by(left, right),
            Overlapping => overlapping(left, right),
            Starts => starts(left, right),
            StartedBy => started_by(left, right),
            Ends => ends(left, right),
            EndedBy => ended_by(left, right),
            Covers => covers(left, right),
            CoveredBy => covered_by(left, right),
            Equals => equals(left, right),
        }
    }

    /// The predicate with its arguments swapped
    pub fn inverse(self) -> Self {
        use IntervalPredicate::*;
        match self {
            Before => After,
            After => Before,
            Meets => MetBy,
            MetBy => Meets,
            Overlaps => OverlappedBy,
            OverlappedBy => Overlaps,
            Overlapping => Overlapping,
            Starts => StartedBy,
            StartedBy => Starts,
            Ends => EndedBy,
            EndedBy => Ends,
            Covers => CoveredBy,
            CoveredBy => Covers,
            Equals => Equals,
        }
    }

    pub fn name(self) -> &'static str {
        use IntervalPredicate::*;
        match self {
            Before => "before",
            After => "after",
            Meets => "meets",
            MetBy => "met-by",
            Overlaps => "overlaps",
            OverlappedBy => "overlapped-by",
            Overlapping => "overlapping",
            Starts => "starts",
            StartedBy => "started-by",
            Ends => "ends",
            EndedBy => "ended-by",
            Covers => "covers",
            CoveredBy => "covered-by",
            Equals => "equals",
        }
    }
}

impl fmt::Display for IntervalPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
