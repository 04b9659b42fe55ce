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

//! Slot Array Property Tests
//!
//! Random allocate/deallocate sequences against a model of the live slots.
//! Record contents must survive any interleaving and an idle table must
//! shrink back to a single slab.

use std::time::Duration;

use hyrax::{RecordLayout, SlotArrayManager};
use proptest::prelude::*;

const PAYLOAD: usize = 8;

fn zero(record: &mut [u8]) {
    record.fill(0);
}

fn layout() -> RecordLayout {
    RecordLayout {
        record_size: 16,
        init: zero,
    }
}

proptest! {
    #[test]
    fn prop_slots_keep_their_records(
        ops in prop::collection::vec((any::<bool>(), any::<u16>()), 1..400),
        slots_per_slab in 2usize..16,
    ) {
        let mut table = SlotArrayManager::new("prop", layout(), slots_per_slab, Duration::ZERO);
        let mut live: Vec<(i32, i64)> = Vec::new();
        let mut next = 1i64;

        for (alloc, pick) in ops {
            if alloc || live.is_empty() {
                let slot = table.allocate();
                prop_assert!(live.iter().all(|(s, _)| *s != slot), "slot {} handed out twice", slot);
                prop_assert_eq!(table.get_i64(slot, PAYLOAD), 0);
                table.set_i64(slot, PAYLOAD, next);
                live.push((slot, next));
                next += 1;
            } else {
                let (slot, value) = live.swap_remove(pick as usize % live.len());
                prop_assert_eq!(table.get_i64(slot, PAYLOAD), value);
                table.deallocate(slot);
            }
            prop_assert_eq!(table.occupied_slots(), live.len());
        }

        for (slot, value) in &live {
            prop_assert_eq!(table.get_i64(*slot, PAYLOAD), *value);
        }
        for (slot, _) in live.drain(..) {
            table.deallocate(slot);
        }
        prop_assert_eq!(table.occupied_slots(), 0);

        // Each idle allocate/deallocate gives the shrink check another look
        for _ in 0..64 {
            if table.slab_count() == 1 {
                break;
            }
            let probe = table.allocate();
            table.deallocate(probe);
        }
        prop_assert_eq!(table.slab_count(), 1);
        prop_assert_eq!(table.initialized_slab_count(), 1);
    }
}

#[test]
fn test_drained_table_shrinks_to_single_slab() {
    let mut table = SlotArrayManager::new("drain", layout(), 4, Duration::ZERO);
    let slots: Vec<i32> = (0..32).map(|_| table.allocate()).collect();
    assert_eq!(table.slab_count(), 8);

    for &slot in slots.iter().rev() {
        table.deallocate(slot);
    }
    assert_eq!(table.occupied_slots(), 0);
    assert_eq!(table.slab_count(), 1);

    // The remaining slab is still usable
    let slot = table.allocate();
    table.set_i64(slot, PAYLOAD, 42);
    assert_eq!(table.get_i64(slot, PAYLOAD), 42);
}

#[test]
fn test_shrink_waits_for_threshold() {
    let mut table = SlotArrayManager::new("slow", layout(), 4, Duration::from_secs(3600));
    let slots: Vec<i32> = (0..32).map(|_| table.allocate()).collect();
    for &slot in slots.iter().rev() {
        table.deallocate(slot);
    }
    assert_eq!(table.slab_count(), 8);
}
