// Copyright 2024 Saptak Santra
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

//! Entity identifiers and the generational slot table that resolves them.

use crate::error::{EcsError, Result};

/// Opaque entity identifier: a (generation, slot) pair.
///
/// Equality is structural. A handle is live iff the entity store's slot at
/// `slot_index` currently holds `generation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    pub generation: u32,
    pub slot_index: u32,
}

/// One entry in the entity store's fixed-capacity slot array.
///
/// `archetype_id`/`row` are sentinels (`u32::MAX`) until the slot is
/// occupied. `resolve` always checks `generation` first, so a caller can
/// never observe the sentinel as a real location (open question #3 of
/// the design notes).
#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    archetype_id: u32,
    row: u32,
}

impl Slot {
    const fn fresh() -> Self {
        Self {
            generation: 0,
            archetype_id: u32::MAX,
            row: u32::MAX,
        }
    }
}

/// Resolved location of a live entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: u32,
    pub row: u32,
}

/// Fixed-capacity generational id allocator and slot table.
///
/// Invariants:
/// - a slot's generation increments monotonically on destruction,
/// - any live handle resolves to exactly one `(archetype, row)` pair,
/// - the free-list and the live set partition the slot space.
pub struct EntityStore {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl EntityStore {
    /// Create a store with capacity for exactly `max_entities` live entities.
    /// All slots start at generation 0; the free-list is the full index
    /// range in ascending order.
    pub fn new(max_entities: usize) -> Self {
        #[cfg(feature = "profiling")]
        tracing::debug!(max_entities, "EntityStore::new");

        let slots = vec![Slot::fresh(); max_entities];
        let free_list = (0..max_entities as u32).rev().collect();
        Self { slots, free_list }
    }

    /// Capacity this store was constructed with.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Pop a slot from the free-list and return its current handle.
    pub fn allocate(&mut self) -> Result<EntityHandle> {
        let slot_index = self.free_list.pop().ok_or_else(|| {
            #[cfg(feature = "profiling")]
            tracing::warn!("EntityStore exhausted");
            EcsError::Exhausted
        })?;

        let generation = self.slots[slot_index as usize].generation;
        Ok(EntityHandle {
            generation,
            slot_index,
        })
    }

    /// Record where an allocated (but not yet located) entity now lives.
    pub fn set_location(&mut self, handle: EntityHandle, location: EntityLocation) {
        let slot = &mut self.slots[handle.slot_index as usize];
        debug_assert_eq!(slot.generation, handle.generation);
        slot.archetype_id = location.archetype_id;
        slot.row = location.row;
    }

    /// Verify liveness, bump the generation, and push the slot back onto
    /// the free-list. Freeing a stale handle is a detected no-op.
    pub fn free(&mut self, handle: EntityHandle) {
        let slot = &mut self.slots[handle.slot_index as usize];
        if slot.generation != handle.generation {
            return;
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.archetype_id = u32::MAX;
        slot.row = u32::MAX;
        self.free_list.push(handle.slot_index);
    }

    /// Resolve a handle to its archetype+row, or `Stale` if the generation
    /// no longer matches. Constant time.
    pub fn resolve(&self, handle: EntityHandle) -> Result<EntityLocation> {
        let slot = self
            .slots
            .get(handle.slot_index as usize)
            .ok_or(EcsError::Stale)?;
        if slot.generation != handle.generation {
            return Err(EcsError::Stale);
        }
        Ok(EntityLocation {
            archetype_id: slot.archetype_id,
            row: slot.row,
        })
    }

    /// Whether `handle` is currently live.
    pub fn is_live(&self, handle: EntityHandle) -> bool {
        self.resolve(handle).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_resolve() {
        let mut store = EntityStore::new(4);
        let h = store.allocate().unwrap();
        store.set_location(
            h,
            EntityLocation {
                archetype_id: 1,
                row: 0,
            },
        );
        assert_eq!(
            store.resolve(h).unwrap(),
            EntityLocation {
                archetype_id: 1,
                row: 0
            }
        );
    }

    #[test]
    fn free_then_resolve_is_stale() {
        let mut store = EntityStore::new(4);
        let h = store.allocate().unwrap();
        store.free(h);
        assert_eq!(store.resolve(h), Err(EcsError::Stale));
    }

    #[test]
    fn reallocating_freed_slot_yields_new_generation() {
        let mut store = EntityStore::new(1);
        let h1 = store.allocate().unwrap();
        store.free(h1);
        let h2 = store.allocate().unwrap();

        assert_eq!(h1.slot_index, h2.slot_index);
        assert_ne!(h1.generation, h2.generation);
        assert_eq!(store.resolve(h1), Err(EcsError::Stale));
        store.set_location(
            h2,
            EntityLocation {
                archetype_id: 0,
                row: 0,
            },
        );
        assert!(store.resolve(h2).is_ok());
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut store = EntityStore::new(1);
        store.allocate().unwrap();
        assert_eq!(store.allocate(), Err(EcsError::Exhausted));
    }

    #[test]
    fn generation_is_monotonic_across_many_cycles() {
        let mut store = EntityStore::new(1);
        let mut last_gen = 0;
        for _ in 0..10 {
            let h = store.allocate().unwrap();
            assert!(h.generation >= last_gen);
            last_gen = h.generation;
            store.free(h);
        }
    }
}
