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

//! Archetype storage: one reserved column per component, a monotonic row
//! cursor, and a compact component-id to column-index map.

use std::sync::atomic::{AtomicU32, Ordering};

use ahash::AHashMap;
use rustc_hash::FxHashMap;

use crate::allocator::{Reservation, ReserveCommitAllocator};
use crate::component::{ComponentDescriptor, ComponentId, ENTITY_COMPONENT_ID, USER_COMPONENT_OFFSET, WORLD_ID_COMPONENT_ID};
use crate::error::{EcsError, Result};

/// One reserved, lazily-committed column of a fixed-width component type.
pub struct Column {
    reservation: Reservation,
    item_size: usize,
}

impl Column {
    fn new(reservation: Reservation, item_size: usize) -> Self {
        Self {
            reservation,
            item_size,
        }
    }

    /// Maximum number of rows this column's reservation can ever hold.
    pub fn capacity_rows(&self) -> usize {
        if self.item_size == 0 {
            usize::MAX
        } else {
            self.reservation.len() / self.item_size
        }
    }

    /// Raw byte pointer to the start of row `row`. Caller is responsible
    /// for staying within `capacity_rows()` and for any aliasing
    /// discipline the concurrency model requires.
    pub fn row_ptr(&self, row: usize) -> *const u8 {
        unsafe { self.reservation.as_ptr().add(row * self.item_size) }
    }

    pub fn row_ptr_mut(&mut self, row: usize) -> *mut u8 {
        unsafe { self.reservation.as_mut_ptr().add(row * self.item_size) }
    }
}

/// One archetype table: `Entity` and `WorldID` columns followed by the
/// user-declared components in registration order.
pub struct Archetype {
    id: u32,
    columns: Vec<Column>,
    column_index: FxHashMap<ComponentId, usize>,
    num_rows: AtomicU32,
    max_rows_per_table: usize,
}

impl Archetype {
    /// Reserve an archetype's columns. `component_ids` excludes the
    /// implicit `Entity`/`WorldID` columns, which are prepended here.
    pub fn register(
        id: u32,
        component_ids: &[ComponentId],
        descriptors: &AHashMap<ComponentId, ComponentDescriptor>,
        max_rows_per_table: usize,
        num_worlds: usize,
        allocator: &dyn ReserveCommitAllocator,
    ) -> Result<Self> {
        let mut columns = Vec::with_capacity(component_ids.len() + USER_COMPONENT_OFFSET);
        let mut column_index = FxHashMap::default();

        let all_ids = std::iter::once(ENTITY_COMPONENT_ID)
            .chain(std::iter::once(WORLD_ID_COMPONENT_ID))
            .chain(component_ids.iter().copied());

        for (col_idx, component_id) in all_ids.enumerate() {
            let desc = descriptors
                .get(&component_id)
                .ok_or(EcsError::UnassignedComponent(component_id))?;

            let reserve_bytes = max_rows_per_table
                .checked_mul(desc.size)
                .expect("archetype reservation size overflow");
            let init_commit_bytes = num_worlds
                .checked_mul(desc.size)
                .expect("archetype initial commit size overflow")
                .min(reserve_bytes);

            let reservation = allocator.reserve(reserve_bytes, init_commit_bytes)?;
            columns.push(Column::new(reservation, desc.size));
            column_index.insert(component_id, col_idx);
        }

        #[cfg(feature = "profiling")]
        tracing::info!(archetype_id = id, num_columns = columns.len(), "register_archetype");

        Ok(Self {
            id,
            columns,
            column_index,
            num_rows: AtomicU32::new(0),
            max_rows_per_table,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current committed row count.
    pub fn num_rows(&self) -> u32 {
        self.num_rows.load(Ordering::Acquire)
    }

    /// Column index for `component_id`, or `None` if this archetype does
    /// not carry it. `Entity` always resolves to column 0.
    pub fn column_index(&self, component_id: ComponentId) -> Option<usize> {
        self.column_index.get(&component_id).copied()
    }

    /// Whether every id in `component_ids` (other than `Entity`, which is
    /// implicitly present in every archetype) is a column of this table.
    pub fn matches(&self, component_ids: &[ComponentId]) -> bool {
        component_ids
            .iter()
            .all(|&id| id == ENTITY_COMPONENT_ID || self.column_index.contains_key(&id))
    }

    /// Claim the next row, advancing the monotonic cursor. Returns the
    /// claimed row index, or `RowOverflow` if the table is full.
    pub fn allocate_row(&self) -> Result<u32> {
        let row = self.num_rows.fetch_add(1, Ordering::AcqRel);
        if row as usize >= self.max_rows_per_table {
            self.num_rows.fetch_sub(1, Ordering::AcqRel);
            return Err(EcsError::RowOverflow {
                archetype_id: self.id,
                max_rows: self.max_rows_per_table,
            });
        }
        Ok(row)
    }

    /// Reset the row cursor to zero. Column memory is not reclaimed; rows
    /// are simply made eligible for reuse on the next allocation cycle.
    pub fn clear_temporaries(&self) {
        self.num_rows.store(0, Ordering::Release);
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_mut(&mut self, index: usize) -> Option<&mut Column> {
        self.columns.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::MmapReserveCommitAllocator;
    use crate::component::ComponentRegistry;

    fn descriptors(registry: &ComponentRegistry, ids: &[ComponentId]) -> AHashMap<ComponentId, ComponentDescriptor> {
        let mut map = AHashMap::default();
        map.insert(ENTITY_COMPONENT_ID, registry.get(ENTITY_COMPONENT_ID).unwrap());
        map.insert(WORLD_ID_COMPONENT_ID, registry.get(WORLD_ID_COMPONENT_ID).unwrap());
        for &id in ids {
            map.insert(id, registry.get(id).unwrap());
        }
        map
    }

    #[test]
    fn register_lays_out_implicit_then_user_columns() {
        let mut registry = ComponentRegistry::new(16);
        registry.register_component(2, 4, 4);
        registry.register_component(3, 4, 4);
        let descs = descriptors(&registry, &[2, 3]);

        let alloc = MmapReserveCommitAllocator;
        let arch = Archetype::register(0, &[2, 3], &descs, 1024, 4, &alloc).unwrap();

        assert_eq!(arch.column_index(ENTITY_COMPONENT_ID), Some(0));
        assert_eq!(arch.column_index(WORLD_ID_COMPONENT_ID), Some(1));
        assert_eq!(arch.column_index(2), Some(USER_COMPONENT_OFFSET));
        assert_eq!(arch.column_index(3), Some(USER_COMPONENT_OFFSET + 1));
    }

    #[test]
    fn matches_checks_non_entity_components() {
        let mut registry = ComponentRegistry::new(16);
        registry.register_component(2, 4, 4);
        let descs = descriptors(&registry, &[2]);
        let alloc = MmapReserveCommitAllocator;
        let arch = Archetype::register(0, &[2], &descs, 64, 1, &alloc).unwrap();

        assert!(arch.matches(&[ENTITY_COMPONENT_ID, 2]));
        assert!(!arch.matches(&[ENTITY_COMPONENT_ID, 99]));
    }

    #[test]
    fn allocate_row_overflows_past_max_rows() {
        let registry = ComponentRegistry::new(16);
        let descs = descriptors(&registry, &[]);
        let alloc = MmapReserveCommitAllocator;
        let arch = Archetype::register(0, &[], &descs, 2, 2, &alloc).unwrap();

        assert_eq!(arch.allocate_row().unwrap(), 0);
        assert_eq!(arch.allocate_row().unwrap(), 1);
        assert!(matches!(
            arch.allocate_row(),
            Err(EcsError::RowOverflow { archetype_id: 0, max_rows: 2 })
        ));
    }

    #[test]
    fn clear_temporaries_resets_cursor_not_memory() {
        let registry = ComponentRegistry::new(16);
        let descs = descriptors(&registry, &[]);
        let alloc = MmapReserveCommitAllocator;
        let arch = Archetype::register(0, &[], &descs, 4, 1, &alloc).unwrap();

        arch.allocate_row().unwrap();
        arch.allocate_row().unwrap();
        assert_eq!(arch.num_rows(), 2);
        arch.clear_temporaries();
        assert_eq!(arch.num_rows(), 0);
        assert_eq!(arch.allocate_row().unwrap(), 0);
    }
}
