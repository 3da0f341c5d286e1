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

//! Central state manager: component registry, archetype table, and the
//! query compiler that ties them together.

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::allocator::ReserveCommitAllocator;
use crate::archetype::Archetype;
use crate::component::{ComponentId, ComponentRegistry, ENTITY_COMPONENT_ID};
use crate::error::{EcsError, Result};
use crate::query::{QueryArena, QueryRef};

/// Construction-time sizing for a `StateManager`.
#[derive(Debug, Clone, Copy)]
pub struct StateManagerConfig {
    pub max_components: usize,
    pub max_archetype_components: usize,
    pub max_rows_per_table: usize,
    pub num_worlds: usize,
}

/// Owns component registration, archetype storage, and the shared query
/// arena. Registration calls (`register_component`, `register_archetype`)
/// are assumed to be externally serialized by the host before launch;
/// `make_query` is the one operation this type must make safe under
/// concurrent callers.
pub struct StateManager {
    config: StateManagerConfig,
    components: ComponentRegistry,
    archetypes: Vec<Archetype>,
    /// Bump arena of user component ids, one contiguous span per
    /// archetype, recording each archetype's span as `(offset, count)`.
    archetype_components: Vec<ComponentId>,
    archetype_component_spans: Vec<(u32, u32)>,
    query_arena: QueryArena,
    compile_mutex: Mutex<()>,
    allocator: Box<dyn ReserveCommitAllocator + Send + Sync>,
}

impl StateManager {
    pub fn new(config: StateManagerConfig, allocator: Box<dyn ReserveCommitAllocator + Send + Sync>) -> Self {
        #[cfg(feature = "profiling")]
        tracing::info!(?config, "StateManager::new");

        Self {
            config,
            components: ComponentRegistry::new(config.max_components),
            archetypes: Vec::new(),
            archetype_components: Vec::new(),
            archetype_component_spans: Vec::new(),
            query_arena: QueryArena::new(),
            compile_mutex: Mutex::new(()),
            allocator,
        }
    }

    /// Emplace a component descriptor at `id`. Panics on the documented
    /// programmer errors (out-of-range id, duplicate registration,
    /// non-power-of-two alignment).
    pub fn register_component(&mut self, id: ComponentId, align: usize, size: usize) {
        self.components.register_component(id, align, size);
    }

    /// Record an archetype: reserves its column buffers and builds the
    /// component-id → column-index map. `id` must equal the number of
    /// archetypes already registered (archetypes are booked sequentially
    /// so ascending-id scans during query compilation are just linear
    /// iteration).
    pub fn register_archetype(&mut self, id: u32, component_ids: &[ComponentId]) -> Result<()> {
        if id as usize != self.archetypes.len() {
            return Err(EcsError::RegistrationConflict(format!(
                "archetype id {id} is not the next sequential id ({})",
                self.archetypes.len()
            )));
        }
        if component_ids.len() > self.config.max_archetype_components.saturating_sub(2) {
            return Err(EcsError::RegistrationConflict(format!(
                "archetype {id} declares {} user components, exceeding max_archetype_components - 2 ({})",
                component_ids.len(),
                self.config.max_archetype_components.saturating_sub(2)
            )));
        }

        let mut descriptors = AHashMap::default();
        descriptors.insert(ENTITY_COMPONENT_ID, self.components.get(ENTITY_COMPONENT_ID)?);
        descriptors.insert(
            crate::component::WORLD_ID_COMPONENT_ID,
            self.components.get(crate::component::WORLD_ID_COMPONENT_ID)?,
        );
        for &cid in component_ids {
            descriptors.insert(cid, self.components.get(cid)?);
        }

        let archetype = Archetype::register(
            id,
            component_ids,
            &descriptors,
            self.config.max_rows_per_table,
            self.config.num_worlds,
            self.allocator.as_ref(),
        )?;

        let span_offset = self.archetype_components.len() as u32;
        self.archetype_components.extend_from_slice(component_ids);
        self.archetype_component_spans
            .push((span_offset, component_ids.len() as u32));

        self.archetypes.push(archetype);
        Ok(())
    }

    /// Compile `component_ids` into `query_ref`, idempotently. Returns
    /// immediately if another caller already won the compile race.
    pub fn make_query(&self, component_ids: &[ComponentId], query_ref: &QueryRef) -> Result<()> {
        if query_ref.is_compiled() {
            return Ok(());
        }

        let _guard = self.compile_mutex.lock();
        if query_ref.is_compiled() {
            return Ok(());
        }

        #[cfg(feature = "profiling")]
        tracing::trace!(?component_ids, "make_query: compiling");

        for &id in component_ids {
            if id != ENTITY_COMPONENT_ID && !self.components.is_registered(id) {
                return Err(EcsError::UnassignedComponent(id));
            }
        }

        let mut records = Vec::new();
        let mut num_matching = 0u32;
        for archetype in &self.archetypes {
            if !archetype.matches(component_ids) {
                continue;
            }
            records.push(archetype.id());
            for &cid in component_ids {
                let col = archetype.column_index(cid).unwrap_or(0);
                records.push(col as u32);
            }
            num_matching += 1;
        }

        self.query_arena
            .append_and_publish(query_ref, &records, num_matching, component_ids.len() as u32);
        Ok(())
    }

    /// Read back a compiled query's match list as
    /// `(archetype_id, column_indices)` pairs, in the order they were
    /// compiled (ascending archetype id).
    pub fn read_query(&self, query_ref: &QueryRef) -> Vec<(u32, Vec<u32>)> {
        if !query_ref.is_compiled() {
            return Vec::new();
        }
        let record_words = query_ref.record_words();
        let total = record_words * query_ref.num_matching_archetypes() as usize;
        let flat = self.query_arena.snapshot(query_ref.offset(), total);
        flat.chunks(record_words)
            .map(|chunk| (chunk[0], chunk[1..].to_vec()))
            .collect()
    }

    /// Reset the named archetype's row cursor to zero.
    pub fn clear_temporaries(&self, archetype_id: u32) -> Result<()> {
        let archetype = self
            .archetypes
            .get(archetype_id as usize)
            .ok_or_else(|| EcsError::RegistrationConflict(format!("no archetype {archetype_id}")))?;
        archetype.clear_temporaries();
        Ok(())
    }

    pub fn archetype(&self, id: u32) -> Option<&Archetype> {
        self.archetypes.get(id as usize)
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_component_registered(&self, id: ComponentId) -> bool {
        self.components.is_registered(id)
    }
}
