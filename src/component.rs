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

//! Component registry
//!
//! A component is a stable numeric id plus an alignment (power of two) and a
//! size in bytes. Registration is write-only append: a component is
//! registered at most once per id, and the registry never mutates a
//! descriptor once written.

use crate::error::{EcsError, Result};

/// Stable numeric component id.
pub type ComponentId = u32;

/// The `Entity` column is always column 0 of every archetype.
pub const ENTITY_COMPONENT_ID: ComponentId = 0;

/// The `WorldID` column is always column 1 of every archetype.
pub const WORLD_ID_COMPONENT_ID: ComponentId = 1;

/// Number of implicit columns injected ahead of user components
/// (`Entity`, `WorldID`). User component column indices start here.
pub const USER_COMPONENT_OFFSET: usize = 2;

/// Registered type description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub id: ComponentId,
    /// Power-of-two alignment in bytes.
    pub align: usize,
    /// Size in bytes.
    pub size: usize,
}

/// Append-only table of registered components, indexed by id.
///
/// `register_component` is the only mutator and it is write-once per id:
/// registering the same id twice is a programmer error and aborts, matching
/// the host-serialized registration policy of the state manager this
/// registry backs.
pub struct ComponentRegistry {
    descriptors: Vec<Option<ComponentDescriptor>>,
    max_components: usize,
}

impl ComponentRegistry {
    /// Create a registry with capacity for `max_components` ids, and
    /// register the two reserved implicit components (`Entity`, `WorldID`).
    pub fn new(max_components: usize) -> Self {
        let mut registry = Self {
            descriptors: vec![None; max_components],
            max_components,
        };

        // Entity handles are a (generation, slot_index) pair of u32s.
        registry.register_component(
            ENTITY_COMPONENT_ID,
            std::mem::align_of::<u64>(),
            std::mem::size_of::<u64>(),
        );
        registry.register_component(
            WORLD_ID_COMPONENT_ID,
            std::mem::align_of::<u32>(),
            std::mem::size_of::<u32>(),
        );

        registry
    }

    /// Register a component descriptor at position `id`.
    ///
    /// # Panics
    /// Panics if `id` is out of range or already registered — both are
    /// programmer errors per the registration contract.
    pub fn register_component(&mut self, id: ComponentId, align: usize, size: usize) {
        let idx = id as usize;
        assert!(
            idx < self.max_components,
            "component id {id} out of range [0, {})",
            self.max_components
        );
        assert!(
            self.descriptors[idx].is_none(),
            "component id {id} already registered"
        );
        assert!(align.is_power_of_two(), "component alignment must be a power of two, got {align}");

        #[cfg(feature = "profiling")]
        tracing::info!(id, align, size, "register_component");

        self.descriptors[idx] = Some(ComponentDescriptor { id, align, size });
    }

    /// Fetch a registered descriptor, or `Err` if `id` was never registered.
    pub fn get(&self, id: ComponentId) -> Result<ComponentDescriptor> {
        self.descriptors
            .get(id as usize)
            .and_then(|d| *d)
            .ok_or(EcsError::UnassignedComponent(id))
    }

    /// Whether `id` has a registered descriptor.
    pub fn is_registered(&self, id: ComponentId) -> bool {
        self.descriptors
            .get(id as usize)
            .map(|d| d.is_some())
            .unwrap_or(false)
    }
}
