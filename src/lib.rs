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

//! Archetype ECS state manager and persistent task-graph megakernel
//! scheduler for wide-SIMD many-world simulation.

pub mod allocator;
pub mod archetype;
pub mod component;
pub mod config;
pub mod dag;
pub mod entity;
pub mod error;
pub mod host;
pub mod layout;
pub mod query;
pub mod state_manager;
pub mod tracing_ring;

// Re-exports for convenience
pub use allocator::{MmapReserveCommitAllocator, ReserveCommitAllocator, Reservation};
pub use archetype::Archetype;
pub use component::{ComponentDescriptor, ComponentId, ComponentRegistry};
pub use config::MegakernelConfig;
pub use dag::{ActiveWork, BlockWork, ClaimedChunk, DagNode, SharedBlockState, TaskGraphScheduler, WARP_SIZE};
pub use entity::{EntityHandle, EntityStore};
pub use error::{EcsError, Result};
pub use host::RendererInitSlot;
pub use layout::{compute_constants, LayoutTable, WorldLayoutConfig};
pub use query::{QueryArena, QueryRef};
pub use state_manager::{StateManager, StateManagerConfig};
pub use tracing_ring::{TraceEvent, TraceRingBuffer, TraceTag};
