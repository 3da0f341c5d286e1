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

//! Constant-layout contract: a pure, bit-reproducible offset table shared
//! between host allocation and device interpretation of one arena.

/// Sizing input to `compute_constants`.
#[derive(Debug, Clone, Copy)]
pub struct WorldLayoutConfig {
    pub num_worlds: u32,
    pub num_world_data_bytes: usize,
    pub world_data_alignment: usize,
}

/// Packed offset table, in bytes from the start of the arena. Regions are
/// emitted in the order below; each is bumped onto a cursor aligned to its
/// own requirement, so re-ordering this struct's fields does not change the
/// layout it describes — only the order `compute_constants` lays them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTable {
    pub task_graph: usize,
    pub state_manager: usize,
    pub world_data: usize,
    pub host_allocator: usize,
    pub host_print: usize,
    pub tmp_allocator: usize,
    pub device_tracing: usize,
    pub total_bytes: usize,
}

/// Fixed region sizes, matching `dag::node::DagNode`/`state_manager`-scale
/// bookkeeping. These are crate-internal constants rather than configurable
/// because the regions they size are fixed-shape host structures, not
/// per-world data.
const TASK_GRAPH_BYTES: usize = 4096;
const TASK_GRAPH_ALIGN: usize = 8;
const STATE_MANAGER_BYTES: usize = 4096;
const STATE_MANAGER_ALIGN: usize = 8;
const HOST_ALLOCATOR_BYTES: usize = 256;
const HOST_ALLOCATOR_ALIGN: usize = 8;
const HOST_PRINT_BYTES: usize = 4096;
const HOST_PRINT_ALIGN: usize = 8;
const TMP_ALLOCATOR_BYTES: usize = 256;
const TMP_ALLOCATOR_ALIGN: usize = 8;
const DEVICE_TRACING_BYTES: usize = 8192;
const DEVICE_TRACING_ALIGN: usize = 8;

fn align_up(cursor: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (cursor + alignment - 1) & !(alignment - 1)
}

/// Lay out one arena covering the task graph, state manager, per-world user
/// data, and the three bookkeeping regions, by monotonically bumping a
/// cursor and aligning it to each region's requirement in turn.
pub fn compute_constants(config: WorldLayoutConfig) -> LayoutTable {
    let mut cursor = 0usize;

    cursor = align_up(cursor, TASK_GRAPH_ALIGN);
    let task_graph = cursor;
    cursor += TASK_GRAPH_BYTES;

    cursor = align_up(cursor, STATE_MANAGER_ALIGN);
    let state_manager = cursor;
    cursor += STATE_MANAGER_BYTES;

    let world_data_alignment = config.world_data_alignment.max(1);
    cursor = align_up(cursor, world_data_alignment);
    let world_data = cursor;
    cursor += config.num_world_data_bytes * config.num_worlds as usize;

    cursor = align_up(cursor, HOST_ALLOCATOR_ALIGN);
    let host_allocator = cursor;
    cursor += HOST_ALLOCATOR_BYTES;

    cursor = align_up(cursor, HOST_PRINT_ALIGN);
    let host_print = cursor;
    cursor += HOST_PRINT_BYTES;

    cursor = align_up(cursor, TMP_ALLOCATOR_ALIGN);
    let tmp_allocator = cursor;
    cursor += TMP_ALLOCATOR_BYTES;

    cursor = align_up(cursor, DEVICE_TRACING_ALIGN);
    let device_tracing = cursor;
    cursor += DEVICE_TRACING_BYTES;

    #[cfg(feature = "profiling")]
    tracing::info!(?config, total_bytes = cursor, "compute_constants");

    LayoutTable {
        task_graph,
        state_manager,
        world_data,
        host_allocator,
        host_print,
        tmp_allocator,
        device_tracing,
        total_bytes: cursor,
    }
}
