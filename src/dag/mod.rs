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

//! Task-graph megakernel scheduler: a persistent, cooperatively-scheduled
//! driver for a pre-sorted DAG of wide-SIMD work nodes.

pub mod grid;
pub mod node;
pub mod scheduler;

pub use grid::{run_grid, LaneOutcome};
pub use node::DagNode;
pub use scheduler::{ActiveWork, BlockWork, ClaimedChunk, SharedBlockState, TaskGraphScheduler, WARP_SIZE};
