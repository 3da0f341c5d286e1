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

//! Grid-dimension configuration the host supplies at launch.

/// Consts struct describing grid dimensions, mirrored from spec.md §6. Not
/// file/env-sourced — the host owns configuration plumbing in the real
/// system; this crate only needs the typed shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MegakernelConfig {
    pub num_megakernel_threads: u32,
    pub num_megakernel_blocks_per_sm: u32,
    pub num_worlds: u32,
}

impl Default for MegakernelConfig {
    fn default() -> Self {
        Self {
            num_megakernel_threads: 256,
            num_megakernel_blocks_per_sm: 1,
            num_worlds: 1,
        }
    }
}
