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

//! Compiled queries and the shared arena they publish into.
//!
//! A query is compiled at most once. `QueryRef` carries the sentinel that
//! makes compilation idempotent under concurrent callers: the fast path is
//! a single acquire load, the slow path holds `StateManager`'s compile
//! mutex for the duration of one scan over the archetype table.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

/// Marks an uncompiled `QueryRef`. Chosen to match the wire-visible
/// sentinel named in the external interface contract.
pub const SENTINEL: u32 = 0xFFFF_FFFF;

/// A compiled query handle.
///
/// Layout of the arena record this handle points at, per matching
/// archetype: `[archetype_id, col_idx_0, .., col_idx_{k-1}]`, where `k`
/// is `num_components`. Archetypes are emitted in ascending id order.
#[derive(Debug)]
pub struct QueryRef {
    offset: AtomicU32,
    num_matching_archetypes: AtomicU32,
    num_components: AtomicU32,
}

impl Default for QueryRef {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRef {
    pub fn new() -> Self {
        Self {
            offset: AtomicU32::new(0),
            num_matching_archetypes: AtomicU32::new(SENTINEL),
            num_components: AtomicU32::new(0),
        }
    }

    /// Whether compilation has published a result yet.
    pub fn is_compiled(&self) -> bool {
        self.num_matching_archetypes.load(Ordering::Acquire) != SENTINEL
    }

    pub fn offset(&self) -> u32 {
        self.offset.load(Ordering::Acquire)
    }

    pub fn num_matching_archetypes(&self) -> u32 {
        let n = self.num_matching_archetypes.load(Ordering::Acquire);
        if n == SENTINEL {
            0
        } else {
            n
        }
    }

    pub fn num_components(&self) -> u32 {
        self.num_components.load(Ordering::Acquire)
    }

    /// Record-size of one matching-archetype entry, in `u32` words.
    pub fn record_words(&self) -> usize {
        1 + self.num_components() as usize
    }

    /// Publish a compiled result. The sentinel field is written last with
    /// release semantics so that any reader observing a non-sentinel
    /// value also observes `offset`/`num_components` correctly — callers
    /// must hold the compile mutex while calling this.
    fn publish(&self, offset: u32, num_matching_archetypes: u32, num_components: u32) {
        self.offset.store(offset, Ordering::Relaxed);
        self.num_components.store(num_components, Ordering::Relaxed);
        self.num_matching_archetypes
            .store(num_matching_archetypes, Ordering::Release);
    }
}

/// Append-only backing store for compiled query records, shared across
/// every `QueryRef` a `StateManager` ever compiles.
pub struct QueryArena {
    data: Mutex<Vec<u32>>,
}

impl Default for QueryArena {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryArena {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
        }
    }

    /// Append `records` and publish the compiled result into `query_ref`.
    /// Caller must already hold `StateManager`'s compile mutex; this
    /// method takes its own lock only for the arena append itself.
    pub(crate) fn append_and_publish(
        &self,
        query_ref: &QueryRef,
        records: &[u32],
        num_matching_archetypes: u32,
        num_components: u32,
    ) {
        let offset = {
            let mut data = self.data.lock();
            let offset = data.len() as u32;
            data.extend_from_slice(records);
            offset
        };
        query_ref.publish(offset, num_matching_archetypes, num_components);
    }

    /// Copy out the `len` words starting at `offset`. Used by readers
    /// (and tests) to inspect a compiled query's match list.
    pub fn snapshot(&self, offset: u32, len: usize) -> Vec<u32> {
        let data = self.data.lock();
        data[offset as usize..offset as usize + len].to_vec()
    }
}
