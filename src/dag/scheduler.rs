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

//! Persistent, cooperatively-scheduled task-graph driver.
//!
//! A single long-running kernel, launched with a fixed grid of blocks,
//! consumes a pre-sorted DAG of nodes. Blocks coordinate through the
//! atomics on each `DagNode` plus one grid-wide barrier at `init`; node
//! transitions are otherwise observed independently by each block via
//! acquire loads of `cur_node_idx`.

use std::sync::atomic::{AtomicU32, Ordering};

use smallvec::{smallvec, SmallVec};

use crate::dag::node::DagNode;
use crate::tracing_ring::{TraceEvent, TraceRingBuffer};

/// A group of cooperating lanes claims invocations at 32-wide granularity
/// when `num_threads_per_invocation` is this or smaller; above it, the
/// whole block claims as one group.
pub const WARP_SIZE: u32 = 32;

/// Per-block scratch, re-derived on each node transition the block
/// observes. `node_idx`/`init_offset` use `-1` as "no assignment" —
/// resolved (see design notes) so that `init_offset == -1` alone is
/// sufficient to mean "re-enter via get_work's node-acquisition path",
/// regardless of what `node_idx` last held.
#[derive(Debug, Clone, Copy)]
pub struct SharedBlockState {
    node_idx: i64,
    init_offset: i64,
    total: u32,
    func_id: u32,
    data_idx: u32,
    num_threads_per_invocation: u32,
}

impl SharedBlockState {
    pub fn fresh() -> Self {
        Self {
            node_idx: -1,
            init_offset: -1,
            total: 0,
            func_id: 0,
            data_idx: 0,
            num_threads_per_invocation: 1,
        }
    }

    pub fn node_idx(&self) -> Option<u32> {
        if self.node_idx < 0 {
            None
        } else {
            Some(self.node_idx as u32)
        }
    }
}

impl Default for SharedBlockState {
    fn default() -> Self {
        Self::fresh()
    }
}

/// A single group's (one warp's, or the whole block's) batch of invocation
/// slots claimed in one `fetch_add`. `count` lanes of that group share this
/// claim; lane `l`'s invocation index (`l` counted from the start of the
/// claiming group, not the block) is `base_offset + l / threads_per_invocation`.
#[derive(Debug, Clone, Copy)]
pub struct ClaimedChunk {
    pub func_id: u32,
    pub data_idx: u32,
    pub base_offset: u32,
    pub count: u32,
    pub threads_per_invocation: u32,
    pub total: u32,
}

impl ClaimedChunk {
    /// Resolve group-local lane `l`'s outcome: `Some(offset)` for `Run`,
    /// `None` for `PartialRun` (the lane does not execute but still
    /// participates in the block's completion accounting).
    pub fn lane_invocation(&self, lane: u32) -> Option<u32> {
        let offset = self.base_offset + lane / self.threads_per_invocation;
        if offset < self.total {
            Some(offset)
        } else {
            None
        }
    }

    /// Number of distinct invocations this chunk actually completes —
    /// the count the leader subtracts from `numRemaining`.
    pub fn num_finished(&self) -> u32 {
        self.count.min(self.total.saturating_sub(self.base_offset))
    }
}

/// One block's claimed work for a round: either one claim shared by the
/// whole block (wide invocations, `threadsPerInvocation > WARP_SIZE`) or
/// one independent claim per warp (narrow invocations). `lanes_per_chunk`
/// is the number of block lanes each entry of `chunks` covers — the block
/// thread's own lane range is `[i * lanes_per_chunk, (i + 1) * lanes_per_chunk)`
/// for `chunks[i]`. An entry is `None` when that group's claim already
/// exceeded the node's total and has nothing left to do this round.
#[derive(Debug, Clone)]
pub struct ActiveWork {
    pub chunks: SmallVec<[Option<ClaimedChunk>; 8]>,
    pub lanes_per_chunk: u32,
}

/// Result of a single `get_work` call.
#[derive(Debug, Clone)]
pub enum BlockWork {
    /// `cur_node_idx == num_nodes`: the run is over.
    Exit,
    /// No claimable work right now; back off and call `get_work` again.
    Loop,
    /// Work was claimed for the block's current node — see `ActiveWork`.
    Active(ActiveWork),
}

/// Drives a pre-sorted DAG of nodes to completion across a simulated grid.
pub struct TaskGraphScheduler {
    nodes: Vec<DagNode>,
    cur_node_idx: AtomicU32,
    pub tracer: TraceRingBuffer,
}

impl TaskGraphScheduler {
    pub fn new(nodes: Vec<DagNode>, trace_capacity: usize) -> Self {
        Self {
            nodes,
            cur_node_idx: AtomicU32::new(0),
            tracer: TraceRingBuffer::new(trace_capacity),
        }
    }

    pub fn num_nodes(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn node(&self, idx: u32) -> &DagNode {
        &self.nodes[idx as usize]
    }

    fn first_non_empty_node(&self, from: u32) -> Option<u32> {
        (from..self.num_nodes()).find(|&i| self.nodes[i as usize].compute_num_invocations() > 0)
    }

    /// One-time, single-thread initialization: resets the tracer and
    /// activates the first non-empty node (or signals immediate exit for
    /// an empty or all-dynamic-zero DAG). Callers must follow this with a
    /// grid-wide barrier before any block calls `get_work`.
    pub fn init(&self) {
        self.tracer.clear();
        self.tracer.push(TraceEvent::calibration());
        match self.first_non_empty_node(0) {
            Some(idx) => {
                self.nodes[idx as usize].start();
                self.tracer
                    .push(TraceEvent::node_start(self.nodes[idx as usize].func_id, idx));
                self.cur_node_idx.store(idx, Ordering::Release);
            }
            None => self.cur_node_idx.store(self.num_nodes(), Ordering::Release),
        }
    }

    /// Resolve (or re-resolve) which node `state` targets. Returns `false`
    /// if the DAG has no more nodes to run.
    fn ensure_assigned(&self, state: &mut SharedBlockState) -> bool {
        if state.init_offset != -1 {
            return true;
        }
        let node_idx = self.cur_node_idx.load(Ordering::Acquire);
        if node_idx == self.num_nodes() {
            return false;
        }
        let node = &self.nodes[node_idx as usize];
        state.node_idx = node_idx as i64;
        state.total = node.total_num_invocations();
        state.func_id = node.func_id;
        state.data_idx = node.data_idx;
        state.num_threads_per_invocation = node.num_threads_per_invocation;
        state.init_offset = 0;
        true
    }

    /// Perform one independent `fetch_add` claim of `group_threads` worth
    /// of invocations against the node `state` is currently assigned to.
    /// `ensure_assigned` must have already succeeded.
    fn claim_chunk(&self, state: &SharedBlockState, group_threads: u32) -> Option<ClaimedChunk> {
        let node = &self.nodes[state.node_idx as usize];
        let tpi = state.num_threads_per_invocation.max(1);
        let claim_count = (group_threads / tpi).max(1);
        let base = node.claim(claim_count);
        if base >= state.total {
            return None;
        }
        Some(ClaimedChunk {
            func_id: state.func_id,
            data_idx: state.data_idx,
            base_offset: base,
            count: claim_count,
            threads_per_invocation: tpi,
            total: state.total,
        })
    }

    /// Acquire the next unit of work for a block with `block_threads`
    /// lanes. `state` persists across calls for one block.
    ///
    /// Claiming granularity follows spec.md §4.4: when the active node's
    /// `threadsPerInvocation` exceeds `WARP_SIZE`, one invocation spans
    /// more than a warp, so the whole block claims together as a single
    /// group. Otherwise each warp's lane 0 claims independently — claiming
    /// once for the whole block and reusing that one claim across every
    /// warp would hand out the same `invocation_offset` range to more than
    /// one warp, since each warp's lanes would re-derive the same base
    /// offset from a claim that was only ever reserved once.
    pub fn get_work(&self, state: &mut SharedBlockState, block_threads: u32) -> BlockWork {
        if !self.ensure_assigned(state) {
            return BlockWork::Exit;
        }

        let tpi = state.num_threads_per_invocation.max(1);

        if tpi > WARP_SIZE {
            return match self.claim_chunk(state, block_threads) {
                Some(chunk) => BlockWork::Active(ActiveWork {
                    chunks: smallvec![Some(chunk)],
                    lanes_per_chunk: block_threads,
                }),
                None => {
                    state.init_offset = -1;
                    BlockWork::Loop
                }
            };
        }

        let num_warps = (block_threads / WARP_SIZE).max(1);
        let mut chunks: SmallVec<[Option<ClaimedChunk>; 8]> = SmallVec::with_capacity(num_warps as usize);
        let mut any_claimed = false;
        for _ in 0..num_warps {
            let chunk = self.claim_chunk(state, WARP_SIZE);
            any_claimed |= chunk.is_some();
            chunks.push(chunk);
        }

        if !any_claimed {
            state.init_offset = -1;
            return BlockWork::Loop;
        }

        BlockWork::Active(ActiveWork {
            chunks,
            lanes_per_chunk: WARP_SIZE,
        })
    }

    /// Account for one claimed chunk's completion. If this call is the
    /// grid-wide retirer (the one whose subtraction zeroed `numRemaining`),
    /// advances the DAG to the next non-empty node (or signals `Exit`).
    pub fn finish_work(&self, state: &SharedBlockState, chunk: &ClaimedChunk) {
        let node_idx = state.node_idx as u32;
        let node = &self.nodes[node_idx as usize];
        let is_retirer = node.finish(chunk.num_finished());
        if is_retirer {
            self.tracer.push(TraceEvent::node_finish(
                node.func_id,
                node_idx,
                chunk.num_finished() as u64,
            ));
            self.advance_past(node_idx + 1);
        }
    }

    fn advance_past(&self, from: u32) {
        match self.first_non_empty_node(from) {
            Some(idx) => {
                self.nodes[idx as usize].start();
                self.tracer
                    .push(TraceEvent::node_start(self.nodes[idx as usize].func_id, idx));
                self.cur_node_idx.store(idx, Ordering::Release);
            }
            None => self.cur_node_idx.store(self.num_nodes(), Ordering::Release),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dag_exits_immediately() {
        let scheduler = TaskGraphScheduler::new(vec![], 16);
        scheduler.init();
        let mut state = SharedBlockState::fresh();
        assert!(matches!(scheduler.get_work(&mut state, 256), BlockWork::Exit));
    }

    #[test]
    fn single_node_single_warp_drains_exactly_its_total() {
        let scheduler = TaskGraphScheduler::new(vec![DagNode::new(1, 0, 8, 0, 1)], 16);
        scheduler.init();
        let mut state = SharedBlockState::fresh();

        let mut claimed = Vec::new();
        loop {
            match scheduler.get_work(&mut state, 8) {
                BlockWork::Exit => break,
                BlockWork::Loop => continue,
                BlockWork::Active(work) => {
                    for maybe_chunk in &work.chunks {
                        let Some(chunk) = maybe_chunk else { continue };
                        for lane in 0..work.lanes_per_chunk {
                            if let Some(offset) = chunk.lane_invocation(lane) {
                                claimed.push(offset);
                            }
                        }
                        scheduler.finish_work(&state, chunk);
                    }
                }
            }
        }
        claimed.sort_unstable();
        claimed.dedup();
        assert_eq!(claimed.len(), 8);
        assert_eq!(scheduler.node(0).num_remaining(), 0);
    }

    #[test]
    fn narrow_node_multi_warp_block_claims_disjoint_ranges() {
        // 256-thread block, threadsPerInvocation = 1: 8 warps, each
        // claiming independently. No two warps may ever be handed the same
        // invocation_offset.
        let scheduler = TaskGraphScheduler::new(vec![DagNode::new(1, 0, 500, 0, 1)], 64);
        scheduler.init();
        let mut state = SharedBlockState::fresh();

        let mut claimed = Vec::new();
        loop {
            match scheduler.get_work(&mut state, 256) {
                BlockWork::Exit => break,
                BlockWork::Loop => continue,
                BlockWork::Active(work) => {
                    assert_eq!(work.chunks.len(), 8);
                    assert_eq!(work.lanes_per_chunk, WARP_SIZE);
                    for maybe_chunk in &work.chunks {
                        let Some(chunk) = maybe_chunk else { continue };
                        for lane in 0..WARP_SIZE {
                            if let Some(offset) = chunk.lane_invocation(lane) {
                                claimed.push(offset);
                            }
                        }
                        scheduler.finish_work(&state, chunk);
                    }
                }
            }
        }

        let total = claimed.len();
        claimed.sort_unstable();
        claimed.dedup();
        assert_eq!(claimed.len(), total, "every invocation offset was claimed at most once");
        assert_eq!(claimed.len(), 500);
        assert_eq!(scheduler.node(0).num_remaining(), 0);
    }

    #[test]
    fn wide_node_claims_once_for_the_whole_block() {
        let scheduler = TaskGraphScheduler::new(vec![DagNode::new(1, 0, 4, 0, 64)], 16);
        scheduler.init();
        let mut state = SharedBlockState::fresh();

        match scheduler.get_work(&mut state, 256) {
            BlockWork::Active(work) => {
                assert_eq!(work.chunks.len(), 1);
                assert_eq!(work.lanes_per_chunk, 256);
            }
            other => panic!("expected active work, got {other:?}"),
        }
    }
}
