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

//! A single scheduling record in the task graph.

use std::sync::atomic::{AtomicU32, Ordering};

/// One node of the pre-sorted DAG the host hands the scheduler.
///
/// `fixed_count == 0` means the invocation count is dynamic, read from
/// `num_dynamic_invocations` at node-start time. The three atomic
/// counters are reset by `start()` with relaxed stores; publishing the
/// node as active is the scheduler's job (a release store of
/// `cur_node_idx` after `start()` returns).
#[derive(Debug)]
pub struct DagNode {
    pub func_id: u32,
    pub data_idx: u32,
    pub fixed_count: u32,
    pub num_dynamic_invocations: u32,
    pub num_threads_per_invocation: u32,
    cur_offset: AtomicU32,
    num_remaining: AtomicU32,
    total_num_invocations: AtomicU32,
}

impl DagNode {
    pub fn new(
        func_id: u32,
        data_idx: u32,
        fixed_count: u32,
        num_dynamic_invocations: u32,
        num_threads_per_invocation: u32,
    ) -> Self {
        assert!(
            num_threads_per_invocation > 0,
            "num_threads_per_invocation must be non-zero"
        );
        Self {
            func_id,
            data_idx,
            fixed_count,
            num_dynamic_invocations,
            num_threads_per_invocation,
            cur_offset: AtomicU32::new(0),
            num_remaining: AtomicU32::new(0),
            total_num_invocations: AtomicU32::new(0),
        }
    }

    /// `fixedCount` if non-zero, otherwise the dynamic invocation count.
    pub fn compute_num_invocations(&self) -> u32 {
        if self.fixed_count != 0 {
            self.fixed_count
        } else {
            self.num_dynamic_invocations
        }
    }

    /// Reset this node's counters for an active run. Relaxed stores: the
    /// scheduler is responsible for publishing the node via a release
    /// store of `cur_node_idx` strictly after this call returns.
    pub(crate) fn start(&self) {
        let total = self.compute_num_invocations();
        self.cur_offset.store(0, Ordering::Relaxed);
        self.num_remaining.store(total, Ordering::Relaxed);
        self.total_num_invocations.store(total, Ordering::Relaxed);
    }

    pub fn total_num_invocations(&self) -> u32 {
        self.total_num_invocations.load(Ordering::Relaxed)
    }

    pub fn num_remaining(&self) -> u32 {
        self.num_remaining.load(Ordering::Acquire)
    }

    pub fn cur_offset(&self) -> u32 {
        self.cur_offset.load(Ordering::Relaxed)
    }

    /// Claim `count` invocation slots, returning the base offset.
    pub(crate) fn claim(&self, count: u32) -> u32 {
        self.cur_offset.fetch_add(count, Ordering::Relaxed)
    }

    /// Account for `count` finished invocations. Returns `true` if the
    /// pre-subtraction value equaled `count` exactly — the caller is the
    /// grid-wide retirer for this node.
    pub(crate) fn finish(&self, count: u32) -> bool {
        if count == 0 {
            return false;
        }
        let before = self.num_remaining.fetch_sub(count, Ordering::AcqRel);
        before == count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_count_wins_over_dynamic() {
        let node = DagNode::new(1, 0, 8, 99, 1);
        assert_eq!(node.compute_num_invocations(), 8);
    }

    #[test]
    fn zero_fixed_count_falls_back_to_dynamic() {
        let node = DagNode::new(1, 0, 0, 3, 1);
        assert_eq!(node.compute_num_invocations(), 3);
    }

    #[test]
    fn start_initializes_counters_from_computed_total() {
        let node = DagNode::new(1, 0, 4, 0, 1);
        node.start();
        assert_eq!(node.total_num_invocations(), 4);
        assert_eq!(node.num_remaining(), 4);
        assert_eq!(node.cur_offset(), 0);
    }

    #[test]
    fn finish_reports_retirer_only_on_final_subtraction() {
        let node = DagNode::new(1, 0, 10, 0, 1);
        node.start();
        assert!(!node.finish(4));
        assert_eq!(node.num_remaining(), 6);
        assert!(!node.finish(5));
        assert_eq!(node.num_remaining(), 1);
        assert!(node.finish(1));
        assert_eq!(node.num_remaining(), 0);
    }
}
