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

//! End-to-end task-graph scenarios.

use std::sync::Mutex;

use megakernel_ecs::dag::run_grid;
use megakernel_ecs::{DagNode, TraceTag, TaskGraphScheduler};

#[test]
fn empty_dag_all_blocks_exit_immediately() {
    let scheduler = TaskGraphScheduler::new(vec![], 32);
    run_grid(&scheduler, 4, 16, |_| panic!("no node exists to produce an invocation"));

    let events = scheduler.tracer.drain();
    assert_eq!(events.iter().filter(|e| e.tag == TraceTag::Calibration).count(), 1);
    assert_eq!(events.iter().filter(|e| e.tag == TraceTag::BlockExit).count(), 4);
}

#[test]
fn single_node_fixed_dag_runs_every_invocation_exactly_once() {
    let scheduler = TaskGraphScheduler::new(vec![DagNode::new(1, 0, 1024, 0, 1)], 64);
    let seen = Mutex::new(vec![false; 1024]);

    run_grid(&scheduler, 4, 256, |outcome| {
        let mut seen = seen.lock().unwrap();
        assert!(!seen[outcome.invocation_offset as usize], "invocation ran twice");
        seen[outcome.invocation_offset as usize] = true;
    });

    assert!(seen.into_inner().unwrap().into_iter().all(|ran| ran));
    assert_eq!(scheduler.node(0).num_remaining(), 0);
    assert_eq!(scheduler.node(0).cur_offset(), 1024);
}

#[test]
fn dynamic_zero_node_is_skipped_and_never_traced() {
    let scheduler = TaskGraphScheduler::new(
        vec![
            DagNode::new(1, 0, 8, 0, 1),
            DagNode::new(2, 0, 0, 0, 1),
            DagNode::new(3, 0, 4, 0, 1),
        ],
        64,
    );
    let seen = Mutex::new(Vec::new());
    run_grid(&scheduler, 2, 8, |outcome| seen.lock().unwrap().push(outcome.node_idx));

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.iter().filter(|&&n| n == 0).count(), 8);
    assert_eq!(seen.iter().filter(|&&n| n == 1).count(), 0);
    assert_eq!(seen.iter().filter(|&&n| n == 2).count(), 4);

    let node_starts: Vec<u32> = scheduler
        .tracer
        .drain()
        .into_iter()
        .filter(|e| e.tag == TraceTag::NodeStart)
        .map(|e| e.node_idx)
        .collect();
    assert_eq!(node_starts, vec![0, 2]);
    assert_eq!(scheduler.node(1).num_remaining(), 0);
}

#[test]
fn narrow_invocation_leaves_a_partial_final_warp() {
    // totalNumInvocations = 33, threadsPerInvocation = 1: two 32-wide warp
    // claims, the second of which only has one real invocation to give out.
    let scheduler = TaskGraphScheduler::new(vec![DagNode::new(1, 0, 33, 0, 1)], 64);
    let seen = Mutex::new(Vec::new());
    run_grid(&scheduler, 1, 32, |outcome| seen.lock().unwrap().push(outcome.invocation_offset));

    let mut seen = seen.into_inner().unwrap();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen, (0..33).collect::<Vec<_>>());
    assert_eq!(scheduler.node(0).num_remaining(), 0);
}

#[test]
fn narrow_invocation_partial_warp_lane_accounting() {
    use megakernel_ecs::{BlockWork, SharedBlockState};

    let scheduler = TaskGraphScheduler::new(vec![DagNode::new(1, 0, 33, 0, 1)], 8);
    scheduler.init();
    let mut state = SharedBlockState::fresh();

    let first = match scheduler.get_work(&mut state, 32) {
        BlockWork::Active(work) => work.chunks[0].expect("single-warp block always claims"),
        other => panic!("expected work, got {other:?}"),
    };
    let ran_first: Vec<u32> = (0..32).filter_map(|l| first.lane_invocation(l)).collect();
    assert_eq!(ran_first.len(), 32);
    scheduler.finish_work(&state, &first);

    let second = match scheduler.get_work(&mut state, 32) {
        BlockWork::Active(work) => work.chunks[0].expect("single-warp block always claims"),
        other => panic!("expected a second claim, got {other:?}"),
    };
    let ran_second: Vec<u32> = (0..32).filter_map(|l| second.lane_invocation(l)).collect();
    assert_eq!(ran_second, vec![32]);
    scheduler.finish_work(&state, &second);

    assert_eq!(scheduler.node(0).num_remaining(), 0);
}
