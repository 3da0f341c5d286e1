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

//! CPU simulation of the grid / block / warp / lane hierarchy.
//!
//! Blocks run as OS threads inside a scope; lanes within a block are
//! simulated sequentially on that one thread, since there is no SIMT
//! hardware to give them independent forward progress on the host. A
//! single `Barrier` stands in for the device's grid-wide launch sync:
//! block 0 calls `scheduler.init()` before any block observes
//! `cur_node_idx`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;

use crossbeam::utils::Backoff;

use crate::dag::scheduler::{BlockWork, SharedBlockState, TaskGraphScheduler};
use crate::tracing_ring::TraceEvent;

/// Outcome for one lane of one claimed chunk, collected for test
/// observation of the at-most-once / completion invariants.
#[derive(Debug, Clone, Copy)]
pub struct LaneOutcome {
    pub node_idx: u32,
    pub invocation_offset: u32,
}

/// Run the scheduler to completion across `num_blocks` simulated blocks,
/// each with `block_threads` lanes. `on_invocation` is called once per
/// lane that actually runs (i.e. `ClaimedChunk::lane_invocation` returned
/// `Some`), from whichever block thread claimed it; it must be safe to
/// call concurrently from multiple blocks.
pub fn run_grid<F>(scheduler: &TaskGraphScheduler, num_blocks: u32, block_threads: u32, on_invocation: F)
where
    F: Fn(LaneOutcome) + Sync,
{
    let barrier = Barrier::new(num_blocks as usize);
    let initialized = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for block_id in 0..num_blocks {
            let barrier = &barrier;
            let initialized = &initialized;
            let on_invocation = &on_invocation;
            scope.spawn(move || {
                scheduler.tracer.push(TraceEvent::block_start(block_id));

                if block_id == 0 {
                    scheduler.init();
                    initialized.store(true, Ordering::Release);
                }
                barrier.wait();
                while !initialized.load(Ordering::Acquire) {
                    std::hint::spin_loop();
                }

                let mut state = SharedBlockState::fresh();
                let backoff = Backoff::new();
                loop {
                    match scheduler.get_work(&mut state, block_threads) {
                        BlockWork::Exit => break,
                        BlockWork::Loop => {
                            scheduler.tracer.push(TraceEvent::block_wait(block_id));
                            backoff.snooze();
                            continue;
                        }
                        BlockWork::Active(work) => {
                            backoff.reset();
                            let node_idx = state.node_idx().expect("active chunk implies assigned node");
                            for chunk in work.chunks.iter().flatten() {
                                for lane in 0..work.lanes_per_chunk {
                                    if let Some(offset) = chunk.lane_invocation(lane) {
                                        on_invocation(LaneOutcome {
                                            node_idx,
                                            invocation_offset: offset,
                                        });
                                    }
                                }
                                scheduler.finish_work(&state, chunk);
                            }
                        }
                    }
                }

                scheduler.tracer.push(TraceEvent::block_exit(block_id));
            });
        }
    });
}
