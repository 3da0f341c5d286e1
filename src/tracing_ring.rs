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

//! Bounded, best-effort tracing ring buffer for scheduler boundary events.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// One of the notable scheduler boundaries a trace event marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceTag {
    Calibration,
    NodeStart,
    NodeFinish,
    BlockStart,
    BlockWait,
    BlockExit,
}

/// A single host-visible artifact record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    pub tag: TraceTag,
    pub func_id: u32,
    pub a: u64,
    pub b: u64,
    pub node_idx: u32,
}

impl TraceEvent {
    pub fn calibration() -> Self {
        Self {
            tag: TraceTag::Calibration,
            func_id: 0,
            a: 0,
            b: 0,
            node_idx: 0,
        }
    }

    pub fn node_start(func_id: u32, node_idx: u32) -> Self {
        Self {
            tag: TraceTag::NodeStart,
            func_id,
            a: 0,
            b: 0,
            node_idx,
        }
    }

    pub fn node_finish(func_id: u32, node_idx: u32, num_finished: u64) -> Self {
        Self {
            tag: TraceTag::NodeFinish,
            func_id,
            a: num_finished,
            b: 0,
            node_idx,
        }
    }

    pub fn block_start(block_id: u32) -> Self {
        Self {
            tag: TraceTag::BlockStart,
            func_id: 0,
            a: block_id as u64,
            b: 0,
            node_idx: 0,
        }
    }

    pub fn block_wait(block_id: u32) -> Self {
        Self {
            tag: TraceTag::BlockWait,
            func_id: 0,
            a: block_id as u64,
            b: 0,
            node_idx: 0,
        }
    }

    pub fn block_exit(block_id: u32) -> Self {
        Self {
            tag: TraceTag::BlockExit,
            func_id: 0,
            a: block_id as u64,
            b: 0,
            node_idx: 0,
        }
    }
}

/// Fixed-capacity ring buffer of trace events. The write index is a single
/// atomic counter; concurrent writers that land on the same slot after a
/// wraparound race benignly — the tracer is best-effort and overflow is
/// allowed to silently clobber older entries, matching the device-side
/// contract this stands in for.
pub struct TraceRingBuffer {
    slots: Vec<Mutex<Option<TraceEvent>>>,
    next_index: AtomicU64,
}

impl TraceRingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "trace ring buffer capacity must be non-zero");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Mutex::new(None));
        Self {
            slots,
            next_index: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Append an event, overwriting the oldest slot on overflow.
    pub fn push(&self, event: TraceEvent) {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let slot = index as usize % self.slots.len();
        *self.slots[slot].lock() = Some(event);

        #[cfg(feature = "profiling")]
        tracing::trace!(?event, "trace_event");
    }

    /// Total events ever pushed, including ones since overwritten.
    pub fn total_pushed(&self) -> u64 {
        self.next_index.load(Ordering::Relaxed)
    }

    /// Reset to empty. Called once at the start of each run (`init`).
    pub fn clear(&self) {
        self.next_index.store(0, Ordering::Relaxed);
        for slot in &self.slots {
            *slot.lock() = None;
        }
    }

    /// Drain the currently-populated slots, in slot order. The host drains
    /// between runs; ordering within a single run beyond slot order is not
    /// guaranteed once overflow has occurred.
    pub fn drain(&self) -> Vec<TraceEvent> {
        self.slots.iter().filter_map(|slot| *slot.lock()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_drain_round_trips() {
        let ring = TraceRingBuffer::new(4);
        ring.push(TraceEvent::calibration());
        ring.push(TraceEvent::node_start(7, 0));
        let events = ring.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tag, TraceTag::Calibration);
        assert_eq!(events[1].tag, TraceTag::NodeStart);
    }

    #[test]
    fn overflow_wraps_without_panicking() {
        let ring = TraceRingBuffer::new(2);
        for i in 0..10 {
            ring.push(TraceEvent::node_start(i, i));
        }
        assert_eq!(ring.total_pushed(), 10);
        assert_eq!(ring.drain().len(), 2);
    }

    #[test]
    fn clear_resets_to_empty() {
        let ring = TraceRingBuffer::new(4);
        ring.push(TraceEvent::calibration());
        ring.clear();
        assert!(ring.drain().is_empty());
        assert_eq!(ring.total_pushed(), 0);
    }
}
