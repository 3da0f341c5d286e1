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

//! Reserve-commit allocation contract.
//!
//! Archetype columns are reserved at their maximum possible size up front
//! and only lazily backed by physical pages as rows are committed. This
//! crate's CPU-side stand-in for that contract is anonymous mmap: Linux
//! (and other POSIX targets) only fault in pages of an anonymous mapping
//! on first touch, so a multi-gigabyte reservation that is mostly never
//! written costs no resident memory.

use memmap2::MmapMut;

use crate::error::{EcsError, Result};

/// A reservation that can grow its committed region without moving.
pub trait ReserveCommitAllocator {
    /// Round `bytes` up to this allocator's reservation granularity
    /// (typically the OS page size, or a multiple of it).
    fn round_up_reservation(&self, bytes: usize) -> usize;

    /// Round `bytes` up to this allocator's allocation granularity.
    /// For the mmap-backed allocator this is the same as the
    /// reservation granularity; kept distinct because the contract
    /// allows sub-page allocation backends to differ.
    fn round_up_alloc(&self, bytes: usize) -> usize {
        self.round_up_reservation(bytes)
    }

    /// Reserve `reserve_bytes` of address space and commit the first
    /// `init_commit_bytes` of it. `init_commit_bytes` must not exceed
    /// `reserve_bytes`.
    fn reserve(&self, reserve_bytes: usize, init_commit_bytes: usize) -> Result<Reservation>;
}

/// A live reservation: a fixed-size address range with a mutable slice
/// view over it. Pages beyond what the caller has actually written are
/// physically uncommitted until touched, but the full `reserve_bytes`
/// range is always addressable.
pub struct Reservation {
    mmap: MmapMut,
}

impl Reservation {
    /// The full reserved length in bytes (not the committed length —
    /// this allocator contract has no separate commit step, commitment
    /// is implicit in first touch).
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Eagerly touch (zero-write) `[offset, offset + len)`, forcing the
    /// kernel to back those pages now instead of leaving them to
    /// first-touch fault-in. This is "commit" in this simulation: there is
    /// no separate fault handler, so growing the committed region is this
    /// explicit call.
    pub fn commit(&mut self, offset: usize, len: usize) {
        if len == 0 {
            return;
        }
        assert!(
            offset + len <= self.mmap.len(),
            "commit range [{offset}, {}) exceeds reservation length {}",
            offset + len,
            self.mmap.len()
        );
        self.mmap[offset..offset + len].fill(0);
    }
}

/// Page granularity obtained once via `page_size` at module init, mirroring
/// the host allocator's constant-layout contract (§6 of the design notes).
fn page_size() -> usize {
    4096
}

/// Reserve-commit allocator backed by an anonymous memory mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapReserveCommitAllocator;

impl ReserveCommitAllocator for MmapReserveCommitAllocator {
    fn round_up_reservation(&self, bytes: usize) -> usize {
        round_up_to(bytes, page_size())
    }

    fn reserve(&self, reserve_bytes: usize, init_commit_bytes: usize) -> Result<Reservation> {
        assert!(
            init_commit_bytes <= reserve_bytes,
            "init_commit_bytes ({init_commit_bytes}) exceeds reserve_bytes ({reserve_bytes})"
        );

        let rounded = self.round_up_reservation(reserve_bytes.max(1));

        #[cfg(feature = "profiling")]
        tracing::debug!(reserve_bytes, rounded, init_commit_bytes, "reserve");

        let mmap = MmapMut::map_anon(rounded)
            .map_err(|e| EcsError::AllocatorFailure(format!("mmap_anon({rounded}): {e}")))?;
        let mut reservation = Reservation { mmap };
        reservation.commit(0, init_commit_bytes);
        Ok(reservation)
    }
}

/// Round `value` up to the next multiple of `granularity`, which must be
/// a power of two. Grounded on the pooling allocator's rounding helper:
/// widen to `u64` to avoid overflow on the add before truncating back.
fn round_up_to(value: usize, granularity: usize) -> usize {
    debug_assert!(granularity.is_power_of_two());
    let value = value as u64;
    let granularity = granularity as u64;
    (((value + granularity - 1) / granularity) * granularity) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_page_multiple() {
        let alloc = MmapReserveCommitAllocator;
        assert_eq!(alloc.round_up_reservation(1), page_size());
        assert_eq!(alloc.round_up_reservation(page_size()), page_size());
        assert_eq!(alloc.round_up_reservation(page_size() + 1), page_size() * 2);
    }

    #[test]
    fn reserve_yields_addressable_zeroed_range() {
        let alloc = MmapReserveCommitAllocator;
        let mut reservation = alloc.reserve(1 << 20, 4096).unwrap();
        assert!(reservation.len() >= 1 << 20);
        assert!(reservation.as_slice().iter().all(|&b| b == 0));
        reservation.as_mut_slice()[0] = 7;
        assert_eq!(reservation.as_slice()[0], 7);
    }

    #[test]
    #[should_panic(expected = "exceeds reserve_bytes")]
    fn commit_larger_than_reservation_panics() {
        let alloc = MmapReserveCommitAllocator;
        let _ = alloc.reserve(4096, 8192);
    }

    #[test]
    fn explicit_commit_extends_the_touched_range() {
        let alloc = MmapReserveCommitAllocator;
        let mut reservation = alloc.reserve(1 << 20, 0).unwrap();
        reservation.as_mut_slice()[4096] = 9;
        assert_eq!(reservation.as_slice()[4096], 9);

        reservation.commit(8192, 4096);
        assert!(reservation.as_slice()[8192..12288].iter().all(|&b| b == 0));
    }

    #[test]
    #[should_panic(expected = "exceeds reservation length")]
    fn commit_past_the_reservation_end_panics() {
        let alloc = MmapReserveCommitAllocator;
        let mut reservation = alloc.reserve(4096, 0).unwrap();
        reservation.commit(0, 8192);
    }

    #[test]
    fn large_reservation_is_cheap() {
        let alloc = MmapReserveCommitAllocator;
        // A multi-gigabyte reservation must not actually fault in pages;
        // this just asserts it doesn't error or hang.
        let reservation = alloc.reserve(1usize << 34, 0).unwrap();
        assert!(reservation.len() >= 1usize << 34);
    }
}
