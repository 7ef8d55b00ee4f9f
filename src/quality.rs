//! Event logging for the quality benchmark: value tagging and fenced
//! realtime ticks.
//!
//! Popped values must identify their insertion, so inserted values carry
//! `(producer thread, per-thread sequence number)` packed into the payload.
//! Tick stamps bracket the queue operation with load fences on both sides;
//! without them speculation can move the clock read across the operation and
//! bias the offline rank/delay analysis.

use nix::time::{clock_gettime, ClockId};

/// High bits of a value reserved for the producer thread id.
pub const BITS_FOR_THREAD_ID: u32 = 8;

const VALUE_MASK: u64 = (1 << (u64::BITS - BITS_FOR_THREAD_ID)) - 1;

/// Largest thread count representable in the value tag.
pub const MAX_THREADS: usize = (1 << BITS_FOR_THREAD_ID) - 1;

#[inline]
pub const fn to_value(thread_id: usize, elem_id: u64) -> u64 {
    ((thread_id as u64) << (u64::BITS - BITS_FOR_THREAD_ID)) | (elem_id & VALUE_MASK)
}

#[inline]
pub const fn thread_id(value: u64) -> usize {
    (value >> (u64::BITS - BITS_FOR_THREAD_ID)) as usize
}

#[inline]
pub const fn elem_id(value: u64) -> u64 {
    value & VALUE_MASK
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionLogEntry {
    pub tick: u64,
    pub key: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionLogEntry {
    pub tick: u64,
    pub value: u64,
}

/// One worker's complete event record, moved out after the join.
#[derive(Debug, Default)]
pub struct ThreadLog {
    pub insertions: Vec<InsertionLogEntry>,
    pub deletions: Vec<DeletionLogEntry>,
    pub failed_deletions: Vec<u64>,
}

#[inline]
fn load_fence() {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::x86_64::_mm_lfence()
    };
    #[cfg(not(target_arch = "x86_64"))]
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}

/// CLOCK_REALTIME in nanoseconds, bracketed by load fences so the read cannot
/// be reordered across the surrounding queue operation.
#[inline]
pub fn fenced_tick() -> u64 {
    load_fence();
    // CLOCK_REALTIME does not fail on Linux.
    let tick = clock_gettime(ClockId::CLOCK_REALTIME)
        .map_or(0, |ts| ts.tv_sec() as u64 * 1_000_000_000 + ts.tv_nsec() as u64);
    load_fence();
    tick
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_tag_round_trip() {
        for tid in [0usize, 1, 7, 255] {
            for elem in [0u64, 1, 42, VALUE_MASK] {
                let value = to_value(tid, elem);
                assert_eq!(thread_id(value), tid);
                assert_eq!(elem_id(value), elem);
            }
        }
    }

    #[test]
    fn elem_id_truncates_to_mask() {
        let value = to_value(3, VALUE_MASK + 5);
        assert_eq!(thread_id(value), 3);
        assert_eq!(elem_id(value), 4);
    }

    #[test]
    fn ticks_are_monotone_enough() {
        let a = fenced_tick();
        let b = fenced_tick();
        assert!(b >= a);
    }
}
