use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::heap::DaryHeap;
use crate::Key;

/// One sequential heap plus its try-lock and the published top key.
///
/// The shard array wraps every shard in `CachePadded` (2x the L1 line on
/// x86-64), so neighbouring shards never share a line.
///
/// Invariant: while unlocked, `top_key` holds the bits of the heap root, or
/// `K::EMPTY` when the heap is empty. The holder republishes it with release
/// semantics before clearing the lock, so lock-free readers pair their
/// acquire load with the last unlock.
#[derive(Debug)]
pub(crate) struct Shard<K: Key, V> {
    lock: AtomicBool,
    top_key: AtomicU64,
    heap: UnsafeCell<DaryHeap<K, V>>,
}

// The heap behind the UnsafeCell is only touched while `lock` is held.
unsafe impl<K: Key, V: Copy + Send> Sync for Shard<K, V> {}
unsafe impl<K: Key, V: Copy + Send> Send for Shard<K, V> {}

impl<K: Key, V: Copy> Shard<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            lock: AtomicBool::new(false),
            top_key: AtomicU64::new(K::EMPTY.into_bits()),
            heap: UnsafeCell::new(DaryHeap::new()),
        }
    }

    /// Single-word CAS 0 -> 1. Contention shows up as a `false` return; the
    /// caller retries elsewhere.
    #[inline]
    pub(crate) fn try_lock(&self) -> bool {
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Publishes the current root, then releases the lock. Only the lock
    /// holder may call this.
    #[inline]
    pub(crate) fn unlock(&self) {
        let top = unsafe { (*self.heap.get()).top().map_or(K::EMPTY, |e| e.0) };
        self.top_key.store(top.into_bits(), Ordering::Release);
        self.lock.store(false, Ordering::Release);
    }

    /// Published top key bits; `K::EMPTY` bits mean the shard observed empty.
    /// Readable without the lock.
    #[inline]
    pub(crate) fn top_bits(&self) -> u64 {
        self.top_key.load(Ordering::Acquire)
    }

    /// Access to the heap. Only valid between a successful `try_lock` and the
    /// matching `unlock`.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn heap_mut(&self) -> &mut DaryHeap<K, V> {
        &mut *self.heap.get()
    }
}
