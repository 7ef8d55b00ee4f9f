//! Uniform adapter over externally provided priority queues.
//!
//! The external structures come with process-wide quirks that the benchmark
//! code must not see: reserved low keys, sentinel keys signalling emptiness,
//! a global garbage-collection subsystem, per-thread registration, and one
//! that crashes unless an element is inserted right before destruction. The
//! adapter owns all of them behind the common handle contract.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::error::Error;
use crate::{ConcurrentPriorityQueue, PqHandle};

/// Raw surface of an external queue plus its capability flags.
///
/// Invariant at this boundary: no pushed key may reach `SENTINEL` after the
/// shift, since the sentinel is how the structure reports an empty pop.
pub trait ExternalQueue: Send + Sync + Sized + 'static {
    /// Key returned by `raw_pop_min` when the structure observed empty.
    const SENTINEL: u64;
    /// Added to keys on push and removed on pop; structures reserving key 0
    /// use a shift of 1.
    const KEY_SHIFT: u64 = 0;
    /// Process-wide GC subsystem: init before the first live queue, teardown
    /// after the last.
    const NEEDS_GC: bool = false;
    /// The destructor must insert one element before destroying the queue.
    const PUSH_BEFORE_DESTROY: bool = false;
    /// Threads must register themselves before their first operation.
    const THREAD_INIT: bool = false;

    fn create(num_threads: usize) -> Result<Self, String>;
    fn raw_push(&self, key: u64, value: u64);
    /// Returns `(SENTINEL, _)` when empty.
    fn raw_pop_min(&self) -> (u64, u64);
    fn raw_init_thread(&self, _num_threads: usize) {}
    fn gc_init() {}
    fn gc_teardown() {}
    fn name() -> &'static str;
}

// One refcount for the whole process: the external GC subsystem is a
// singleton shared by every queue instance.
static LIVE_GC_USERS: AtomicUsize = AtomicUsize::new(0);

struct GcLifetime<Q: ExternalQueue> {
    _marker: PhantomData<Q>,
}

impl<Q: ExternalQueue> GcLifetime<Q> {
    fn acquire() -> Self {
        if LIVE_GC_USERS.fetch_add(1, Ordering::AcqRel) == 0 {
            debug!(queue = Q::name(), "initializing gc subsystem");
            Q::gc_init();
        }
        Self {
            _marker: PhantomData,
        }
    }
}

impl<Q: ExternalQueue> Drop for GcLifetime<Q> {
    fn drop(&mut self) {
        if LIVE_GC_USERS.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!(queue = Q::name(), "tearing down gc subsystem");
            Q::gc_teardown();
        }
    }
}

/// Adapter implementing the common queue contract over an [`ExternalQueue`].
pub struct Wrapper<Q: ExternalQueue> {
    inner: Q,
    num_threads: usize,
    // Declared after `inner`: the GC subsystem must outlive the queue's own
    // destructor.
    _gc: Option<GcLifetime<Q>>,
}

impl<Q: ExternalQueue> Wrapper<Q> {
    pub fn new(num_threads: usize) -> Result<Self, Error> {
        let gc = Q::NEEDS_GC.then(GcLifetime::<Q>::acquire);
        let inner = Q::create(num_threads).map_err(Error::WrapperInit)?;
        Ok(Self {
            inner,
            num_threads,
            _gc: gc,
        })
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}

impl<Q: ExternalQueue> Drop for Wrapper<Q> {
    fn drop(&mut self) {
        if Q::PUSH_BEFORE_DESTROY {
            // The underlying destructor dereferences the head; give it one.
            self.inner.raw_push(1, 1);
        }
    }
}

pub struct WrapperHandle<'a, Q: ExternalQueue> {
    queue: &'a Wrapper<Q>,
}

impl<Q: ExternalQueue> PqHandle for WrapperHandle<'_, Q> {
    type Key = u64;
    type Value = u64;

    fn init_thread(&mut self, num_threads: usize) {
        if Q::THREAD_INIT {
            self.queue.inner.raw_init_thread(num_threads);
        }
    }

    fn push(&mut self, key: u64, value: u64) {
        let shifted = key + Q::KEY_SHIFT;
        debug_assert!(shifted != Q::SENTINEL, "key collides with the empty sentinel");
        self.queue.inner.raw_push(shifted, value);
    }

    fn try_pop(&mut self) -> Option<(u64, u64)> {
        let (key, value) = self.queue.inner.raw_pop_min();
        if key == Q::SENTINEL {
            return None;
        }
        Some((key - Q::KEY_SHIFT, value))
    }
}

impl<Q: ExternalQueue> ConcurrentPriorityQueue for Wrapper<Q> {
    type Key = u64;
    type Value = u64;
    type Handle<'a>
        = WrapperHandle<'a, Q>
    where
        Self: 'a;

    fn handle(&self, _id: usize) -> WrapperHandle<'_, Q> {
        WrapperHandle { queue: self }
    }

    fn description(&self) -> String {
        format!("wrapper ({})", Q::name())
    }
}
