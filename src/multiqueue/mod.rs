//! The canonical in-tree relaxed priority queue: many sequential heaps behind
//! try-locks, random two-choice selection, optional per-handle buffers and
//! stickiness.
//!
//! A popped element is *some* element of the multiset with probabilistically
//! bounded rank error, not necessarily the global minimum.

mod handle;
mod shard;

use crossbeam_utils::CachePadded;

use crate::{ConcurrentPriorityQueue, Key};
pub use handle::{HandleStats, MqHandle};
use shard::Shard;

/// Tuning knobs. `c` shards per thread; `stickiness` operations before a
/// handle resamples its shard; buffer sizes of 0 disable the buffers.
#[derive(Debug, Clone, Copy)]
pub struct MultiQueueConfig {
    pub c: usize,
    pub stickiness: u32,
    pub insertion_buffer_size: usize,
    pub deletion_buffer_size: usize,
}

impl Default for MultiQueueConfig {
    fn default() -> Self {
        Self {
            c: 4,
            stickiness: 8,
            insertion_buffer_size: 16,
            deletion_buffer_size: 16,
        }
    }
}

pub struct MultiQueue<K: Key, V: Copy + Send> {
    shards: Box<[CachePadded<Shard<K, V>>]>,
    config: MultiQueueConfig,
    num_threads: usize,
    seed: u64,
}

impl<K: Key, V: Copy + Send> MultiQueue<K, V> {
    pub fn new(num_threads: usize, seed: u64) -> Self {
        Self::with_config(num_threads, seed, MultiQueueConfig::default())
    }

    pub fn with_config(num_threads: usize, seed: u64, config: MultiQueueConfig) -> Self {
        assert!(num_threads > 0, "need at least one thread");
        assert!(config.c > 0, "need at least one shard per thread");
        let shards = (0..config.c * num_threads)
            .map(|_| CachePadded::new(Shard::new()))
            .collect();
        Self {
            shards,
            config,
            num_threads,
            seed,
        }
    }

    /// One handle per thread id; the handle owns all per-thread state.
    pub fn handle(&self, id: usize) -> MqHandle<'_, K, V> {
        MqHandle::new(self, id)
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub(crate) fn num_shards(&self) -> usize {
        self.shards.len()
    }

    pub(crate) fn config(&self) -> &MultiQueueConfig {
        &self.config
    }

    pub(crate) fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    pub(crate) fn shard(&self, index: usize) -> &Shard<K, V> {
        &self.shards[index]
    }
}

impl<K: Key, V: Copy + Send> ConcurrentPriorityQueue for MultiQueue<K, V> {
    type Key = K;
    type Value = V;
    type Handle<'a>
        = MqHandle<'a, K, V>
    where
        Self: 'a;

    fn handle(&self, id: usize) -> MqHandle<'_, K, V> {
        MultiQueue::handle(self, id)
    }

    fn description(&self) -> String {
        format!(
            "multiqueue (C={}, stickiness={}, ibs={}, dbs={})",
            self.config.c,
            self.config.stickiness,
            self.config.insertion_buffer_size,
            self.config.deletion_buffer_size
        )
    }
}
