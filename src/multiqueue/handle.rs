use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::multiqueue::MultiQueue;
use crate::{Key, PqHandle};

/// Per-handle operation counters, kept unconditionally; they are single-owner
/// plain fields and cost nothing on the hot path.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandleStats {
    /// Failed shard try-locks.
    pub num_locking_failed: u64,
    /// Stickiness resamples.
    pub num_resets: u64,
    /// Operations served by a sticky shard, including the one that sampled it.
    pub use_counts: u64,
}

/// A thread's view of a [`MultiQueue`].
///
/// Owns the selection RNG, the two sticky shard slots and the optional
/// insertion/deletion buffers. Exactly one handle per `id` may be live at a
/// time; the handle is not `Sync` and must stay on its thread.
pub struct MqHandle<'a, K: Key, V: Copy + Send> {
    mq: &'a MultiQueue<K, V>,
    id: usize,
    rng: SmallRng,
    push_index: usize,
    push_budget: u32,
    pop_index: usize,
    pop_budget: u32,
    insertion_buffer: Vec<(K, V)>,
    deletion_buffer: Vec<(K, V)>,
    stats: HandleStats,
}

impl<'a, K: Key, V: Copy + Send> MqHandle<'a, K, V> {
    pub(crate) fn new(mq: &'a MultiQueue<K, V>, id: usize) -> Self {
        assert!(id < mq.num_threads(), "handle id out of range");
        Self {
            mq,
            id,
            rng: SmallRng::seed_from_u64(
                mq.seed().wrapping_add((id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            ),
            push_index: 0,
            push_budget: 0,
            pop_index: 0,
            pop_budget: 0,
            insertion_buffer: Vec::with_capacity(mq.config().insertion_buffer_size),
            deletion_buffer: Vec::with_capacity(mq.config().deletion_buffer_size),
            stats: HandleStats::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn stats(&self) -> HandleStats {
        self.stats
    }

    /// Elements are eventually extractable by some handle. Keys must stay
    /// below `K::EMPTY`.
    pub fn push(&mut self, key: K, value: V) {
        debug_assert!(key < K::EMPTY, "key range reserved for the empty sentinel");
        let ibs = self.mq.config().insertion_buffer_size;
        if ibs > 0 {
            self.insertion_buffer.push((key, value));
            if self.insertion_buffer.len() >= ibs {
                self.flush_insertion_buffer();
            }
            return;
        }
        let index = self.acquire_push_shard();
        let shard = self.mq.shard(index);
        unsafe { shard.heap_mut() }.push(key, value);
        shard.unlock();
    }

    /// `None` means both sampled shards observed empty. The multiset may still
    /// hold elements; callers retry or run a termination protocol.
    pub fn try_pop(&mut self) -> Option<(K, V)> {
        if let Some(item) = self.deletion_buffer.pop() {
            return Some(item);
        }
        // Owned elements must stay reachable through our own pops.
        self.flush_insertion_buffer();
        let index = self.acquire_pop_shard()?;
        let shard = self.mq.shard(index);
        let heap = unsafe { shard.heap_mut() };
        let first = heap.pop();
        debug_assert!(first.is_some());
        let dbs = self.mq.config().deletion_buffer_size;
        if dbs > 1 {
            for _ in 1..dbs {
                match heap.pop() {
                    Some(item) => self.deletion_buffer.push(item),
                    None => break,
                }
            }
            // Ascending from the heap; keep the buffer descending so the next
            // minimum sits at the back.
            self.deletion_buffer.reverse();
        }
        shard.unlock();
        first
    }

    /// Scans the handle's own shard partition and pops the smallest published
    /// root. `None` only when every shard of the partition observed empty.
    /// Used as the last probe before a thread declares itself idle.
    pub fn pop_from_partition(&mut self) -> Option<(K, V)> {
        if let Some(item) = self.deletion_buffer.pop() {
            return Some(item);
        }
        self.flush_insertion_buffer();
        let c = self.mq.config().c;
        let base = self.id * c;
        loop {
            let mut best: Option<(usize, u64)> = None;
            for index in base..base + c {
                let bits = self.mq.shard(index).top_bits();
                if bits != K::EMPTY.into_bits() && best.map_or(true, |(_, b)| bits < b) {
                    best = Some((index, bits));
                }
            }
            let (index, _) = best?;
            let shard = self.mq.shard(index);
            if !shard.try_lock() {
                self.stats.num_locking_failed += 1;
                std::hint::spin_loop();
                continue;
            }
            let item = unsafe { shard.heap_mut() }.pop();
            shard.unlock();
            match item {
                Some(item) => return Some(item),
                // Lost a race for the root; rescan.
                None => continue,
            }
        }
    }

    fn flush_insertion_buffer(&mut self) {
        if self.insertion_buffer.is_empty() {
            return;
        }
        let index = self.acquire_push_shard();
        let shard = self.mq.shard(index);
        let heap = unsafe { shard.heap_mut() };
        for (key, value) in self.insertion_buffer.drain(..) {
            heap.push(key, value);
        }
        shard.unlock();
    }

    #[inline]
    fn random_shard(&mut self) -> usize {
        self.rng.gen_range(0..self.mq.num_shards())
    }

    // Returns a locked shard for insertion. The sticky shard is reused while
    // budget remains; every failed try-lock on it burns one unit, so a
    // contended shard is abandoned after at most `stickiness` attempts.
    fn acquire_push_shard(&mut self) -> usize {
        while self.push_budget > 0 {
            self.push_budget -= 1;
            if self.mq.shard(self.push_index).try_lock() {
                self.stats.use_counts += 1;
                return self.push_index;
            }
            self.stats.num_locking_failed += 1;
        }
        loop {
            let a = self.random_shard();
            let b = self.random_shard();
            // Insert into the shard with the larger published top so shards
            // holding few small keys are not starved further.
            let (first, second) = if self.mq.shard(a).top_bits() >= self.mq.shard(b).top_bits() {
                (a, b)
            } else {
                (b, a)
            };
            for index in [first, second] {
                if self.mq.shard(index).try_lock() {
                    self.push_index = index;
                    self.push_budget = self.mq.config().stickiness.saturating_sub(1);
                    self.stats.num_resets += 1;
                    self.stats.use_counts += 1;
                    return index;
                }
                self.stats.num_locking_failed += 1;
            }
        }
    }

    // Returns a locked, non-empty shard for deletion, or `None` when two
    // sampled shards both observed empty.
    fn acquire_pop_shard(&mut self) -> Option<usize> {
        while self.pop_budget > 0 {
            self.pop_budget -= 1;
            let shard = self.mq.shard(self.pop_index);
            if shard.top_bits() == K::EMPTY.into_bits() {
                self.pop_budget = 0;
                break;
            }
            if shard.try_lock() {
                if unsafe { shard.heap_mut() }.is_empty() {
                    shard.unlock();
                    self.pop_budget = 0;
                    break;
                }
                self.stats.use_counts += 1;
                return Some(self.pop_index);
            }
            self.stats.num_locking_failed += 1;
        }
        loop {
            let a = self.random_shard();
            let b = self.random_shard();
            let bits_a = self.mq.shard(a).top_bits();
            let bits_b = self.mq.shard(b).top_bits();
            let empty = K::EMPTY.into_bits();
            let index = match (bits_a == empty, bits_b == empty) {
                (true, true) => {
                    self.pop_budget = 0;
                    return None;
                }
                (false, true) => a,
                (true, false) => b,
                (false, false) => {
                    if bits_a <= bits_b {
                        a
                    } else {
                        b
                    }
                }
            };
            let shard = self.mq.shard(index);
            if !shard.try_lock() {
                self.stats.num_locking_failed += 1;
                continue;
            }
            if unsafe { shard.heap_mut() }.is_empty() {
                // Published top was stale.
                shard.unlock();
                continue;
            }
            self.pop_index = index;
            self.pop_budget = self.mq.config().stickiness.saturating_sub(1);
            self.stats.num_resets += 1;
            self.stats.use_counts += 1;
            return Some(index);
        }
    }
}

impl<K: Key, V: Copy + Send> Drop for MqHandle<'_, K, V> {
    // Buffered elements belong to the multiset; hand them back before the
    // per-thread state disappears.
    fn drop(&mut self) {
        self.flush_insertion_buffer();
        if self.deletion_buffer.is_empty() {
            return;
        }
        let index = self.acquire_push_shard();
        let shard = self.mq.shard(index);
        let heap = unsafe { shard.heap_mut() };
        for (key, value) in self.deletion_buffer.drain(..) {
            heap.push(key, value);
        }
        shard.unlock();
    }
}

impl<K: Key, V: Copy + Send> PqHandle for MqHandle<'_, K, V> {
    type Key = K;
    type Value = V;

    fn push(&mut self, key: K, value: V) {
        MqHandle::push(self, key, value);
    }

    fn try_pop(&mut self) -> Option<(K, V)> {
        MqHandle::try_pop(self)
    }

    fn pop_fallback(&mut self) -> Option<(K, V)> {
        self.pop_from_partition()
    }
}
