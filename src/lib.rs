pub mod config;
pub mod coordination;
pub mod error;
pub mod graph;
pub mod heap;
pub mod multiqueue;
pub mod quality;
pub mod sssp;
pub mod strategy;
pub mod stress;
pub mod wrapper;

pub use error::Error;
pub use heap::DaryHeap;
pub use multiqueue::{MultiQueue, MultiQueueConfig};
pub use strategy::{InsertConfig, InsertPolicy, InsertingStrategy, KeyDistribution};
pub use wrapper::{ExternalQueue, Wrapper};

/// Unsigned integer key types with min-priority semantics.
///
/// `EMPTY` is reserved: it is published as the top key of an empty shard and
/// must never be pushed. Bit conversions preserve order so shard selection can
/// compare published keys of any width through one atomic word.
pub trait Key: Copy + Ord + Send + Sync + 'static {
    const EMPTY: Self;

    fn into_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

impl Key for u64 {
    const EMPTY: Self = u64::MAX;

    #[inline]
    fn into_bits(self) -> u64 {
        self
    }

    #[inline]
    fn from_bits(bits: u64) -> Self {
        bits
    }
}

impl Key for u32 {
    const EMPTY: Self = u32::MAX;

    #[inline]
    fn into_bits(self) -> u64 {
        u64::from(self)
    }

    #[inline]
    fn from_bits(bits: u64) -> Self {
        bits as u32
    }
}

// Common interface for all relaxed priority queues driven by the benchmarks.
// One handle per thread; the handle owns the per-thread state (selection RNG,
// stickiness, buffers), so its operations take `&mut self`.
pub trait PqHandle {
    type Key: Key;
    type Value: Copy + Send;

    /// Per-thread setup required by some external queues. No-op by default.
    fn init_thread(&mut self, _num_threads: usize) {}

    /// The element becomes eventually extractable by some handle.
    fn push(&mut self, key: Self::Key, value: Self::Value);

    /// `None` means the sampled part of the queue observed empty. The multiset
    /// may still be non-empty; callers must tolerate transient failures.
    fn try_pop(&mut self) -> Option<(Self::Key, Self::Value)>;

    /// Stronger probe used by termination protocols: queues that partition
    /// their state scan the handle's own partition, the rest fall back to a
    /// regular pop.
    fn pop_fallback(&mut self) -> Option<(Self::Key, Self::Value)> {
        self.try_pop()
    }
}

// Common interface for queue construction and handle hand-out. Drivers are
// generic over this trait and monomorphize per queue variant.
pub trait ConcurrentPriorityQueue: Send + Sync {
    type Key: Key;
    type Value: Copy + Send;
    type Handle<'a>: PqHandle<Key = Self::Key, Value = Self::Value>
    where
        Self: 'a;

    fn handle(&self, id: usize) -> Self::Handle<'_>;
    fn description(&self) -> String;
}
