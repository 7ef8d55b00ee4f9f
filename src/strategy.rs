//! Keystream generation for the stress drivers: which operations are inserts,
//! and which keys they insert.

use clap::ValueEnum;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Decides per operation whether a handle inserts or pops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InsertPolicy {
    /// Each operation is an insert with probability 1/2.
    Uniform,
    /// The first `num_push_threads` threads only insert, the rest only pop.
    Split,
    /// Thread 0 only inserts, everyone else only pops.
    Producer,
    /// Strict per-handle alternation, starting with an insert.
    Alternating,
}

/// Key distribution for inserted elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyDistribution {
    Uniform,
    Dijkstra,
    Ascending,
    Descending,
    #[value(name = "threadid")]
    ThreadId,
}

#[derive(Debug, Clone, Copy)]
pub struct InsertConfig {
    pub policy: InsertPolicy,
    pub distribution: KeyDistribution,
    pub min_key: u64,
    pub max_key: u64,
    pub dijkstra_min_increase: u64,
    pub dijkstra_max_increase: u64,
    /// Only read by the `Split` policy.
    pub num_push_threads: usize,
}

impl Default for InsertConfig {
    fn default() -> Self {
        Self {
            policy: InsertPolicy::Uniform,
            distribution: KeyDistribution::Uniform,
            min_key: 0,
            // Some queues reserve the top of the key range for sentinels.
            max_key: u64::MAX - 3,
            dijkstra_min_increase: 1,
            dijkstra_max_increase: 100,
            num_push_threads: 1,
        }
    }
}

/// Per-thread keystream. Seeded only from the global seed and the thread id,
/// so a run is reproducible once (seed, thread count, pinning) are fixed.
pub struct InsertingStrategy {
    id: usize,
    config: InsertConfig,
    rng: ChaCha8Rng,
    insert_next: bool,
    counter: u64,
    last_key: u64,
}

impl InsertingStrategy {
    pub fn new(id: usize, config: InsertConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(id as u64);
        Self {
            id,
            config,
            rng,
            insert_next: true,
            counter: 0,
            last_key: config.min_key,
        }
    }

    /// Whether the next operation is an insert.
    pub fn next_is_insert(&mut self) -> bool {
        match self.config.policy {
            InsertPolicy::Uniform => self.rng.gen_bool(0.5),
            InsertPolicy::Split => self.id < self.config.num_push_threads,
            InsertPolicy::Producer => self.id == 0,
            InsertPolicy::Alternating => {
                let insert = self.insert_next;
                self.insert_next = !insert;
                insert
            }
        }
    }

    /// The next key to insert, in `[min_key, max_key]`.
    pub fn next_key(&mut self) -> u64 {
        let config = &self.config;
        let span = (config.max_key - config.min_key).saturating_add(1);
        let key = match config.distribution {
            KeyDistribution::Uniform => self.rng.gen_range(config.min_key..=config.max_key),
            KeyDistribution::Ascending => config.min_key + self.counter % span,
            KeyDistribution::Descending => config.max_key - self.counter % span,
            KeyDistribution::Dijkstra => {
                let increase = self
                    .rng
                    .gen_range(config.dijkstra_min_increase..=config.dijkstra_max_increase);
                self.last_key = u64::min(self.last_key.saturating_add(increase), config.max_key);
                self.last_key
            }
            KeyDistribution::ThreadId => config.min_key + (self.id as u64) % span,
        };
        self.counter += 1;
        key
    }
}
