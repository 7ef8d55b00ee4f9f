//! CLI surfaces for the three benchmark binaries, plus settings validation.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};

use crate::error::Error;
use crate::quality::MAX_THREADS;
use crate::strategy::{InsertConfig, InsertPolicy, KeyDistribution};
use crate::stress::StressSettings;

/// Flags shared by the throughput and quality drivers.
#[derive(Debug, Args)]
pub struct StressArgs {
    /// Number of elements to prefill the queue with
    #[arg(short = 'n', long = "prefill", default_value_t = 1_000_000)]
    pub prefill: usize,

    /// Number of threads
    #[arg(short = 'j', long = "threads", default_value_t = 4)]
    pub threads: usize,

    /// Max sleep between operations in ns
    #[arg(short = 'w', long = "sleep", default_value_t = 0)]
    pub sleep: u64,

    /// Initial seed
    #[arg(short = 's', long = "seed", default_value_t = 0)]
    pub seed: u32,

    /// Insert policy
    #[arg(short = 'i', long = "insert", value_enum, default_value = "uniform")]
    pub policy: InsertPolicy,

    /// Key distribution
    #[arg(short = 'd', long = "distribution", value_enum, default_value = "uniform")]
    pub distribution: KeyDistribution,

    /// Max key
    #[arg(short = 'm', long = "max", default_value_t = u64::MAX - 3)]
    pub max_key: u64,

    /// Min key
    #[arg(short = 'l', long = "min", default_value_t = 0)]
    pub min_key: u64,

    /// Number of inserting threads under the split policy
    #[arg(long = "push-threads", default_value_t = 1)]
    pub push_threads: usize,
}

/// Measures operation throughput of relaxed priority queues.
#[derive(Debug, Parser)]
#[command(name = "throughput")]
pub struct ThroughputArgs {
    #[command(flatten)]
    pub stress: StressArgs,

    /// Test duration in ms
    #[arg(short = 't', long = "time", default_value_t = 3_000)]
    pub duration_ms: u64,
}

/// Records per-operation event logs of relaxed priority queues for offline
/// quality analysis.
#[derive(Debug, Parser)]
#[command(name = "quality")]
pub struct QualityArgs {
    #[command(flatten)]
    pub stress: StressArgs,

    /// Minimum number of deletions
    #[arg(short = 'o', long = "deletions", default_value_t = 10_000_000)]
    pub min_deletions: usize,
}

/// Measures relaxed priority queues on single-source shortest paths.
#[derive(Debug, Parser)]
#[command(name = "sssp")]
pub struct SsspArgs {
    /// Largest number of threads; thread counts double from 1 up to this
    #[arg(short = 'j', long = "threads", default_value_t = 4)]
    pub threads: usize,

    /// The input graph
    #[arg(short = 'f', long = "file", default_value = "graph.gr")]
    pub graph_file: PathBuf,

    /// The reference shortest paths
    #[arg(short = 'c', long = "check", default_value = "solution.txt")]
    pub solution_file: PathBuf,
}

/// Validates the shared stress flags and assembles the driver settings.
/// `tagged_values` is set by the quality driver, whose value encoding bounds
/// the thread count.
pub fn stress_settings(args: &StressArgs, tagged_values: bool) -> Result<StressSettings, Error> {
    if args.threads == 0 {
        return Err(Error::ConfigInvalid("thread count must be positive".into()));
    }
    if tagged_values && args.threads > MAX_THREADS {
        return Err(Error::ConfigInvalid(format!(
            "at most {MAX_THREADS} threads fit in the value tag"
        )));
    }
    if args.min_key > args.max_key {
        return Err(Error::ConfigInvalid("min key exceeds max key".into()));
    }
    if args.max_key == u64::MAX {
        return Err(Error::ConfigInvalid(
            "the top of the key range is reserved".into(),
        ));
    }
    if args.policy == InsertPolicy::Split {
        if args.push_threads == 0 {
            return Err(Error::ConfigInvalid(
                "split policy needs at least one push thread".into(),
            ));
        }
        if args.push_threads > args.threads {
            return Err(Error::ConfigInvalid(
                "more push threads than threads".into(),
            ));
        }
    }
    Ok(StressSettings {
        prefill_size: args.prefill,
        num_threads: args.threads,
        sleep_between_operations: Duration::from_nanos(args.sleep),
        seed: args.seed,
        insert_config: InsertConfig {
            policy: args.policy,
            distribution: args.distribution,
            min_key: args.min_key,
            max_key: args.max_key,
            num_push_threads: args.push_threads,
            ..InsertConfig::default()
        },
    })
}

pub fn validate_sssp(args: &SsspArgs) -> Result<(), Error> {
    if args.threads == 0 {
        return Err(Error::ConfigInvalid("thread count must be positive".into()));
    }
    Ok(())
}
