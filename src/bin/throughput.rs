use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rpqueues::config::{stress_settings, ThroughputArgs};
use rpqueues::stress::run_throughput;
use rpqueues::{ConcurrentPriorityQueue, Error, MultiQueue};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    // Help and version print on stdout and succeed; bad flags are a failure.
    let args = match ThroughputArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &ThroughputArgs) -> Result<(), Error> {
    let settings = stress_settings(&args.stress, false)?;
    info!(
        prefill = settings.prefill_size,
        threads = settings.num_threads,
        duration_ms = args.duration_ms,
        sleep_ns = settings.sleep_between_operations.as_nanos() as u64,
        policy = ?settings.insert_config.policy,
        distribution = ?settings.insert_config.distribution,
        min_key = settings.insert_config.min_key,
        max_key = settings.insert_config.max_key,
        seed = settings.seed,
        "measuring throughput"
    );
    let pq = Arc::new(MultiQueue::<u64, u64>::new(
        settings.num_threads,
        u64::from(settings.seed),
    ));
    info!(queue = %pq.description(), "using priority queue");
    let report = run_throughput(pq, &settings, Duration::from_millis(args.duration_ms))?;
    if let Some(work_time) = report.work_time {
        info!(seconds = work_time.as_secs_f64(), "work time");
    }
    println!("Insertions: {}", report.num_insertions);
    println!("Deletions: {}", report.num_deletions);
    println!("Failed deletions: {}", report.num_failed_deletions);
    println!("Ops/s: {:.1}", report.ops_per_second());
    Ok(())
}
