use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rpqueues::config::{stress_settings, QualityArgs};
use rpqueues::quality::{elem_id, thread_id};
use rpqueues::stress::run_quality;
use rpqueues::{ConcurrentPriorityQueue, Error, MultiQueue};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    // Help and version print on stdout and succeed; bad flags are a failure.
    let args = match QualityArgs::try_parse() {
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

fn run(args: &QualityArgs) -> Result<(), Error> {
    let settings = stress_settings(&args.stress, true)?;
    info!(
        prefill = settings.prefill_size,
        threads = settings.num_threads,
        min_deletions = args.min_deletions,
        sleep_ns = settings.sleep_between_operations.as_nanos() as u64,
        policy = ?settings.insert_config.policy,
        distribution = ?settings.insert_config.distribution,
        min_key = settings.insert_config.min_key,
        max_key = settings.insert_config.max_key,
        seed = settings.seed,
        "recording quality log"
    );
    let pq = Arc::new(MultiQueue::<u64, u64>::new(
        settings.num_threads,
        u64::from(settings.seed),
    ));
    info!(queue = %pq.description(), "using priority queue");
    let report = run_quality(pq, &settings, args.min_deletions)?;
    if let Some(work_time) = report.work_time {
        info!(seconds = work_time.as_secs_f64(), "work time");
    }

    let mut out = BufWriter::new(io::stdout().lock());
    writeln!(out, "{}", report.num_threads)?;
    for (tid, log) in report.logs.iter().enumerate() {
        for entry in &log.insertions {
            writeln!(out, "i {} {} {}", tid, entry.tick, entry.key)?;
        }
    }
    for (tid, log) in report.logs.iter().enumerate() {
        for entry in &log.deletions {
            writeln!(
                out,
                "d {} {} {} {}",
                tid,
                entry.tick,
                thread_id(entry.value),
                elem_id(entry.value)
            )?;
        }
    }
    for (tid, log) in report.logs.iter().enumerate() {
        for tick in &log.failed_deletions {
            writeln!(out, "f {} {}", tid, tick)?;
        }
    }
    out.flush()?;
    Ok(())
}
