use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rpqueues::config::{validate_sssp, SsspArgs};
use rpqueues::graph::{read_solution, Graph};
use rpqueues::{sssp, ConcurrentPriorityQueue, Error, MultiQueue, MultiQueueConfig};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    // Help and version print on stdout and succeed; bad flags are a failure.
    let args = match SsspArgs::try_parse() {
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

fn run(args: &SsspArgs) -> Result<(), Error> {
    validate_sssp(args)?;
    info!(graph = %args.graph_file.display(), "reading graph");
    let graph = Arc::new(Graph::from_dimacs(&args.graph_file)?);
    let solution = read_solution(&args.solution_file)?;
    if graph.num_nodes() != solution.len() {
        return Err(Error::ConfigInvalid(
            "graph and solution size does not match".into(),
        ));
    }
    info!(
        nodes = graph.num_nodes(),
        edges = graph.num_edges(),
        "graph loaded"
    );

    let mut threads = 1;
    while threads <= args.threads {
        // Buffers amortize lock latency in the stress workloads but only
        // delay visibility here; the shortest-path runs go unbuffered.
        let pq = Arc::new(MultiQueue::<u32, u32>::with_config(
            threads,
            1,
            MultiQueueConfig {
                insertion_buffer_size: 0,
                deletion_buffer_size: 0,
                ..MultiQueueConfig::default()
            },
        ));
        info!(queue = %pq.description(), threads, "running");
        let run = sssp::solve(Arc::clone(&graph), pq, threads)?;
        sssp::verify(&run.distances, &solution)?;
        println!(
            "{} {} {}",
            threads,
            run.elapsed.as_millis(),
            run.processed_nodes
        );
        threads *= 2;
    }
    Ok(())
}
