//! Parallel relaxed Dijkstra with idle-based termination detection.
//!
//! The queue only promises to return *some* small element, so classic
//! settled-set Dijkstra does not apply: entries may be stale (a smaller
//! distance already published) and a failed pop proves nothing about global
//! emptiness. Staleness is filtered against the distance array; emptiness is
//! resolved by the idle protocol below.
//!
//! Idle protocol: each thread owns a padded state in {active=0, searching=1,
//! idle=2, wakeup=3}; a global counter accumulates 1 for a searching thread
//! and 2 for an idle one. A thread that keeps failing pops publishes
//! `searching`, probes its own queue partition once more, and only then goes
//! idle; the computation has quiesced exactly when the counter reaches
//! `2 * num_threads`. Any thread that pushes while the counter is non-zero
//! sweeps the peers, moving idle ones 2 -> 3 -> 0 and giving their two units
//! back. A push that happens after an idle publication therefore decrements
//! the counter before anyone can observe the quiescent value.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use tracing::info;

use crate::coordination::{Context, ThreadCoordinator};
use crate::error::Error;
use crate::graph::Graph;
use crate::{ConcurrentPriorityQueue, PqHandle};

/// Initial distance of every node; unreachable nodes keep it.
pub const DISTANCE_SENTINEL: u32 = u32::MAX - 1;

/// Failed pops tolerated before a thread enters the idle protocol.
const POP_RETRIES: usize = 400;

const ACTIVE: u32 = 0;
const SEARCHING: u32 = 1;
const IDLE: u32 = 2;
const WAKEUP: u32 = 3;

#[derive(Debug)]
pub struct SsspRun {
    pub distances: Vec<u32>,
    pub processed_nodes: usize,
    pub elapsed: Duration,
}

/// Runs single-source shortest paths from node 0 on `num_threads` pinned
/// workers.
pub fn solve<P>(graph: Arc<Graph>, pq: Arc<P>, num_threads: usize) -> Result<SsspRun, Error>
where
    P: ConcurrentPriorityQueue<Key = u32, Value = u32> + 'static,
{
    if graph.num_nodes() == 0 {
        return Err(Error::Malformed("graph has no nodes".into()));
    }
    let distances: Arc<[CachePadded<AtomicU32>]> = (0..graph.num_nodes())
        .map(|_| CachePadded::new(AtomicU32::new(DISTANCE_SENTINEL)))
        .collect();
    let idle_states: Arc<[CachePadded<AtomicU32>]> = (0..num_threads)
        .map(|_| CachePadded::new(AtomicU32::new(ACTIVE)))
        .collect();
    let idle_counter = Arc::new(CachePadded::new(AtomicUsize::new(0)));
    let processed_nodes = Arc::new(CachePadded::new(AtomicUsize::new(0)));

    let mut coordinator = ThreadCoordinator::new(num_threads);
    {
        let distances = Arc::clone(&distances);
        let idle_states = Arc::clone(&idle_states);
        let idle_counter = Arc::clone(&idle_counter);
        let processed_nodes = Arc::clone(&processed_nodes);
        let graph = Arc::clone(&graph);
        coordinator.run(move |ctx| {
            let mut handle = pq.handle(ctx.id());
            handle.init_thread(ctx.num_threads());
            if ctx.is_main() {
                distances[0].store(0, Ordering::Relaxed);
                handle.push(0, 0);
            }
            ctx.synchronize(0, || {
                info!("calculating shortest paths");
                ctx.notify_coordinator();
            });
            ctx.wait_for_start();
            let local_processed = work_loop(
                &ctx,
                &mut handle,
                &graph,
                &distances,
                &idle_states,
                &idle_counter,
            );
            processed_nodes.fetch_add(local_processed, Ordering::Relaxed);
        })?;
    }
    coordinator.wait_until_notified();
    coordinator.signal_start();
    let start = Instant::now();
    coordinator.join()?;
    let elapsed = start.elapsed();

    Ok(SsspRun {
        distances: distances
            .iter()
            .map(|d| d.load(Ordering::Relaxed))
            .collect(),
        processed_nodes: processed_nodes.load(Ordering::Relaxed),
        elapsed,
    })
}

/// Compares computed distances against a reference solution.
pub fn verify(distances: &[u32], solution: &[u32]) -> Result<(), Error> {
    if distances != solution {
        return Err(Error::SolutionMismatch);
    }
    Ok(())
}

enum Recovery {
    Found((u32, u32)),
    Resume,
    Quiesced,
}

fn work_loop<H>(
    ctx: &Context,
    handle: &mut H,
    graph: &Graph,
    distances: &[CachePadded<AtomicU32>],
    idle_states: &[CachePadded<AtomicU32>],
    idle_counter: &AtomicUsize,
) -> usize
where
    H: PqHandle<Key = u32, Value = u32>,
{
    let id = ctx.id();
    let num_threads = ctx.num_threads();
    let mut local_processed = 0usize;
    loop {
        let (dist, node) = match handle.try_pop() {
            Some(item) => item,
            None => match recover(handle, id, num_threads, idle_states, idle_counter) {
                Recovery::Found(item) => item,
                Recovery::Resume => continue,
                Recovery::Quiesced => break,
            },
        };
        let current = distances[node as usize].load(Ordering::Relaxed);
        if dist > current {
            // A smaller distance was already published; the entry is stale.
            continue;
        }
        local_processed += 1;
        let mut pushed = false;
        for edge in graph.outgoing(node) {
            let new_distance = current + edge.weight;
            let old = distances[edge.target as usize].fetch_min(new_distance, Ordering::Relaxed);
            if old > new_distance {
                handle.push(new_distance, edge.target);
                pushed = true;
            }
        }
        if pushed && idle_counter.load(Ordering::Acquire) > 0 {
            wake_peers(id, num_threads, idle_states, idle_counter);
        }
    }
    local_processed
}

// Called after a failed pop. Retries with yields, then announces `searching`
// and probes the handle's own partition so a still-working thread is never
// counted as idle.
fn recover<H>(
    handle: &mut H,
    id: usize,
    num_threads: usize,
    idle_states: &[CachePadded<AtomicU32>],
    idle_counter: &AtomicUsize,
) -> Recovery
where
    H: PqHandle<Key = u32, Value = u32>,
{
    for _ in 0..POP_RETRIES {
        if let Some(item) = handle.try_pop() {
            return Recovery::Found(item);
        }
        thread::yield_now();
    }
    idle_states[id].store(SEARCHING, Ordering::Release);
    idle_counter.fetch_add(1, Ordering::Release);
    if let Some(item) = handle.pop_fallback() {
        idle_counter.fetch_sub(1, Ordering::Release);
        idle_states[id].store(ACTIVE, Ordering::Release);
        return Recovery::Found(item);
    }
    if go_idle(id, num_threads, idle_states, idle_counter) {
        Recovery::Quiesced
    } else {
        Recovery::Resume
    }
}

// Second unit: the searching announcement above already added one.
fn go_idle(
    id: usize,
    num_threads: usize,
    idle_states: &[CachePadded<AtomicU32>],
    idle_counter: &AtomicUsize,
) -> bool {
    idle_states[id].store(IDLE, Ordering::Release);
    idle_counter.fetch_add(1, Ordering::Release);
    loop {
        if idle_counter.load(Ordering::Acquire) == 2 * num_threads {
            return true;
        }
        if idle_states[id].load(Ordering::Acquire) == ACTIVE {
            return false;
        }
        thread::yield_now();
    }
}

// Sweeps all peers, claiming idle ones via 2 -> 3 before releasing them with
// 0. A peer observed in `searching` is waited out: it will either find work
// (0) or finish going idle (2).
fn wake_peers(
    own_id: usize,
    num_threads: usize,
    idle_states: &[CachePadded<AtomicU32>],
    idle_counter: &AtomicUsize,
) {
    for peer in 0..num_threads {
        if peer == own_id {
            continue;
        }
        let claimed = loop {
            match idle_states[peer].compare_exchange_weak(
                IDLE,
                WAKEUP,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break true,
                Err(observed) if observed == ACTIVE || observed == WAKEUP => break false,
                Err(_) => thread::yield_now(),
            }
        };
        if claimed {
            idle_counter.fetch_sub(2, Ordering::Release);
            idle_states[peer].store(ACTIVE, Ordering::Release);
        }
    }
}
