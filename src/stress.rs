//! The stress driver: throughput and quality benchmark loops over any queue
//! implementing the common contract.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_utils::CachePadded;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::coordination::{ThreadCoordinator, WorkTimeAggregate};
use crate::error::Error;
use crate::quality::{fenced_tick, to_value, DeletionLogEntry, InsertionLogEntry, ThreadLog};
use crate::strategy::{InsertConfig, InsertingStrategy};
use crate::{ConcurrentPriorityQueue, PqHandle};

#[derive(Debug, Clone)]
pub struct StressSettings {
    pub prefill_size: usize,
    pub num_threads: usize,
    pub sleep_between_operations: Duration,
    pub seed: u32,
    pub insert_config: InsertConfig,
}

/// Per-thread sink for popped elements. The volatile write keeps the pop from
/// being optimized out; every worker writes only its own padded slot.
#[repr(C)]
pub struct DummyResult(UnsafeCell<(u64, u64)>);

unsafe impl Sync for DummyResult {}

impl DummyResult {
    fn new() -> Self {
        Self(UnsafeCell::new((0, 0)))
    }

    #[inline]
    fn record(&self, key: u64, value: u64) {
        unsafe { ptr::write_volatile(self.0.get(), (key, value)) };
    }
}

#[derive(Debug, Default)]
struct Counters {
    insertions: CachePadded<AtomicUsize>,
    deletions: CachePadded<AtomicUsize>,
    failed_deletions: CachePadded<AtomicUsize>,
}

#[derive(Debug)]
pub struct ThroughputReport {
    pub num_insertions: usize,
    /// Pop attempts, successful or not.
    pub num_deletions: usize,
    pub num_failed_deletions: usize,
    pub duration: Duration,
    pub work_time: Option<Duration>,
}

impl ThroughputReport {
    pub fn ops_per_second(&self) -> f64 {
        let ops = (self.num_insertions + self.num_deletions) as f64;
        ops * 1000.0 / self.duration.as_millis() as f64
    }
}

#[derive(Debug)]
pub struct QualityReport {
    pub num_threads: usize,
    pub logs: Vec<ThreadLog>,
    pub num_insertions: usize,
    pub num_deletions: usize,
    pub num_failed_deletions: usize,
    pub work_time: Option<Duration>,
}

#[inline]
fn sleep_between_ops(sleep: Duration, rng: &mut SmallRng) {
    if !sleep.is_zero() {
        thread::sleep(Duration::from_nanos(
            rng.gen_range(0..=sleep.as_nanos() as u64),
        ));
    }
}

/// Runs the mixed workload for `duration`, tallying operation counts. The
/// stop flag is a release store polled with relaxed loads; the closing
/// barrier orders the per-thread tallies for aggregation.
pub fn run_throughput<P>(
    pq: Arc<P>,
    settings: &StressSettings,
    duration: Duration,
) -> Result<ThroughputReport, Error>
where
    P: ConcurrentPriorityQueue<Key = u64, Value = u64> + 'static,
{
    let num_threads = settings.num_threads;
    let stop_flag = Arc::new(CachePadded::new(AtomicBool::new(false)));
    let sinks: Arc<[CachePadded<DummyResult>]> = (0..num_threads)
        .map(|_| CachePadded::new(DummyResult::new()))
        .collect();
    let counters = Arc::new(Counters::default());
    let work_time = Arc::new(WorkTimeAggregate::new());

    let mut coordinator = ThreadCoordinator::new(num_threads);
    {
        let settings = settings.clone();
        let stop_flag = Arc::clone(&stop_flag);
        let sinks = Arc::clone(&sinks);
        let counters = Arc::clone(&counters);
        let work_time = Arc::clone(&work_time);
        coordinator.run(move |ctx| {
            let id = ctx.id();
            let mut handle = pq.handle(id);
            handle.init_thread(ctx.num_threads());
            let mut strategy =
                InsertingStrategy::new(id, settings.insert_config, u64::from(settings.seed));
            let mut sleep_rng = SmallRng::seed_from_u64(u64::from(settings.seed) ^ id as u64);
            if ctx.is_main() && settings.prefill_size > 0 {
                info!(n = settings.prefill_size, "prefilling");
                for _ in 0..settings.prefill_size {
                    let key = strategy.next_key();
                    handle.push(key, key);
                }
            }
            ctx.synchronize(0, || {
                info!("starting the stress test");
                ctx.notify_coordinator();
            });
            ctx.wait_for_start();
            let mut num_local_insertions = 0usize;
            let mut num_local_deletions = 0usize;
            let mut num_local_failed_deletions = 0usize;
            let (interval, _) = ctx.execute_synchronized(|| {
                while !stop_flag.load(Ordering::Relaxed) {
                    if strategy.next_is_insert() {
                        let key = strategy.next_key();
                        handle.push(key, key);
                        num_local_insertions += 1;
                    } else {
                        match handle.try_pop() {
                            Some((key, value)) => sinks[id].record(key, value),
                            None => num_local_failed_deletions += 1,
                        }
                        num_local_deletions += 1;
                    }
                    sleep_between_ops(settings.sleep_between_operations, &mut sleep_rng);
                }
            });
            ctx.synchronize(1, || info!("done"));
            work_time.record(interval);
            counters
                .insertions
                .fetch_add(num_local_insertions, Ordering::Relaxed);
            counters
                .deletions
                .fetch_add(num_local_deletions, Ordering::Relaxed);
            counters
                .failed_deletions
                .fetch_add(num_local_failed_deletions, Ordering::Relaxed);
        })?;
    }
    coordinator.wait_until_notified();
    coordinator.signal_start();
    thread::sleep(duration);
    stop_flag.store(true, Ordering::Release);
    coordinator.join()?;

    Ok(ThroughputReport {
        num_insertions: counters.insertions.load(Ordering::Relaxed),
        num_deletions: counters.deletions.load(Ordering::Relaxed),
        num_failed_deletions: counters.failed_deletions.load(Ordering::Relaxed),
        duration,
        work_time: work_time.interval(),
    })
}

/// Runs the mixed workload until `min_deletions` elements were popped
/// globally, recording every operation with a fenced tick. Inserted values
/// are tagged `(thread, sequence)` so the offline evaluator can reconstruct
/// insertion ranks.
pub fn run_quality<P>(
    pq: Arc<P>,
    settings: &StressSettings,
    min_deletions: usize,
) -> Result<QualityReport, Error>
where
    P: ConcurrentPriorityQueue<Key = u64, Value = u64> + 'static,
{
    let num_threads = settings.num_threads;
    let num_delete_operations = Arc::new(CachePadded::new(AtomicUsize::new(0)));
    let logs: Arc<Vec<Mutex<ThreadLog>>> =
        Arc::new((0..num_threads).map(|_| Mutex::default()).collect());
    let counters = Arc::new(Counters::default());
    let work_time = Arc::new(WorkTimeAggregate::new());

    let mut coordinator = ThreadCoordinator::new(num_threads);
    {
        let settings = settings.clone();
        let num_delete_operations = Arc::clone(&num_delete_operations);
        let logs = Arc::clone(&logs);
        let counters = Arc::clone(&counters);
        let work_time = Arc::clone(&work_time);
        coordinator.run(move |ctx| {
            let id = ctx.id();
            let mut handle = pq.handle(id);
            handle.init_thread(ctx.num_threads());
            let mut strategy =
                InsertingStrategy::new(id, settings.insert_config, u64::from(settings.seed));
            let mut sleep_rng = SmallRng::seed_from_u64(u64::from(settings.seed) ^ id as u64);
            let mut local = ThreadLog::default();
            local.insertions.reserve(settings.prefill_size + min_deletions);
            local.deletions.reserve(min_deletions);
            if ctx.is_main() && settings.prefill_size > 0 {
                info!(n = settings.prefill_size, "prefilling");
                for _ in 0..settings.prefill_size {
                    let key = strategy.next_key();
                    let value = to_value(id, local.insertions.len() as u64);
                    handle.push(key, value);
                    local.insertions.push(InsertionLogEntry { tick: 0, key });
                }
            }
            ctx.synchronize(0, || {
                info!("starting the stress test");
                ctx.notify_coordinator();
            });
            ctx.wait_for_start();
            let mut num_local_insertions = 0usize;
            let mut num_local_deletions = 0usize;
            let mut num_local_failed_deletions = 0usize;
            let (interval, _) = ctx.execute_synchronized(|| {
                while num_delete_operations.load(Ordering::Relaxed) < min_deletions {
                    if strategy.next_is_insert() {
                        let key = strategy.next_key();
                        let value = to_value(id, local.insertions.len() as u64);
                        handle.push(key, value);
                        let tick = fenced_tick();
                        local.insertions.push(InsertionLogEntry { tick, key });
                        num_local_insertions += 1;
                    } else {
                        let popped = handle.try_pop();
                        let tick = fenced_tick();
                        match popped {
                            Some((_, value)) => {
                                local.deletions.push(DeletionLogEntry { tick, value });
                                num_delete_operations.fetch_add(1, Ordering::Relaxed);
                            }
                            None => {
                                local.failed_deletions.push(tick);
                                num_local_failed_deletions += 1;
                            }
                        }
                        num_local_deletions += 1;
                    }
                    sleep_between_ops(settings.sleep_between_operations, &mut sleep_rng);
                }
            });
            ctx.synchronize(1, || info!("done"));
            work_time.record(interval);
            *logs[id].lock().unwrap() = local;
            counters
                .insertions
                .fetch_add(num_local_insertions, Ordering::Relaxed);
            counters
                .deletions
                .fetch_add(num_local_deletions, Ordering::Relaxed);
            counters
                .failed_deletions
                .fetch_add(num_local_failed_deletions, Ordering::Relaxed);
        })?;
    }
    coordinator.wait_until_notified();
    coordinator.signal_start();
    coordinator.join()?;

    let logs = Arc::try_unwrap(logs)
        .map_err(|_| Error::WorkerPanicked)?
        .into_iter()
        .map(|slot| slot.into_inner().unwrap())
        .collect();
    Ok(QualityReport {
        num_threads,
        logs,
        num_insertions: counters.insertions.load(Ordering::Relaxed),
        num_deletions: counters.deletions.load(Ordering::Relaxed),
        num_failed_deletions: counters.failed_deletions.load(Ordering::Relaxed),
        work_time: work_time.interval(),
    })
}
