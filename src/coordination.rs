//! Worker spawning, CPU pinning, phase barriers and timed synchronized
//! execution.
//!
//! The start protocol keeps thread-creation jitter out of the measured
//! region: workers rendezvous at a numbered barrier, one of them notifies the
//! coordinator, the main thread arms the start flag with a release store, and
//! workers busy-poll it with a pause hint before an acquire fence.

use std::cell::Cell;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;
use tracing::warn;

use crate::error::Error;

/// Block size for blockwise scheduled execution: coarse enough that the
/// shared counter is off the hot path, fine enough to balance load.
const BLOCK_SIZE: usize = 4096;

const SPINS_BEFORE_YIELD: usize = 1024;

/// One worker's stamped interval inside a synchronized region, in nanoseconds
/// relative to the coordinator's epoch.
#[derive(Debug, Clone, Copy)]
pub struct WorkTime {
    pub start_ns: u64,
    pub end_ns: u64,
}

/// Min/max aggregation of [`WorkTime`]s across workers. The interval covered
/// collectively is `[min(starts), max(ends)]`.
#[derive(Debug)]
pub struct WorkTimeAggregate {
    start_ns: CachePadded<AtomicU64>,
    end_ns: CachePadded<AtomicU64>,
}

impl WorkTimeAggregate {
    pub fn new() -> Self {
        Self {
            start_ns: CachePadded::new(AtomicU64::new(u64::MAX)),
            end_ns: CachePadded::new(AtomicU64::new(0)),
        }
    }

    pub fn record(&self, work_time: WorkTime) {
        self.start_ns.fetch_min(work_time.start_ns, Ordering::AcqRel);
        self.end_ns.fetch_max(work_time.end_ns, Ordering::AcqRel);
    }

    pub fn interval(&self) -> Option<Duration> {
        let start = self.start_ns.load(Ordering::Acquire);
        let end = self.end_ns.load(Ordering::Acquire);
        (start <= end && start != u64::MAX).then(|| Duration::from_nanos(end - start))
    }
}

impl Default for WorkTimeAggregate {
    fn default() -> Self {
        Self::new()
    }
}

// Generation barrier. The last arriver is the elected leader: it runs the
// stage callback, resets the arrival count and only then publishes the next
// generation, so re-entry cannot race the reset.
struct StageBarrier {
    num_threads: usize,
    arrived: CachePadded<AtomicUsize>,
    generation: CachePadded<AtomicU64>,
}

impl StageBarrier {
    fn new(num_threads: usize) -> Self {
        Self {
            num_threads,
            arrived: CachePadded::new(AtomicUsize::new(0)),
            generation: CachePadded::new(AtomicU64::new(0)),
        }
    }

    fn wait<F: FnOnce()>(&self, leader: F) {
        let generation = self.generation.load(Ordering::Acquire);
        if self.arrived.fetch_add(1, Ordering::AcqRel) + 1 == self.num_threads {
            leader();
            self.arrived.store(0, Ordering::Relaxed);
            self.generation.store(generation + 1, Ordering::Release);
        } else {
            let mut spins = 0usize;
            while self.generation.load(Ordering::Acquire) == generation {
                if spins < SPINS_BEFORE_YIELD {
                    std::hint::spin_loop();
                    spins += 1;
                } else {
                    thread::yield_now();
                }
            }
        }
    }
}

struct Shared {
    num_threads: usize,
    epoch: Instant,
    barrier: StageBarrier,
    start_flag: CachePadded<AtomicBool>,
    next_index: CachePadded<AtomicUsize>,
    notified: Mutex<bool>,
    notify_cv: Condvar,
}

impl Shared {
    #[inline]
    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// A worker's view of the coordinator.
pub struct Context {
    id: usize,
    last_stage: Cell<Option<u32>>,
    shared: Arc<Shared>,
}

impl Context {
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.shared.num_threads
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.id == 0
    }

    /// Numbered barrier. All workers must pass the same `stage`, in
    /// increasing order; the elected leader runs `f` exactly once per stage
    /// before anyone is released.
    pub fn synchronize<F: FnOnce()>(&self, stage: u32, f: F) {
        debug_assert!(
            self.last_stage.get().map_or(true, |last| last < stage),
            "stages must be used in increasing order"
        );
        self.last_stage.set(Some(stage));
        self.shared.barrier.wait(f);
    }

    /// Wakes the main thread blocked in
    /// [`ThreadCoordinator::wait_until_notified`]. Call from a stage leader.
    pub fn notify_coordinator(&self) {
        let mut notified = self.shared.notified.lock().unwrap();
        *notified = true;
        self.shared.notify_cv.notify_all();
    }

    /// Busy-polls the start flag with a pause hint, then orders everything
    /// the main thread wrote before arming it.
    pub fn wait_for_start(&self) {
        while !self.shared.start_flag.load(Ordering::Relaxed) {
            std::hint::spin_loop();
        }
        fence(Ordering::Acquire);
    }

    /// Runs `f` between two barriers and stamps the interval this worker
    /// spent inside. Aggregate with [`WorkTimeAggregate`] for the collective
    /// wall-clock interval.
    pub fn execute_synchronized<R, F: FnOnce() -> R>(&self, f: F) -> (WorkTime, R) {
        self.shared.barrier.wait(|| {});
        let start_ns = self.shared.now_ns();
        let result = f();
        let end_ns = self.shared.now_ns();
        self.shared.barrier.wait(|| {});
        (WorkTime { start_ns, end_ns }, result)
    }

    /// Like [`Self::execute_synchronized`], but workers consume `n` indices
    /// in blocks of 4096 claimed from a shared counter: dynamic load
    /// balancing without per-operation coordination. `f(begin, count)`
    /// processes one block.
    pub fn execute_synchronized_blockwise<F: FnMut(usize, usize)>(
        &self,
        n: usize,
        mut f: F,
    ) -> WorkTime {
        let shared = &self.shared;
        shared
            .barrier
            .wait(|| shared.next_index.store(0, Ordering::Relaxed));
        let start_ns = shared.now_ns();
        loop {
            let begin = shared.next_index.fetch_add(BLOCK_SIZE, Ordering::Relaxed);
            if begin >= n {
                break;
            }
            f(begin, usize::min(BLOCK_SIZE, n - begin));
        }
        let end_ns = shared.now_ns();
        shared.barrier.wait(|| {});
        WorkTime { start_ns, end_ns }
    }
}

/// Spawns `num_threads` workers pinned to CPUs `0..num_threads` and sequences
/// them against the main thread.
pub struct ThreadCoordinator {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadCoordinator {
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads > 0, "need at least one worker");
        Self {
            shared: Arc::new(Shared {
                num_threads,
                epoch: Instant::now(),
                barrier: StageBarrier::new(num_threads),
                start_flag: CachePadded::new(AtomicBool::new(false)),
                next_index: CachePadded::new(AtomicUsize::new(0)),
                notified: Mutex::new(false),
                notify_cv: Condvar::new(),
            }),
            workers: Vec::new(),
        }
    }

    /// Spawns the workers. Each is pinned to the CPU matching its id; a
    /// failed pin is reported and the worker runs unpinned.
    pub fn run<F>(&mut self, task: F) -> Result<(), Error>
    where
        F: Fn(Context) + Send + Sync + 'static,
    {
        assert!(self.workers.is_empty(), "coordinator already running");
        let task = Arc::new(task);
        for id in 0..self.shared.num_threads {
            let shared = Arc::clone(&self.shared);
            let task = Arc::clone(&task);
            let worker = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || {
                    pin_to_cpu(id);
                    (*task)(Context {
                        id,
                        last_stage: Cell::new(None),
                        shared,
                    });
                })?;
            self.workers.push(worker);
        }
        Ok(())
    }

    /// Blocks until some worker calls [`Context::notify_coordinator`].
    pub fn wait_until_notified(&self) {
        let mut notified = self.shared.notified.lock().unwrap();
        while !*notified {
            notified = self.shared.notify_cv.wait(notified).unwrap();
        }
    }

    /// Arms the start flag (release); everything written before this call is
    /// visible to workers leaving [`Context::wait_for_start`].
    pub fn signal_start(&self) {
        self.shared.start_flag.store(true, Ordering::Release);
    }

    /// Joins all workers. Panics never cross this boundary; a panicked worker
    /// turns into an error after every thread has been joined.
    pub fn join(&mut self) -> Result<(), Error> {
        let mut panicked = false;
        for worker in self.workers.drain(..) {
            panicked |= worker.join().is_err();
        }
        if panicked {
            return Err(Error::WorkerPanicked);
        }
        Ok(())
    }
}

fn pin_to_cpu(cpu: usize) {
    let mut cpu_set = CpuSet::new();
    if let Err(e) = cpu_set.set(cpu) {
        warn!(cpu, error = %e, "cpu outside the affinity mask range, running unpinned");
        return;
    }
    if let Err(e) = sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        warn!(cpu, error = %e, "could not pin worker, running unpinned");
    }
}
