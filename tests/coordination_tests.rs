use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rpqueues::coordination::{ThreadCoordinator, WorkTimeAggregate};
use rpqueues::Error;

#[test]
fn blockwise_processes_each_index_exactly_once() {
    const NUM_THREADS: usize = 4;
    // Not a multiple of the block size, so the tail block is short.
    const TOTAL: usize = 100_000 + 17;

    let hits: Arc<Vec<AtomicUsize>> =
        Arc::new((0..TOTAL).map(|_| AtomicUsize::new(0)).collect());
    let mut coordinator = ThreadCoordinator::new(NUM_THREADS);
    {
        let hits = Arc::clone(&hits);
        coordinator
            .run(move |ctx| {
                ctx.execute_synchronized_blockwise(TOTAL, |begin, count| {
                    for i in begin..begin + count {
                        hits[i].fetch_add(1, Ordering::Relaxed);
                    }
                });
            })
            .unwrap();
    }
    coordinator.join().unwrap();
    for (i, hit) in hits.iter().enumerate() {
        assert_eq!(hit.load(Ordering::Relaxed), 1, "index {i}");
    }
}

#[test]
fn synchronize_runs_leader_exactly_once_per_stage() {
    const NUM_THREADS: usize = 8;

    let stage_runs = Arc::new(AtomicUsize::new(0));
    let mut coordinator = ThreadCoordinator::new(NUM_THREADS);
    {
        let stage_runs = Arc::clone(&stage_runs);
        coordinator
            .run(move |ctx| {
                for stage in 0u32..4 {
                    ctx.synchronize(stage, || {
                        stage_runs.fetch_add(1, Ordering::Relaxed);
                    });
                }
            })
            .unwrap();
    }
    coordinator.join().unwrap();
    assert_eq!(stage_runs.load(Ordering::Relaxed), 4);
}

#[test]
fn start_flag_orders_main_thread_writes() {
    const NUM_THREADS: usize = 4;

    let payload = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(AtomicUsize::new(0));
    let mut coordinator = ThreadCoordinator::new(NUM_THREADS);
    {
        let payload = Arc::clone(&payload);
        let observed = Arc::clone(&observed);
        coordinator
            .run(move |ctx| {
                ctx.synchronize(0, || ctx.notify_coordinator());
                ctx.wait_for_start();
                // The release store of the flag orders this write.
                observed.fetch_add(payload.load(Ordering::Relaxed), Ordering::Relaxed);
            })
            .unwrap();
    }
    coordinator.wait_until_notified();
    payload.store(11, Ordering::Relaxed);
    coordinator.signal_start();
    coordinator.join().unwrap();
    assert_eq!(observed.load(Ordering::Relaxed), 11 * NUM_THREADS);
}

#[test]
fn work_time_covers_the_slowest_worker() {
    const NUM_THREADS: usize = 3;

    let aggregate = Arc::new(WorkTimeAggregate::new());
    let mut coordinator = ThreadCoordinator::new(NUM_THREADS);
    {
        let aggregate = Arc::clone(&aggregate);
        coordinator
            .run(move |ctx| {
                let (work_time, _) = ctx.execute_synchronized(|| {
                    thread::sleep(Duration::from_millis(10 + 10 * ctx.id() as u64));
                });
                aggregate.record(work_time);
            })
            .unwrap();
    }
    coordinator.join().unwrap();
    let interval = aggregate.interval().expect("no interval recorded");
    // The slowest worker slept 30 ms.
    assert!(interval >= Duration::from_millis(30), "interval {interval:?}");
}

#[test]
fn empty_aggregate_has_no_interval() {
    assert!(WorkTimeAggregate::new().interval().is_none());
}

#[test]
fn join_surfaces_worker_panics() {
    let mut coordinator = ThreadCoordinator::new(2);
    coordinator
        .run(|ctx| {
            if ctx.id() == 1 {
                panic!("boom");
            }
        })
        .unwrap();
    assert!(matches!(coordinator.join(), Err(Error::WorkerPanicked)));
}
