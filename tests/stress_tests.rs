use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rpqueues::quality::{elem_id, thread_id};
use rpqueues::strategy::{InsertConfig, InsertPolicy};
use rpqueues::stress::{run_quality, run_throughput, StressSettings};
use rpqueues::MultiQueue;

fn settings(num_threads: usize, prefill_size: usize) -> StressSettings {
    StressSettings {
        prefill_size,
        num_threads,
        sleep_between_operations: Duration::ZERO,
        seed: 42,
        insert_config: InsertConfig {
            max_key: 1 << 20,
            ..InsertConfig::default()
        },
    }
}

fn drain(pq: &MultiQueue<u64, u64>) -> usize {
    let mut remaining = 0;
    for id in 0..pq.num_threads() {
        let mut handle = pq.handle(id);
        while handle.pop_from_partition().is_some() {
            remaining += 1;
        }
    }
    remaining
}

#[test]
fn throughput_conserves_the_multiset() {
    const PREFILL: usize = 1_000;
    let settings = settings(2, PREFILL);
    let pq = Arc::new(MultiQueue::<u64, u64>::new(2, u64::from(settings.seed)));
    let report = run_throughput(
        Arc::clone(&pq),
        &settings,
        Duration::from_millis(200),
    )
    .unwrap();

    assert!(report.num_insertions > 0);
    assert!(report.num_deletions >= report.num_failed_deletions);
    let successful_pops = report.num_deletions - report.num_failed_deletions;
    let remaining = drain(&pq);
    assert_eq!(
        successful_pops + remaining,
        report.num_insertions + PREFILL,
        "elements lost or duplicated"
    );
    assert!(report.ops_per_second() > 0.0);
    assert!(report.work_time.is_some());
}

#[test]
fn quality_log_is_consistent() {
    const NUM_THREADS: usize = 4;
    const MIN_DELETIONS: usize = 100;
    const PREFILL: usize = 50;

    let settings = settings(NUM_THREADS, PREFILL);
    let pq = Arc::new(MultiQueue::<u64, u64>::new(
        NUM_THREADS,
        u64::from(settings.seed),
    ));
    let report = run_quality(Arc::clone(&pq), &settings, MIN_DELETIONS).unwrap();

    assert_eq!(report.num_threads, NUM_THREADS);
    assert_eq!(report.logs.len(), NUM_THREADS);
    let total_deletions: usize = report.logs.iter().map(|log| log.deletions.len()).sum();
    assert!(total_deletions >= MIN_DELETIONS);

    // Prefill entries carry tick 0 on the main thread.
    assert!(report.logs[0].insertions.len() >= PREFILL);
    assert!(report.logs[0].insertions[..PREFILL].iter().all(|e| e.tick == 0));

    // Every popped value decodes to an insertion that was actually logged,
    // and no value is popped twice.
    let mut seen = HashSet::new();
    for log in &report.logs {
        for deletion in &log.deletions {
            let producer = thread_id(deletion.value);
            let sequence = elem_id(deletion.value);
            assert!(producer < NUM_THREADS, "bad producer tag {producer}");
            assert!(
                (sequence as usize) < report.logs[producer].insertions.len(),
                "deletion references insertion {sequence} that never happened"
            );
            assert!(seen.insert(deletion.value), "value popped twice");
        }
    }

    // In-loop operations were tallied.
    let logged_insertions: usize = report
        .logs
        .iter()
        .map(|log| log.insertions.len())
        .sum();
    assert_eq!(logged_insertions, report.num_insertions + PREFILL);
}

#[test]
fn all_pop_workload_only_fails_after_prefill_is_gone() {
    // Producer policy with a single thread popping: thread 1 never inserts.
    let mut settings = settings(2, 0);
    settings.insert_config.policy = InsertPolicy::Producer;
    let pq = Arc::new(MultiQueue::<u64, u64>::new(2, 3));
    let report = run_throughput(Arc::clone(&pq), &settings, Duration::from_millis(50)).unwrap();
    // Thread 0 only inserts, thread 1 only pops.
    assert!(report.num_insertions > 0);
    assert!(report.num_deletions > 0);
}
