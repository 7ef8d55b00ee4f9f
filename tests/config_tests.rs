use rpqueues::config::{stress_settings, StressArgs};
use rpqueues::{Error, InsertPolicy, KeyDistribution};

fn args() -> StressArgs {
    StressArgs {
        prefill: 1_000,
        threads: 4,
        sleep: 0,
        seed: 0,
        policy: InsertPolicy::Uniform,
        distribution: KeyDistribution::Uniform,
        max_key: u64::MAX - 3,
        min_key: 0,
        push_threads: 1,
    }
}

fn assert_invalid(args: &StressArgs, tagged_values: bool) {
    assert!(matches!(
        stress_settings(args, tagged_values),
        Err(Error::ConfigInvalid(_))
    ));
}

#[test]
fn default_arguments_validate() {
    let settings = stress_settings(&args(), false).unwrap();
    assert_eq!(settings.num_threads, 4);
    assert_eq!(settings.prefill_size, 1_000);
    assert_eq!(settings.insert_config.max_key, u64::MAX - 3);
}

#[test]
fn zero_threads_rejected() {
    let mut args = args();
    args.threads = 0;
    assert_invalid(&args, false);
}

#[test]
fn inverted_key_range_rejected() {
    let mut args = args();
    args.min_key = 10;
    args.max_key = 9;
    assert_invalid(&args, false);
}

#[test]
fn reserved_key_range_top_rejected() {
    let mut args = args();
    args.max_key = u64::MAX;
    assert_invalid(&args, false);
}

#[test]
fn split_without_push_threads_rejected() {
    let mut args = args();
    args.policy = InsertPolicy::Split;
    args.push_threads = 0;
    assert_invalid(&args, false);
}

#[test]
fn split_with_too_many_push_threads_rejected() {
    let mut args = args();
    args.policy = InsertPolicy::Split;
    args.push_threads = 5;
    assert_invalid(&args, false);
}

#[test]
fn split_with_push_threads_validates() {
    let mut args = args();
    args.policy = InsertPolicy::Split;
    args.push_threads = 2;
    let settings = stress_settings(&args, false).unwrap();
    assert_eq!(settings.insert_config.num_push_threads, 2);
}

#[test]
fn value_tag_bounds_quality_thread_count() {
    let mut args = args();
    args.threads = 256;
    assert_invalid(&args, true);
    // The throughput driver has no value tags and takes any count.
    assert!(stress_settings(&args, false).is_ok());

    args.threads = 255;
    assert!(stress_settings(&args, true).is_ok());
}
