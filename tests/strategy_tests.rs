use rpqueues::{InsertConfig, InsertPolicy, InsertingStrategy, KeyDistribution};

fn config() -> InsertConfig {
    InsertConfig::default()
}

#[test]
fn same_seed_same_keystream() {
    let mut a = InsertingStrategy::new(2, config(), 77);
    let mut b = InsertingStrategy::new(2, config(), 77);
    for _ in 0..1_000 {
        assert_eq!(a.next_is_insert(), b.next_is_insert());
        assert_eq!(a.next_key(), b.next_key());
    }
}

#[test]
fn different_threads_different_keystreams() {
    let mut a = InsertingStrategy::new(0, config(), 77);
    let mut b = InsertingStrategy::new(1, config(), 77);
    let keys_a: Vec<u64> = (0..100).map(|_| a.next_key()).collect();
    let keys_b: Vec<u64> = (0..100).map(|_| b.next_key()).collect();
    assert_ne!(keys_a, keys_b);
}

#[test]
fn uniform_keys_stay_in_range() {
    let mut strategy = InsertingStrategy::new(0, InsertConfig {
        min_key: 100,
        max_key: 200,
        ..config()
    }, 1);
    for _ in 0..10_000 {
        let key = strategy.next_key();
        assert!((100..=200).contains(&key));
    }
}

#[test]
fn uniform_policy_is_roughly_balanced() {
    let mut strategy = InsertingStrategy::new(0, config(), 42);
    let inserts = (0..10_000).filter(|_| strategy.next_is_insert()).count();
    assert!((4_000..=6_000).contains(&inserts), "inserts {inserts}");
}

#[test]
fn split_policy_partitions_threads() {
    let split = InsertConfig {
        policy: InsertPolicy::Split,
        num_push_threads: 2,
        ..config()
    };
    for id in 0..4 {
        let mut strategy = InsertingStrategy::new(id, split, 5);
        for _ in 0..100 {
            assert_eq!(strategy.next_is_insert(), id < 2);
        }
    }
}

#[test]
fn producer_policy_only_thread_zero_inserts() {
    let producer = InsertConfig {
        policy: InsertPolicy::Producer,
        ..config()
    };
    for id in 0..3 {
        let mut strategy = InsertingStrategy::new(id, producer, 5);
        for _ in 0..100 {
            assert_eq!(strategy.next_is_insert(), id == 0);
        }
    }
}

#[test]
fn alternating_policy_flips_every_operation() {
    let alternating = InsertConfig {
        policy: InsertPolicy::Alternating,
        ..config()
    };
    let mut strategy = InsertingStrategy::new(1, alternating, 5);
    for i in 0..100 {
        assert_eq!(strategy.next_is_insert(), i % 2 == 0);
    }
}

#[test]
fn ascending_and_descending_ramp() {
    let ramp = InsertConfig {
        distribution: KeyDistribution::Ascending,
        min_key: 10,
        max_key: 14,
        ..config()
    };
    let mut strategy = InsertingStrategy::new(0, ramp, 1);
    let keys: Vec<u64> = (0..12).map(|_| strategy.next_key()).collect();
    assert_eq!(keys, [10, 11, 12, 13, 14, 10, 11, 12, 13, 14, 10, 11]);

    let ramp = InsertConfig {
        distribution: KeyDistribution::Descending,
        ..ramp
    };
    let mut strategy = InsertingStrategy::new(0, ramp, 1);
    let keys: Vec<u64> = (0..7).map(|_| strategy.next_key()).collect();
    assert_eq!(keys, [14, 13, 12, 11, 10, 14, 13]);
}

#[test]
fn dijkstra_increases_and_saturates() {
    let dijkstra = InsertConfig {
        distribution: KeyDistribution::Dijkstra,
        min_key: 0,
        max_key: 50,
        dijkstra_min_increase: 1,
        dijkstra_max_increase: 10,
        ..config()
    };
    let mut strategy = InsertingStrategy::new(0, dijkstra, 3);
    let mut last = 0u64;
    for _ in 0..200 {
        let key = strategy.next_key();
        assert!(key >= last, "keys must not decrease");
        assert!(key <= 50, "keys must saturate at the max");
        last = key;
    }
    assert_eq!(last, 50);
}

#[test]
fn threadid_keys_are_constant_per_thread() {
    let threadid = InsertConfig {
        distribution: KeyDistribution::ThreadId,
        min_key: 5,
        max_key: 8,
        ..config()
    };
    for id in 0..10 {
        let mut strategy = InsertingStrategy::new(id, threadid, 9);
        let expected = 5 + (id as u64) % 4;
        for _ in 0..20 {
            assert_eq!(strategy.next_key(), expected);
        }
    }
}
