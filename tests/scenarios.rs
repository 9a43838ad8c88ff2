use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tas_spinlock::{
    harness, Backoff, HarnessConfig, LockState, Policy, ProtectedCounter, Spin, SpinLock, Verdict,
    WorkerHarness,
};
use test_case::test_case;

#[test]
fn two_workers_three_cycles_end_at_six() {
    let config = HarnessConfig::new(2, 3)
        .with_critical_delay(Duration::from_millis(5))
        .with_pause(Duration::from_millis(2));

    let outcome = harness::run(&config).unwrap();

    assert_eq!(outcome.counter, 6);
    assert_eq!(outcome.trace.len(), 6);
    assert_eq!(outcome.trace.find_overlap(), None);
    assert_eq!(outcome.verify(), Verdict::Pass);
}

#[test_case(Policy::TestAndSet)]
#[test_case(Policy::TestAndSetBackoff)]
fn eight_by_thousand_is_exact_on_every_run(policy: Policy) {
    let config = HarnessConfig::new(8, 1000).with_policy(policy);
    for round in 0..5 {
        let outcome = harness::run(&config).unwrap();
        assert_eq!(outcome.counter, 8000, "round {round} lost updates");
        assert!(outcome.verify().is_pass(), "round {round}: {}", outcome.verify());
    }
}

#[test]
fn bakery_stays_exact_under_contention() {
    let config = HarnessConfig::new(4, 300).with_policy(Policy::Bakery);
    let outcome = harness::run(&config).unwrap();
    assert_eq!(outcome.counter, 1200);
    assert!(outcome.verify().is_pass(), "{}", outcome.verify());
}

#[test]
fn single_worker_matches_a_plain_loop() {
    let iterations = 64;
    let outcome = WorkerHarness::spawn(&HarnessConfig::new(1, iterations), SpinLock::<Spin>::new())
        .unwrap()
        .join_all()
        .unwrap();

    let mut plain = 0u64;
    for _ in 0..iterations {
        plain += 1;
    }

    assert_eq!(outcome.counter, plain);
    let befores: Vec<u64> = outcome.trace.records().iter().map(|r| r.before).collect();
    assert_eq!(befores, (0..plain).collect::<Vec<_>>());
}

/// Every transition seen while holding the lock, recorded in the protected
/// region itself.
struct Transitions {
    lock: SpinLock<Backoff>,
    holders: AtomicUsize,
    log: std::cell::UnsafeCell<Vec<LockState>>,
    counter: ProtectedCounter,
}

// Safety: `log` and `counter` are only touched while `lock` is held.
unsafe impl Sync for Transitions {}

#[test]
fn lock_state_alternates_between_free_and_locked() {
    const THREADS: usize = 6;
    const ITERATIONS: usize = 500;

    let shared = Arc::new(Transitions {
        lock: SpinLock::new(),
        holders: AtomicUsize::new(0),
        log: std::cell::UnsafeCell::new(Vec::new()),
        counter: ProtectedCounter::new(),
    });

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for _ in 0..ITERATIONS {
                    shared.lock.acquire();
                    assert_eq!(shared.holders.fetch_add(1, Ordering::Relaxed), 0, "double acquire");
                    // SAFETY: the lock is held.
                    unsafe {
                        (*shared.log.get()).push(LockState::Locked);
                        shared.counter.increment();
                        (*shared.log.get()).push(LockState::Free);
                    }
                    assert_eq!(shared.holders.fetch_sub(1, Ordering::Relaxed), 1, "double release");
                    shared.lock.release();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let shared = Arc::try_unwrap(shared).ok().expect("workers still hold the state");
    let log = shared.log.into_inner();
    assert_eq!(log.len(), 2 * THREADS * ITERATIONS);
    for (i, pair) in log.chunks(2).enumerate() {
        assert_eq!(pair, [LockState::Locked, LockState::Free], "transition {i}");
    }
    assert_eq!(shared.counter.into_inner(), (THREADS * ITERATIONS) as u64);
    assert_eq!(shared.lock.state(), LockState::Free);
}
