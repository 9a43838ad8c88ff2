//! # Worker harness
//!
//! Starts `threads` workers that each run `iterations` cycles of
//! enter → critical section → leave against one shared lock and one shared
//! counter, then joins them and checks that the counter equals
//! `threads × iterations` and that no two critical sections overlapped.
//!
//! ```no_run
//! use tas_spinlock::{harness, HarnessConfig, Verdict};
//!
//! let outcome = harness::run(&HarnessConfig::new(8, 1000)).unwrap();
//! assert_eq!(outcome.verify(), Verdict::Pass);
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::config::{HarnessConfig, Policy};
use crate::error::{Error, Result};
use crate::exclusion::Exclusion;
use crate::relax::{Backoff, Spin};
use crate::simulator::{CriticalSectionSimulator, Trace, TraceRecord};
use crate::{BakeryLock, SpinLock};

/// Body of one worker thread.
pub type WorkerFn = Box<dyn FnOnce() -> Vec<TraceRecord> + Send + 'static>;

/// Thread creation facility used by the harness.
pub trait Spawn {
    fn spawn(&self, name: String, work: WorkerFn) -> io::Result<JoinHandle<Vec<TraceRecord>>>;
}

/// Named OS threads from [`std::thread::Builder`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OsThreads;

impl Spawn for OsThreads {
    fn spawn(&self, name: String, work: WorkerFn) -> io::Result<JoinHandle<Vec<TraceRecord>>> {
        thread::Builder::new().name(name).spawn(work)
    }
}

/// The lock and the data it guards, shared by every worker.
struct Shared<E> {
    exclusion: E,
    simulator: CriticalSectionSimulator,
}

/// A running set of workers.
pub struct WorkerHarness<E: Exclusion> {
    shared: Arc<Shared<E>>,
    workers: Vec<JoinHandle<Vec<TraceRecord>>>,
    config: HarnessConfig,
    started: Instant,
}

impl<E: Exclusion> WorkerHarness<E> {
    /// Starts the workers on OS threads.
    pub fn spawn(config: &HarnessConfig, exclusion: E) -> Result<Self> {
        Self::spawn_with(config, exclusion, &OsThreads)
    }

    /// Starts the workers through `spawner`.
    ///
    /// Every worker is enlisted with the lock before the first thread starts.
    /// If a thread cannot be created, spawning stops, the workers already
    /// running are joined, and [`Error::ThreadCreation`] is returned.
    pub fn spawn_with(config: &HarnessConfig, exclusion: E, spawner: &impl Spawn) -> Result<Self> {
        config.validate()?;

        let tokens = (0..config.threads)
            .map(|worker| exclusion.enlist(worker))
            .collect::<Result<Vec<_>>>()
            .map_err(|err| match err {
                Error::CapacityExceeded {
                    policy, capacity, ..
                } => Error::CapacityExceeded {
                    policy,
                    capacity,
                    requested: config.threads,
                },
                other => other,
            })?;

        let shared = Arc::new(Shared {
            exclusion,
            simulator: CriticalSectionSimulator::new(config.critical_delay),
        });

        info!(
            "starting {} workers x {} iterations under the {} lock",
            config.threads,
            config.iterations,
            E::NAME
        );

        let started = Instant::now();
        let mut workers = Vec::with_capacity(config.threads);
        for (worker, token) in tokens.into_iter().enumerate() {
            let work: WorkerFn = {
                let shared = Arc::clone(&shared);
                let (iterations, pause) = (config.iterations, config.pause);
                Box::new(move || run_worker(&*shared, token, worker, iterations, pause))
            };

            match spawner.spawn(format!("worker-{worker}"), work) {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    error!("could not start worker {worker}: {source}");
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(Error::ThreadCreation { worker, source });
                }
            }
        }

        Ok(WorkerHarness {
            shared,
            workers,
            config: config.clone(),
            started,
        })
    }

    /// Waits for every worker and collects the result of the run.
    pub fn join_all(self) -> Result<Outcome> {
        let mut records = Vec::with_capacity(self.config.threads * self.config.iterations);
        let mut panicked = None;

        for (worker, handle) in self.workers.into_iter().enumerate() {
            match handle.join() {
                Ok(mut trace) => records.append(&mut trace),
                Err(_) => {
                    error!("worker {worker} panicked");
                    panicked.get_or_insert(worker);
                }
            }
        }
        if let Some(worker) = panicked {
            return Err(Error::WorkerPanicked { worker });
        }

        // SAFETY: every worker has been joined, so none is inside the
        // critical section and the joins order their writes before this read.
        let counter = unsafe { self.shared.simulator.value() };

        Ok(Outcome {
            policy: E::NAME,
            threads: self.config.threads,
            iterations: self.config.iterations,
            counter,
            trace: Trace::from_records(records),
            elapsed: self.started.elapsed(),
        })
    }
}

fn run_worker<E: Exclusion>(
    shared: &Shared<E>,
    token: E::Token,
    worker: usize,
    iterations: usize,
    pause: Duration,
) -> Vec<TraceRecord> {
    let mut records = Vec::with_capacity(iterations);
    debug!("[worker {worker}] started");

    for iteration in 1..=iterations {
        debug!("[worker {worker}] iteration {iteration}, trying to acquire the lock");
        shared.exclusion.enter(&token);
        debug!("[worker {worker}] lock acquired");

        // SAFETY: the lock is held until `leave` below.
        let record = unsafe { shared.simulator.run(worker) };

        shared.exclusion.leave(&token);
        debug!("[worker {worker}] lock released");
        records.push(record);

        if !pause.is_zero() {
            thread::sleep(pause);
        }
    }

    debug!("[worker {worker}] finished");
    records
}

/// Runs every worker's cycles one after another on the calling thread.
///
/// Nothing runs concurrently, so no lock is taken: exclusion comes from
/// serializing all work on a single coordinator.
pub fn run_serialized(config: &HarnessConfig) -> Result<Outcome> {
    config.validate()?;
    info!(
        "running {} workers x {} iterations serialized on the coordinator",
        config.threads, config.iterations
    );

    let started = Instant::now();
    let simulator = CriticalSectionSimulator::new(config.critical_delay);
    let mut records = Vec::with_capacity(config.threads * config.iterations);

    for worker in 0..config.threads {
        for _ in 0..config.iterations {
            // SAFETY: only this thread can reach `simulator`.
            records.push(unsafe { simulator.run(worker) });
            if !config.pause.is_zero() {
                thread::sleep(config.pause);
            }
        }
    }

    Ok(Outcome {
        policy: "serialized",
        threads: config.threads,
        iterations: config.iterations,
        counter: simulator.into_counter().into_inner(),
        trace: Trace::from_records(records),
        elapsed: started.elapsed(),
    })
}

/// Runs the harness under `config.policy`.
pub fn run(config: &HarnessConfig) -> Result<Outcome> {
    match config.policy {
        Policy::TestAndSet => WorkerHarness::spawn(config, SpinLock::<Spin>::new())?.join_all(),
        Policy::TestAndSetBackoff => {
            WorkerHarness::spawn(config, SpinLock::<Backoff>::new())?.join_all()
        }
        Policy::Bakery => {
            let lock: BakeryLock<Spin> = BakeryLock::with_capacity(config.threads);
            WorkerHarness::spawn(config, lock)?.join_all()
        }
        Policy::Serialized => run_serialized(config),
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub policy: &'static str,
    pub threads: usize,
    pub iterations: usize,
    pub counter: u64,
    pub trace: Trace,
    pub elapsed: Duration,
}

impl Outcome {
    pub fn expected(&self) -> u64 {
        self.threads as u64 * self.iterations as u64
    }

    /// Checks the final counter, then the trace.
    pub fn verify(&self) -> Verdict {
        let expected = self.expected();
        if self.counter != expected {
            return Verdict::Mismatch {
                expected,
                actual: self.counter,
            };
        }
        if let Some((first, second)) = self.trace.find_overlap() {
            return Verdict::Overlap { first, second };
        }
        if let Some(record) = self.trace.find_lost_update() {
            return Verdict::LostUpdate { record };
        }
        Verdict::Pass
    }
}

/// Self-check result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// The counter does not equal `threads × iterations`.
    Mismatch { expected: u64, actual: u64 },
    /// Two critical sections were executing at the same time.
    Overlap {
        first: TraceRecord,
        second: TraceRecord,
    },
    /// An execution did not build on the value left by its predecessor.
    LostUpdate { record: TraceRecord },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("mutual exclusion held"),
            Verdict::Mismatch { expected, actual } => {
                write!(f, "race detected: counter is {actual}, expected {expected}")
            }
            Verdict::Overlap { first, second } => {
                write!(f, "critical sections overlapped: {first} and {second}")
            }
            Verdict::LostUpdate { record } => write!(f, "lost update at {record}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_case::test_case;

    /// Starts `allowed` threads, then refuses.
    struct FailAfter {
        allowed: usize,
        spawned: AtomicUsize,
    }

    impl Spawn for FailAfter {
        fn spawn(
            &self,
            name: String,
            work: WorkerFn,
        ) -> io::Result<JoinHandle<Vec<TraceRecord>>> {
            if self.spawned.fetch_add(1, Ordering::Relaxed) >= self.allowed {
                return Err(io::Error::new(io::ErrorKind::Other, "thread limit reached"));
            }
            OsThreads.spawn(name, work)
        }
    }

    #[test_case(1, 1 ; "one worker one iteration")]
    #[test_case(1, 50 ; "uncontended loop")]
    #[test_case(2, 3 ; "demo shape")]
    #[test_case(4, 250 ; "contended")]
    fn spinlock_run_counts_exactly(threads: usize, iterations: usize) {
        let config = HarnessConfig::new(threads, iterations);
        let outcome = WorkerHarness::spawn(&config, SpinLock::<Spin>::new())
            .unwrap()
            .join_all()
            .unwrap();

        assert_eq!(outcome.counter, (threads * iterations) as u64);
        assert_eq!(outcome.trace.len(), threads * iterations);
        assert_eq!(outcome.trace.per_worker(), vec![iterations; threads]);
        assert_eq!(outcome.verify(), Verdict::Pass);
    }

    #[test_case(Policy::TestAndSet)]
    #[test_case(Policy::TestAndSetBackoff)]
    #[test_case(Policy::Bakery)]
    #[test_case(Policy::Serialized)]
    fn every_policy_passes(policy: Policy) {
        let config = HarnessConfig::new(3, 40)
            .with_critical_delay(Duration::from_micros(50))
            .with_policy(policy);
        let outcome = run(&config).unwrap();
        assert_eq!(outcome.counter, 120);
        assert!(outcome.verify().is_pass(), "{}", outcome.verify());
    }

    #[test]
    fn spawn_failure_stops_the_run() {
        let spawner = FailAfter {
            allowed: 1,
            spawned: AtomicUsize::new(0),
        };
        let config = HarnessConfig::new(3, 5);

        let err = WorkerHarness::spawn_with(&config, SpinLock::<Spin>::new(), &spawner)
            .err()
            .expect("spawn failure was swallowed");

        assert!(matches!(err, Error::ThreadCreation { worker: 1, .. }));
        assert_eq!(spawner.spawned.load(Ordering::Relaxed), 2, "kept spawning");
    }

    #[test]
    fn bakery_capacity_is_enforced_before_spawning() {
        let spawner = FailAfter {
            allowed: usize::MAX,
            spawned: AtomicUsize::new(0),
        };
        let lock: BakeryLock = BakeryLock::with_capacity(1);

        let err = WorkerHarness::spawn_with(&HarnessConfig::new(2, 1), lock, &spawner)
            .err()
            .expect("capacity ignored");

        assert!(matches!(
            err,
            Error::CapacityExceeded {
                capacity: 1,
                requested: 2,
                ..
            }
        ));
        assert_eq!(spawner.spawned.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn invalid_config_starts_nothing() {
        let err = run(&HarnessConfig::new(0, 3)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn mismatch_is_reported() {
        let outcome = Outcome {
            policy: "none",
            threads: 2,
            iterations: 3,
            counter: 5,
            trace: Trace::default(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(
            outcome.verify(),
            Verdict::Mismatch {
                expected: 6,
                actual: 5
            }
        );
    }
}
