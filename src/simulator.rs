//! # Critical-section simulator
//!
//! [`CriticalSectionSimulator::run`] performs the protected work: it reads the
//! [`ProtectedCounter`], sleeps to hold the race window open, writes the value
//! back plus one, and returns a [`TraceRecord`] describing the execution.
//!
//! The read and the write are deliberately separate, so an exclusion policy
//! that lets two threads in at once loses updates instead of hiding the bug.
//! The [`Trace`] of a run is checked afterwards for overlapping intervals and
//! for lost or duplicated updates.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use log::info;

use crate::ProtectedCounter;

/// One execution of the critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    pub worker: usize,
    /// Time since the simulator's epoch at which the section was entered.
    pub enter: Duration,
    pub exit: Duration,
    pub before: u64,
    pub after: u64,
}

impl TraceRecord {
    /// Whether the two executions were inside the section at the same time.
    pub fn overlaps(&self, other: &TraceRecord) -> bool {
        self.enter < other.exit && other.enter < self.exit
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker {} [{:?}..{:?}] {} -> {}",
            self.worker, self.enter, self.exit, self.before, self.after
        )
    }
}

/// Wraps the shared counter with an artificial delay.
#[derive(Debug)]
pub struct CriticalSectionSimulator {
    counter: ProtectedCounter,
    delay: Duration,
    epoch: Instant,
}

impl CriticalSectionSimulator {
    pub fn new(delay: Duration) -> Self {
        CriticalSectionSimulator {
            counter: ProtectedCounter::new(),
            delay,
            epoch: Instant::now(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Executes the critical section on behalf of `worker`.
    ///
    /// # Safety
    /// The lock guarding this simulator must be held for the whole call.
    pub unsafe fn run(&self, worker: usize) -> TraceRecord {
        let enter = self.epoch.elapsed();
        let before = self.counter.get();
        info!("[worker {worker}] entered critical section, counter = {before}");

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let after = before + 1;
        self.counter.set(after);
        info!("[worker {worker}] leaving critical section, counter = {after}");

        TraceRecord {
            worker,
            enter,
            exit: self.epoch.elapsed(),
            before,
            after,
        }
    }

    /// Reads the counter.
    ///
    /// # Safety
    /// No thread may be inside [`run`](Self::run) concurrently.
    pub unsafe fn value(&self) -> u64 {
        self.counter.get()
    }

    pub fn into_counter(self) -> ProtectedCounter {
        self.counter
    }
}

/// All executions of one run.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    records: Vec<TraceRecord>,
}

impl Trace {
    /// Builds a trace, ordering records by entry time.
    pub fn from_records(mut records: Vec<TraceRecord>) -> Self {
        records.sort_by_key(|r| (r.enter, r.exit));
        Trace { records }
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First pair of executions whose intervals intersect.
    ///
    /// Records are sorted by entry, so an overlap always shows up between a
    /// record and the one with the latest exit seen before it.
    pub fn find_overlap(&self) -> Option<(TraceRecord, TraceRecord)> {
        let mut latest: Option<&TraceRecord> = None;
        for record in &self.records {
            if let Some(prev) = latest {
                if prev.overlaps(record) {
                    return Some((*prev, *record));
                }
            }
            if latest.map_or(true, |prev| record.exit > prev.exit) {
                latest = Some(record);
            }
        }
        None
    }

    /// First execution that broke the `0, 1, 2, ...` chain of counter values.
    ///
    /// In a correct run the `before` values are exactly `0..len` and each
    /// execution added one. A repeated `before` means an update was lost.
    pub fn find_lost_update(&self) -> Option<TraceRecord> {
        let mut by_value = self.records.clone();
        by_value.sort_by_key(|r| r.before);
        by_value
            .into_iter()
            .zip(0u64..)
            .find(|(r, expected)| r.before != *expected || r.after != r.before + 1)
            .map(|(r, _)| r)
    }

    /// Number of executions recorded per worker, indexed by worker.
    pub fn per_worker(&self) -> Vec<usize> {
        let workers = self.records.iter().map(|r| r.worker + 1).max().unwrap_or(0);
        let mut counts = vec![0; workers];
        for r in &self.records {
            counts[r.worker] += 1;
        }
        counts
    }
}
