//! Failures at the harness boundary.
//!
//! The locks and the counter never fail; everything that can go wrong while
//! setting up or running workers is reported through [`Error`].

use std::io;

/// Harness error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The OS refused to start a worker thread. Fatal to the run.
    #[error("failed to spawn worker {worker}")]
    ThreadCreation {
        worker: usize,
        #[source]
        source: io::Error,
    },
    /// A worker thread panicked before finishing its iterations.
    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: usize },
    /// The exclusion policy cannot admit that many workers.
    #[error("{policy} lock admits at most {capacity} workers, {requested} requested")]
    CapacityExceeded {
        policy: &'static str,
        capacity: usize,
        requested: usize,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
