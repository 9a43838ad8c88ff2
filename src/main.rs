//! Mutual exclusion with test-and-set.
//!
//! Runs the worker harness (by default two workers, three cycles each) and
//! prints every acquisition, release and critical-section entry to stdout.
//! `SPIN_THREADS`, `SPIN_ITERATIONS` and `SPIN_POLICY` change the run; `LOG`
//! changes the verbosity.
//!
//! Exits 0 when exclusion held, 1 on a harness error such as a thread that
//! could not be created, and 2 when the self-check failed.

use std::process::ExitCode;

use log::{error, info};
use tas_spinlock::{harness, logging, HarnessConfig};

fn main() -> ExitCode {
    if let Err(err) = logging::init() {
        eprintln!("logger unavailable: {err}");
    }

    let config = match HarnessConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match harness::run(&config) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let verdict = outcome.verify();
    info!(
        "final counter {} (expected {}: {} iterations x {} workers) in {:?}",
        outcome.counter,
        outcome.expected(),
        outcome.iterations,
        outcome.threads,
        outcome.elapsed
    );

    if verdict.is_pass() {
        info!("{verdict} under the {} policy", outcome.policy);
        ExitCode::SUCCESS
    } else {
        error!("{verdict}");
        ExitCode::from(2)
    }
}
