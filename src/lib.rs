//! # tas-spinlock
//!
//! A **test-and-set spinlock** protecting a shared counter, and a harness that
//! runs concurrent workers against it to verify mutual exclusion empirically.
//!
//! The crate includes:
//!
//! - [`SpinLock`]: an atomic exclusion flag acquired by busy-waiting on an
//!   atomic exchange, with acquire/release memory ordering.
//! - [`relax`]: what a waiter does between failed attempts ([`Spin`] or
//!   bounded exponential [`Backoff`]).
//! - [`SpinMutex`]: the same flag as a [`lock_api`] raw mutex, for RAII access
//!   to owned data.
//! - [`ProtectedCounter`]: a plain integer that is only ever touched while a
//!   lock is held.
//!
//! With the default `std` feature:
//!
//! - [`BakeryLock`]: Lamport's bakery algorithm, a fair alternative.
//! - [`CriticalSectionSimulator`]: the protected work, with an artificial
//!   delay that widens race windows and a [`TraceRecord`] per execution.
//! - [`harness`]: spawns workers, joins them and returns a [`Verdict`].
//!
//! ## Quick example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use tas_spinlock::{ProtectedCounter, SpinLock};
//!
//! let shared = Arc::new((SpinLock::<tas_spinlock::Spin>::new(), ProtectedCounter::new()));
//! let workers: Vec<_> = (0..4)
//!     .map(|_| {
//!         let shared = Arc::clone(&shared);
//!         thread::spawn(move || {
//!             for _ in 0..100 {
//!                 shared.0.acquire();
//!                 // SAFETY: the spinlock is held.
//!                 unsafe { shared.1.increment() };
//!                 shared.0.release();
//!             }
//!         })
//!     })
//!     .collect();
//! for w in workers {
//!     w.join().unwrap();
//! }
//! // SAFETY: every worker has been joined.
//! assert_eq!(unsafe { shared.1.get() }, 400);
//! ```
//!
//! ## Feature flags
//!
//! - **`std`** (default): the bakery lock, the simulator, the harness and the
//!   console logger. Without it the crate is `no_std`.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod counter;
pub mod relax;
pub mod spinlock;

#[cfg(feature = "std")]
pub mod bakery;
#[cfg(feature = "std")]
pub mod config;
#[cfg(feature = "std")]
pub mod error;
#[cfg(feature = "std")]
pub mod exclusion;
#[cfg(feature = "std")]
pub mod harness;
#[cfg(feature = "std")]
pub mod logging;
#[cfg(feature = "std")]
pub mod simulator;

pub use counter::ProtectedCounter;
pub use relax::{Backoff, Relax, Spin};
pub use spinlock::{LockState, SpinLock, SpinMutex, SpinMutexGuard};

#[cfg(feature = "std")]
pub use bakery::{BakeryLock, Slot};
#[cfg(feature = "std")]
pub use config::{HarnessConfig, Policy};
#[cfg(feature = "std")]
pub use error::{Error, Result};
#[cfg(feature = "std")]
pub use exclusion::Exclusion;
#[cfg(feature = "std")]
pub use harness::{Outcome, Verdict, WorkerHarness};
#[cfg(feature = "std")]
pub use simulator::{CriticalSectionSimulator, Trace, TraceRecord};
