//! # SpinLock
//!
//! A test-and-set spinlock: a single atomic flag that a thread acquires by
//! atomically exchanging `Locked` into it and checking that the previous value
//! was `Free`. A thread that loses the exchange retries until it wins, calling
//! its [`Relax`] strategy between attempts.
//!
//! ## Memory ordering
//!
//! The exchange in [`SpinLock::acquire`] uses [`Acquire`] ordering and the
//! store in [`SpinLock::release`] uses [`Release`] ordering. A successful
//! acquisition therefore synchronizes with the release that freed the flag,
//! so every write made inside one critical section is visible to the next
//! holder before it touches the protected data.
//!
//! ## Limitations
//! - The lock is **not fair**. Which waiter wins is unspecified and a thread
//!   can starve under adversarial scheduling.
//! - There is no timeout: [`acquire`](SpinLock::acquire) spins until it wins.
//! - The lock is **not reentrant**.
//! - Releasing a lock the caller does not hold is not prevented in release
//!   builds. Debug builds with the `std` feature record the holder and panic
//!   on such a release.
//!
//! ## Example
//! ```rust
//! use tas_spinlock::SpinLock;
//!
//! static LOCK: SpinLock = SpinLock::new();
//!
//! LOCK.acquire();
//! assert!(LOCK.is_locked());
//! LOCK.release();
//! assert!(!LOCK.is_locked());
//! ```
//!
//! The [`SpinMutex`] alias wraps the flag in a [`lock_api::Mutex`] for
//! guard-based access to owned data:
//! ```rust
//! use tas_spinlock::SpinMutex;
//!
//! let counter: SpinMutex<u32> = SpinMutex::new(0);
//! *counter.lock() += 1;
//! assert_eq!(*counter.lock(), 1);
//! ```

use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{
    AtomicBool,
    Ordering::{Acquire, Relaxed, Release},
};

#[cfg(all(debug_assertions, feature = "std"))]
use core::sync::atomic::AtomicUsize;

use crate::relax::{Relax, Spin};

/// Observable state of the exclusion flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Free,
    Locked,
}

/// A test-and-set spinlock.
///
/// `R` selects what a waiter does between failed exchanges; the default
/// [`Spin`] issues one spin-loop hint per retry.
pub struct SpinLock<R = Spin> {
    locked: AtomicBool,
    /// Tag of the holding thread, 0 when free.
    #[cfg(all(debug_assertions, feature = "std"))]
    owner: AtomicUsize,
    _relax: PhantomData<fn() -> R>,
}

/// A value protected by a [`SpinLock`].
pub type SpinMutex<T, R = Spin> = lock_api::Mutex<SpinLock<R>, T>;

/// RAII guard for a [`SpinMutex`]; the lock is released on drop.
pub type SpinMutexGuard<'a, T, R = Spin> = lock_api::MutexGuard<'a, SpinLock<R>, T>;

impl<R> SpinLock<R> {
    /// Creates a free lock.
    #[inline(always)]
    pub const fn new() -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            #[cfg(all(debug_assertions, feature = "std"))]
            owner: AtomicUsize::new(0),
            _relax: PhantomData,
        }
    }

    /// Checks whether the lock is currently held.
    ///
    /// The answer may be stale by the time the caller looks at it.
    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Relaxed)
    }

    /// Snapshot of the flag as a [`LockState`].
    #[inline]
    pub fn state(&self) -> LockState {
        if self.is_locked() {
            LockState::Locked
        } else {
            LockState::Free
        }
    }

    /// Releases the lock.
    ///
    /// The caller must hold the lock, and must release it exactly once per
    /// successful acquisition.
    ///
    /// # Panics
    /// In debug builds with the `std` feature, panics if the calling thread
    /// does not hold the lock.
    #[inline]
    pub fn release(&self) {
        #[cfg(all(debug_assertions, feature = "std"))]
        {
            let holder = self.owner.swap(0, Relaxed);
            assert!(
                holder == thread_tag(),
                "spinlock released by a thread that does not hold it"
            );
        }
        self.locked.store(false, Release);
    }

    #[inline(always)]
    fn mark_owner(&self) {
        #[cfg(all(debug_assertions, feature = "std"))]
        self.owner.store(thread_tag(), Relaxed);
    }
}

impl<R: Relax> SpinLock<R> {
    /// Acquires the lock, busy-waiting until it becomes available.
    ///
    /// Every attempt is an atomic exchange of `Locked` into the flag. A prior
    /// value of `Free` means the caller now holds the lock; otherwise the
    /// caller relaxes and tries again.
    #[inline]
    pub fn acquire(&self) {
        let mut relax = R::default();
        while self.locked.swap(true, Acquire) {
            relax.relax();
        }
        self.mark_owner();
    }

    /// Makes a single acquisition attempt.
    ///
    /// Returns `true` if the caller now holds the lock.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        if self.locked.swap(true, Acquire) {
            return false;
        }
        self.mark_owner();
        true
    }
}

impl<R> Default for SpinLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for SpinLock<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("state", &self.state())
            .finish()
    }
}

// Safety: `lock` and `try_lock` only report success after winning the
// exchange, and `unlock` is only reached through a guard that did so.
unsafe impl<R: Relax> lock_api::RawMutex for SpinLock<R> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    // The debug owner tag is per thread, so guards must stay on their thread.
    type GuardMarker = lock_api::GuardNoSend;

    #[inline]
    fn lock(&self) {
        self.acquire();
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.try_acquire()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.release();
    }

    #[inline]
    fn is_locked(&self) -> bool {
        SpinLock::is_locked(self)
    }
}

/// Address of a thread-local byte: unique and non-zero per live thread.
#[cfg(all(debug_assertions, feature = "std"))]
fn thread_tag() -> usize {
    std::thread_local!(static TAG: u8 = const { 0 });
    TAG.with(|tag| tag as *const u8 as usize)
}
