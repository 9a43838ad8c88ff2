//! # Relax strategies
//!
//! What a waiting thread does between two failed lock attempts.
//!
//! A lock creates a fresh strategy value at the start of every acquisition and
//! calls [`Relax::relax`] after each failed attempt, so strategies may keep
//! per-acquisition state (such as a growing spin count) without any sharing.
//!
//! - [`Spin`] issues a single [`core::hint::spin_loop`] per retry. This is the
//!   plain busy-wait: the thread never leaves the CPU and there is no bound on
//!   how long it may spin.
//! - [`Backoff`] spins an exponentially growing number of hints, capped at
//!   [`MAX_SPIN`]. With the `std` feature it also yields the thread to the
//!   scheduler once contention has lasted long enough.
//!
//! ## Example
//! ```rust
//! use tas_spinlock::relax::{Backoff, Relax};
//!
//! let mut backoff = Backoff::new();
//! let before = backoff.current();
//! backoff.relax();
//! assert!(backoff.current() > before);
//! ```

use core::hint::spin_loop;

/// Upper bound on the number of spin hints issued by a single [`Backoff::relax`].
pub const MAX_SPIN: u32 = 1 << 12;

/// Spin count a fresh [`Backoff`] starts from.
pub const START_SPIN: u32 = 1 << 5;

/// Past this spin count, [`Backoff`] also yields the thread (`std` only).
#[cfg(feature = "std")]
const YIELD_THRESHOLD: u32 = 1 << 8;

/// Behaviour of a waiter between two failed acquisition attempts.
pub trait Relax: Default {
    /// Called once after every failed attempt.
    fn relax(&mut self);
}

/// One spin-loop hint per retry.
#[derive(Debug, Default, Clone, Copy)]
pub struct Spin;

impl Relax for Spin {
    #[inline(always)]
    fn relax(&mut self) {
        spin_loop();
    }
}

/// Bounded exponential backoff.
///
/// Each call to [`relax`](Relax::relax) spins for the current count and then
/// doubles it, up to [`MAX_SPIN`].
#[derive(Debug, Clone)]
pub struct Backoff {
    spin: u32,
}

impl Backoff {
    /// Creates a backoff starting at [`START_SPIN`].
    #[inline(always)]
    pub const fn new() -> Self {
        Self { spin: START_SPIN }
    }

    /// Creates a backoff starting at `start` spins (clamped to `1..=MAX_SPIN`).
    #[inline(always)]
    pub const fn with_start(start: u32) -> Self {
        let spin = if start == 0 {
            1
        } else if start > MAX_SPIN {
            MAX_SPIN
        } else {
            start
        };
        Self { spin }
    }

    /// Number of hints the next [`relax`](Relax::relax) will issue.
    #[inline(always)]
    pub fn current(&self) -> u32 {
        self.spin
    }

    /// Restores the starting spin count.
    #[inline(always)]
    pub fn reset(&mut self) {
        self.spin = START_SPIN;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Relax for Backoff {
    #[inline]
    fn relax(&mut self) {
        let end = self.spin;
        for _ in 0..end {
            spin_loop();
        }
        self.spin = (end << 1).min(MAX_SPIN);

        #[cfg(feature = "std")]
        if end > YIELD_THRESHOLD {
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_up_to_the_cap() {
        let mut b = Backoff::new();

        let mut prev = b.current();
        for _ in 0..20 {
            b.relax();
            let curr = b.current();
            assert!(curr >= prev, "backoff spin shrank");
            prev = curr;
        }

        assert_eq!(b.current(), MAX_SPIN);
    }

    #[test]
    fn reset_restores_the_start() {
        let mut b = Backoff::new();
        for _ in 0..5 {
            b.relax();
        }
        assert!(b.current() > START_SPIN);

        b.reset();
        assert_eq!(b.current(), START_SPIN);
    }

    #[test]
    fn with_start_is_clamped() {
        assert_eq!(Backoff::with_start(0).current(), 1);
        assert_eq!(Backoff::with_start(u32::MAX).current(), MAX_SPIN);
        assert_eq!(Backoff::with_start(100).current(), 100);
    }

    #[test]
    fn spin_is_stateless() {
        let mut s = Spin;
        for _ in 0..1000 {
            s.relax();
        }
    }
}
