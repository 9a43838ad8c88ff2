//! The seam between the worker harness and a lock implementation.

use crate::error::{Error, Result};
use crate::relax::Relax;
use crate::{BakeryLock, Slot, SpinLock};

/// A mutual-exclusion policy the harness can drive.
///
/// Each worker is enlisted once, before any worker thread starts, and gets a
/// token it presents on every `enter`/`leave` pair.
pub trait Exclusion: Send + Sync + 'static {
    /// Per-worker state handed to the worker thread.
    type Token: Send + 'static;

    /// Name used in logs and errors.
    const NAME: &'static str;

    fn enlist(&self, worker: usize) -> Result<Self::Token>;

    /// Blocks until the worker holds the lock.
    fn enter(&self, token: &Self::Token);

    /// Releases the lock held by the worker.
    fn leave(&self, token: &Self::Token);
}

impl<R: Relax + 'static> Exclusion for SpinLock<R> {
    type Token = ();

    const NAME: &'static str = "test-and-set";

    fn enlist(&self, _worker: usize) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn enter(&self, _token: &()) {
        self.acquire();
    }

    #[inline]
    fn leave(&self, _token: &()) {
        self.release();
    }
}

impl<R: Relax + 'static> Exclusion for BakeryLock<R> {
    type Token = Slot;

    const NAME: &'static str = "bakery";

    fn enlist(&self, worker: usize) -> Result<Slot> {
        self.register().ok_or(Error::CapacityExceeded {
            policy: Self::NAME,
            capacity: self.capacity(),
            requested: worker + 1,
        })
    }

    #[inline]
    fn enter(&self, slot: &Slot) {
        self.acquire(slot);
    }

    #[inline]
    fn leave(&self, slot: &Slot) {
        self.release(slot);
    }
}
