//! A plain counter whose consistency comes entirely from an external lock.

use core::cell::UnsafeCell;
use core::fmt;

/// An integer shared between threads without any synchronization of its own.
///
/// Every access through `&self` is `unsafe`: the caller must hold the lock
/// that guards this counter for the whole access. Exclusive access through
/// `&mut self` or by value needs no lock.
pub struct ProtectedCounter {
    value: UnsafeCell<u64>,
}

// Safety: shared access is only possible through the `unsafe` accessors,
// whose contract requires the guarding lock to be held.
unsafe impl Sync for ProtectedCounter {}

impl ProtectedCounter {
    pub const fn new() -> Self {
        ProtectedCounter {
            value: UnsafeCell::new(0),
        }
    }

    /// Reads the counter.
    ///
    /// # Safety
    /// The guarding lock must be held, or every other user must have finished.
    #[inline]
    pub unsafe fn get(&self) -> u64 {
        *self.value.get()
    }

    /// Overwrites the counter.
    ///
    /// # Safety
    /// The guarding lock must be held.
    #[inline]
    pub unsafe fn set(&self, value: u64) {
        *self.value.get() = value;
    }

    /// Adds one and returns the new value.
    ///
    /// # Safety
    /// The guarding lock must be held.
    #[inline]
    pub unsafe fn increment(&self) -> u64 {
        let next = self.get() + 1;
        self.set(next);
        next
    }

    pub fn get_mut(&mut self) -> &mut u64 {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> u64 {
        self.value.into_inner()
    }
}

impl Default for ProtectedCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProtectedCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedCounter").finish_non_exhaustive()
    }
}
