//! # BakeryLock
//!
//! Lamport's bakery algorithm: a fair lock built only from atomic loads and
//! stores. Each participant first registers for a [`Slot`]. To enter, it
//! takes a ticket one higher than every ticket currently held and waits until
//! no other participant is still choosing a ticket or holds a smaller one
//! (ties broken by slot index). Tickets are served in order, so no waiter can
//! be overtaken indefinitely.
//!
//! All accesses use [`SeqCst`]: the algorithm relies on every thread seeing
//! the ticket stores in a single total order.
//!
//! ```rust
//! use tas_spinlock::BakeryLock;
//!
//! let lock: BakeryLock = BakeryLock::with_capacity(2);
//! let slot = lock.register().unwrap();
//! lock.acquire(&slot);
//! lock.release(&slot);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};

use crate::relax::{Relax, Spin};

/// Registration handle for one participant of a [`BakeryLock`].
#[derive(Debug, PartialEq, Eq)]
pub struct Slot(usize);

impl Slot {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A first-come first-served lock for a fixed number of participants.
pub struct BakeryLock<R = Spin> {
    choosing: Box<[AtomicBool]>,
    number: Box<[AtomicUsize]>,
    registered: AtomicUsize,
    _relax: PhantomData<fn() -> R>,
}

impl<R> BakeryLock<R> {
    /// Creates a lock with room for `capacity` participants.
    pub fn with_capacity(capacity: usize) -> Self {
        BakeryLock {
            choosing: (0..capacity).map(|_| AtomicBool::new(false)).collect(),
            number: (0..capacity).map(|_| AtomicUsize::new(0)).collect(),
            registered: AtomicUsize::new(0),
            _relax: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.number.len()
    }

    /// Claims the next free slot, or `None` once every slot is taken.
    pub fn register(&self) -> Option<Slot> {
        let capacity = self.capacity();
        self.registered
            .fetch_update(SeqCst, SeqCst, |n| (n < capacity).then_some(n + 1))
            .ok()
            .map(Slot)
    }

    /// Gives up the ticket held by `slot`.
    ///
    /// The caller must hold the lock through `slot`.
    pub fn release(&self, slot: &Slot) {
        self.number[slot.0].store(0, SeqCst);
    }

    /// Whether any participant currently holds or waits with a ticket.
    pub fn has_tickets(&self) -> bool {
        self.number.iter().any(|n| n.load(SeqCst) != 0)
    }
}

impl<R: Relax> BakeryLock<R> {
    /// Takes a ticket and waits for its turn.
    pub fn acquire(&self, slot: &Slot) {
        let me = slot.0;

        self.choosing[me].store(true, SeqCst);
        let max = self.number.iter().map(|n| n.load(SeqCst)).max().unwrap_or(0);
        let ticket = max + 1;
        self.number[me].store(ticket, SeqCst);
        self.choosing[me].store(false, SeqCst);

        for other in (0..self.capacity()).filter(|&j| j != me) {
            let mut relax = R::default();
            while self.choosing[other].load(SeqCst) {
                relax.relax();
            }

            let mut relax = R::default();
            loop {
                let theirs = self.number[other].load(SeqCst);
                if theirs == 0 || (theirs, other) > (ticket, me) {
                    break;
                }
                relax.relax();
            }
        }
    }
}

impl<R> fmt::Debug for BakeryLock<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BakeryLock")
            .field("capacity", &self.capacity())
            .field("registered", &self.registered.load(SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relax::Backoff;
    use crate::ProtectedCounter;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn register_stops_at_capacity() {
        let lock: BakeryLock = BakeryLock::with_capacity(2);
        assert_eq!(lock.register().map(|s| s.index()), Some(0));
        assert_eq!(lock.register().map(|s| s.index()), Some(1));
        assert!(lock.register().is_none());
        assert!(lock.register().is_none(), "failed registration consumed a slot");
    }

    #[test]
    fn release_clears_the_ticket() {
        let lock: BakeryLock = BakeryLock::with_capacity(3);
        let slot = lock.register().unwrap();

        lock.acquire(&slot);
        assert!(lock.has_tickets());

        lock.release(&slot);
        assert!(!lock.has_tickets());
    }

    #[test]
    fn waiter_is_blocked_until_release() {
        let lock: Arc<BakeryLock> = Arc::new(BakeryLock::with_capacity(2));
        let first = lock.register().unwrap();
        let second = lock.register().unwrap();

        lock.acquire(&first);
        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.acquire(&second);
                lock.release(&second);
            })
        };

        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!waiter.is_finished(), "bakery admitted two holders");

        lock.release(&first);
        waiter.join().unwrap();
    }

    #[test]
    fn concurrent_increments_are_exact() {
        const THREADS: usize = 4;
        const ITERATIONS: u64 = 500;

        let lock: Arc<BakeryLock<Backoff>> = Arc::new(BakeryLock::with_capacity(THREADS));
        let counter = Arc::new(ProtectedCounter::new());

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let slot = lock.register().unwrap();
                let lock = Arc::clone(&lock);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..ITERATIONS {
                        lock.acquire(&slot);
                        // SAFETY: the bakery lock is held.
                        unsafe { counter.increment() };
                        lock.release(&slot);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        // SAFETY: every worker has been joined.
        assert_eq!(unsafe { counter.get() }, THREADS as u64 * ITERATIONS);
    }
}
