//! Countdown latch for waiting on one submission's jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// Releases waiters once it has been counted down `count` times.
pub(crate) struct CountLatch {
    remaining: AtomicUsize,
    lock: Mutex<()>,
    done: Condvar,
}

impl CountLatch {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            lock: Mutex::new(()),
            done: Condvar::new(),
        }
    }

    pub(crate) fn count_down(&self) {
        let previous = self.remaining.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "latch counted down past zero");
        if previous == 1 {
            let _guard = self.lock.lock();
            self.done.notify_all();
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    /// Block until the latch opens or `until` passes.
    pub(crate) fn block_until(&self, until: Option<Instant>) {
        let mut guard = self.lock.lock();
        if self.is_done() {
            return;
        }
        match until {
            Some(deadline) => {
                self.done.wait_until(&mut guard, deadline);
            }
            None => self.done.wait(&mut guard),
        }
    }
}
