//! Countdown latch.

use parking_lot::{Condvar, Mutex};

/// Blocks waiters until `count_down` has been called a fixed number of times.
#[derive(Debug)]
pub struct Latch {
    remaining: Mutex<usize>,
    open: Condvar,
}

impl Latch {
    /// Create a latch that opens after `count` calls to [`count_down`](Self::count_down).
    #[must_use]
    pub const fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            open: Condvar::new(),
        }
    }

    /// Decrement the count, waking all waiters when it reaches zero.
    ///
    /// Extra calls after the latch has opened are ignored.
    pub fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        if *remaining == 0 {
            return;
        }
        *remaining -= 1;
        if *remaining == 0 {
            drop(remaining);
            self.open.notify_all();
        }
    }

    /// Block until the count reaches zero.
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.open.wait(&mut remaining);
        }
    }

    /// Current count.
    #[must_use]
    pub fn count(&self) -> usize {
        *self.remaining.lock()
    }
}
