//! Single-permit hand-off semaphore.

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Returned by [`Baton::acquire`] once the baton has been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("baton cancelled")]
pub struct Cancelled;

#[derive(Debug, Default)]
struct BatonState {
    permit: bool,
    cancelled: bool,
}

/// A semaphore holding at most one permit.
///
/// One thread parks in [`acquire`](Self::acquire); some other thread hands it
/// the permit with [`release`](Self::release). A permit released before the
/// owner parks is kept, so release-then-acquire never loses a wake-up.
///
/// [`cancel`](Self::cancel) is sticky and wins over a pending permit: every
/// current and future `acquire` fails with [`Cancelled`].
#[derive(Debug, Default)]
pub struct Baton {
    state: Mutex<BatonState>,
    handed: Condvar,
}

impl Baton {
    /// Create a baton with no permit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until a permit is available and take it.
    pub fn acquire(&self) -> Result<(), Cancelled> {
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return Err(Cancelled);
            }
            if state.permit {
                state.permit = false;
                return Ok(());
            }
            self.handed.wait(&mut state);
        }
    }

    /// Hand the permit to the owner. Does nothing once cancelled.
    ///
    /// # Panics
    ///
    /// Panics if a permit is already outstanding. Two releases without an
    /// acquire in between means two threads believed they held control.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if state.cancelled {
            return;
        }
        assert!(
            !state.permit,
            "baton released while a permit is still outstanding"
        );
        state.permit = true;
        drop(state);
        self.handed.notify_one();
    }

    /// Fail every current and future [`acquire`](Self::acquire).
    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.handed.notify_all();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Whether a released permit is waiting to be acquired.
    #[must_use]
    pub fn has_permit(&self) -> bool {
        self.state.lock().permit
    }
}
