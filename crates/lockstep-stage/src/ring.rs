//! The runner ring: one baton and one liveness state per enqueued stage.
//!
//! The ring is immutable once a run starts. Its only shared mutable parts are
//! the per-runner [`RunnerState`]s and batons. Control moves around it by
//! handing the baton to the next live runner in enqueue order:
//!
//! ```text
//!        ┌──────────── wraps ────────────┐
//!        ▼                               │
//!   [0: Terminated] → [1: Running] → [2: Parked] → [3: Parked]
//!                          │  yield_now()
//!                          └──▶ release baton 2, park on baton 1
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use lockstep_sync::{Baton, Latch};
use tracing::trace;

use crate::Interrupted;

/// Lifecycle of one stage runner.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Thread not yet parked on its baton.
    NotStarted = 0,
    /// Waiting for the baton, either before the first run or inside `yield_now`.
    Parked = 1,
    /// Holding the baton and executing stage logic.
    Running = 2,
    /// Stage returned, failed, or was interrupted. Sticky.
    Terminated = 3,
}

impl RunnerState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::NotStarted,
            1 => Self::Parked,
            2 => Self::Running,
            _ => Self::Terminated,
        }
    }

    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Terminated)
    }
}

struct Runner {
    state: AtomicU8,
    baton: Baton,
}

pub(crate) struct Ring {
    runners: Box<[Runner]>,
    parked: Latch,
    aborted: AtomicBool,
}

impl Ring {
    pub(crate) fn new(len: usize) -> Self {
        let runners = (0..len)
            .map(|_| Runner {
                state: AtomicU8::new(RunnerState::NotStarted as u8),
                baton: Baton::new(),
            })
            .collect();

        Self {
            runners,
            parked: Latch::new(len),
            aborted: AtomicBool::new(false),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.runners.len()
    }

    pub(crate) fn state(&self, index: usize) -> RunnerState {
        RunnerState::from_u8(self.runners[index].state.load(Ordering::Acquire))
    }

    pub(crate) fn states(&self) -> Vec<RunnerState> {
        (0..self.len()).map(|i| self.state(i)).collect()
    }

    fn set_state(&self, index: usize, state: RunnerState) {
        let slot = &self.runners[index].state;
        // Terminated is sticky.
        if RunnerState::from_u8(slot.load(Ordering::Acquire)) != RunnerState::Terminated {
            slot.store(state as u8, Ordering::Release);
        }
    }

    /// First live runner strictly after `current`, wrapping, never `current` itself.
    pub(crate) fn next_live(&self, current: usize) -> Option<usize> {
        let len = self.len();
        (1..len)
            .map(|offset| (current + offset) % len)
            .find(|&index| self.state(index).is_live())
    }

    /// First park of a freshly spawned runner: announce readiness, then wait
    /// for the baton.
    pub(crate) fn park_initial(&self, index: usize) -> Result<(), Interrupted> {
        self.set_state(index, RunnerState::Parked);
        self.parked.count_down();
        self.acquire(index)
    }

    /// Block until every runner has parked at least once.
    pub(crate) fn wait_all_parked(&self) {
        self.parked.wait();
    }

    /// Give the baton to the first runner.
    pub(crate) fn start(&self) {
        trace!("baton -> stage 0");
        self.release(0);
    }

    /// Pass control from `index` to the next live runner and wait to get it back.
    ///
    /// A no-op when no other runner is live.
    pub(crate) fn yield_from(&self, index: usize) -> Result<(), Interrupted> {
        if self.is_aborted() {
            return Err(Interrupted);
        }
        let Some(next) = self.next_live(index) else {
            return Ok(());
        };

        self.set_state(index, RunnerState::Parked);
        trace!(from = index, to = next, "baton yielded");
        self.release(next);
        self.acquire(index)
    }

    /// Mark `index` terminated and pass the baton on, if anyone is left.
    pub(crate) fn finish(&self, index: usize) {
        self.set_state(index, RunnerState::Terminated);
        if let Some(next) = self.next_live(index) {
            trace!(from = index, to = next, "baton handed on after completion");
            self.release(next);
        }
    }

    /// Mark `index` terminated without handing the baton on.
    pub(crate) fn retire(&self, index: usize) {
        self.set_state(index, RunnerState::Terminated);
    }

    /// Cancel every baton: parked runners wake with [`Interrupted`].
    pub(crate) fn abort(&self) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!("aborting run");
        for runner in &*self.runners {
            runner.baton.cancel();
        }
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    fn acquire(&self, index: usize) -> Result<(), Interrupted> {
        self.runners[index]
            .baton
            .acquire()
            .map_err(|_| Interrupted)?;
        self.set_state(index, RunnerState::Running);
        Ok(())
    }

    // After an abort the target may already be retired; its baton is
    // cancelled and ignores the release.
    fn release(&self, index: usize) {
        self.runners[index].baton.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_live_wraps_and_skips() {
        let ring = Ring::new(4);
        assert_eq!(ring.next_live(0), Some(1));
        assert_eq!(ring.next_live(3), Some(0));

        ring.retire(0);
        assert_eq!(ring.next_live(3), Some(1));

        ring.retire(1);
        ring.retire(2);
        assert_eq!(ring.next_live(3), None);
    }

    #[test]
    fn test_next_live_never_returns_self() {
        let ring = Ring::new(2);
        ring.retire(1);
        assert_eq!(ring.next_live(0), None);
    }

    #[test]
    fn test_terminated_is_sticky() {
        let ring = Ring::new(2);
        ring.retire(0);
        ring.set_state(0, RunnerState::Running);
        assert_eq!(ring.state(0), RunnerState::Terminated);
    }

    #[test]
    fn test_yield_without_live_peer_is_noop() {
        let ring = Ring::new(2);
        ring.retire(1);
        assert_eq!(ring.yield_from(0), Ok(()));
    }

    #[test]
    fn test_abort_interrupts_parked_runner() {
        let ring = std::sync::Arc::new(Ring::new(2));

        let parked = {
            let ring = std::sync::Arc::clone(&ring);
            std::thread::spawn(move || ring.park_initial(1))
        };

        ring.parked.count_down();
        ring.wait_all_parked();
        ring.abort();

        assert_eq!(parked.join().unwrap(), Err(Interrupted));
        assert!(ring.is_aborted());
    }
}
