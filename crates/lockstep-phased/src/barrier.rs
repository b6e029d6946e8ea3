//! Reusable rendezvous barrier with a pre-release hook.
//!
//! A pulse forms in two steps. A worker first *enlists* (while the executor
//! still holds its queue lock, so the join decision and the enlistment are
//! one atomic step), then *arrives* by calling [`PhaseBarrier::wait`]. The
//! last of `parties` arrivals consults the [`BeforePhase`] hook, releases
//! everyone, and resets the barrier for the next pulse.

use std::panic::{AssertUnwindSafe, catch_unwind};

use lockstep_sync::panic_message;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, error};

/// What the barrier does after a pulse has fully arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseControl {
    /// Release the pulse and reset for the next one.
    Continue,
    /// Release the pulse, then break the barrier so no further pulse forms.
    Terminate,
}

/// Hook consulted once per pulse, just before its members are released.
///
/// Receives the zero-based phase index and the number of parties that
/// arrived.
pub trait BeforePhase: Send + Sync {
    fn before_phase(&self, phase: u64, arrived: usize) -> PhaseControl;
}

impl<F> BeforePhase for F
where
    F: Fn(u64, usize) -> PhaseControl + Send + Sync,
{
    fn before_phase(&self, phase: u64, arrived: usize) -> PhaseControl {
        self(phase, arrived)
    }
}

/// The barrier was broken before this party's pulse could release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("phase barrier is broken")]
pub struct BarrierBroken;

#[derive(Debug, Default)]
struct BarrierState {
    phase: u64,
    enlisted: usize,
    arrived: usize,
    broken: bool,
}

pub(crate) struct PhaseBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
    before_phase: Option<Box<dyn BeforePhase>>,
}

impl PhaseBarrier {
    /// Barrier releasing pulses of `parties`, consulting `before_phase` if given.
    pub(crate) fn new(parties: usize, before_phase: Option<Box<dyn BeforePhase>>) -> Self {
        debug_assert!(parties > 0);
        Self {
            parties,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
            before_phase,
        }
    }

    /// Parties needed to release a pulse.
    pub(crate) fn parties(&self) -> usize {
        self.parties
    }

    /// Whether some party has enlisted in the current pulse.
    pub(crate) fn is_forming(&self) -> bool {
        self.state.lock().enlisted > 0
    }

    /// Commit the caller to the current pulse. Must be followed by [`wait`](Self::wait).
    pub(crate) fn enlist(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.enlisted < self.parties, "pulse over-subscribed");
        state.enlisted += 1;
    }

    /// Arrive and block until the pulse is released.
    ///
    /// Returns the phase index the caller was released in.
    pub(crate) fn wait(&self) -> Result<u64, BarrierBroken> {
        let mut state = self.state.lock();
        if state.broken {
            return Err(BarrierBroken);
        }

        let phase = state.phase;
        state.arrived += 1;

        if state.arrived == self.parties {
            let control = self.consult(phase, state.arrived);
            state.phase += 1;
            state.enlisted = 0;
            state.arrived = 0;
            if control == PhaseControl::Terminate {
                debug!(phase, "before-phase hook terminated the run");
                state.broken = true;
            }
            drop(state);
            self.released.notify_all();
            return Ok(phase);
        }

        while state.phase == phase && !state.broken {
            self.released.wait(&mut state);
        }

        if state.phase == phase {
            Err(BarrierBroken)
        } else {
            Ok(phase)
        }
    }

    /// Break the barrier, waking every waiting party with [`BarrierBroken`].
    pub(crate) fn break_barrier(&self) {
        self.state.lock().broken = true;
        self.released.notify_all();
    }

    #[must_use]
    pub(crate) fn is_broken(&self) -> bool {
        self.state.lock().broken
    }

    /// Number of pulses released so far.
    pub(crate) fn phase(&self) -> u64 {
        self.state.lock().phase
    }

    fn consult(&self, phase: u64, arrived: usize) -> PhaseControl {
        let Some(hook) = &self.before_phase else {
            return PhaseControl::Continue;
        };

        match catch_unwind(AssertUnwindSafe(|| hook.before_phase(phase, arrived))) {
            Ok(control) => control,
            Err(payload) => {
                error!(
                    phase,
                    "before-phase hook panicked: {}",
                    panic_message(&*payload)
                );
                PhaseControl::Terminate
            }
        }
    }
}

impl core::fmt::Debug for PhaseBarrier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhaseBarrier")
            .field("parties", &self.parties)
            .field("state", &*self.state.lock())
            .field("before_phase", &self.before_phase.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn arrive_all(barrier: &Arc<PhaseBarrier>, parties: usize) -> Vec<Result<u64, BarrierBroken>> {
        let handles: Vec<_> = (0..parties)
            .map(|_| {
                let barrier = Arc::clone(barrier);
                barrier.enlist();
                std::thread::spawn(move || barrier.wait())
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_releases_and_resets() {
        let barrier = Arc::new(PhaseBarrier::new(3, None));

        assert_eq!(arrive_all(&barrier, 3), [Ok(0), Ok(0), Ok(0)]);
        assert!(!barrier.is_forming());
        assert_eq!(arrive_all(&barrier, 3), [Ok(1), Ok(1), Ok(1)]);
        assert_eq!(barrier.phase(), 2);
    }

    #[test]
    fn test_hook_sees_phase_and_parties() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let hook = {
            let seen = Arc::clone(&seen);
            move |phase: u64, arrived: usize| {
                seen.lock().push((phase, arrived));
                PhaseControl::Continue
            }
        };
        let barrier = Arc::new(PhaseBarrier::new(2, Some(Box::new(hook))));

        arrive_all(&barrier, 2);
        arrive_all(&barrier, 2);

        assert_eq!(*seen.lock(), [(0, 2), (1, 2)]);
    }

    #[test]
    fn test_terminate_releases_then_breaks() {
        let barrier = Arc::new(PhaseBarrier::new(
            2,
            Some(Box::new(|_: u64, _: usize| PhaseControl::Terminate)),
        ));

        assert_eq!(arrive_all(&barrier, 2), [Ok(0), Ok(0)]);
        assert!(barrier.is_broken());
        assert_eq!(barrier.wait(), Err(BarrierBroken));
    }

    #[test]
    fn test_panicking_hook_terminates() {
        let hook = |_: u64, _: usize| -> PhaseControl { panic!("hook") };
        let barrier = Arc::new(PhaseBarrier::new(2, Some(Box::new(hook))));

        assert_eq!(arrive_all(&barrier, 2), [Ok(0), Ok(0)]);
        assert!(barrier.is_broken());
    }

    #[test]
    fn test_break_wakes_waiters() {
        let barrier = Arc::new(PhaseBarrier::new(3, None));
        let waiting = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let waiting = Arc::clone(&waiting);
                barrier.enlist();
                std::thread::spawn(move || {
                    waiting.fetch_add(1, Ordering::SeqCst);
                    barrier.wait()
                })
            })
            .collect();

        while waiting.load(Ordering::SeqCst) < 2 {
            std::thread::sleep(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(20));
        barrier.break_barrier();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Err(BarrierBroken));
        }
    }
}
