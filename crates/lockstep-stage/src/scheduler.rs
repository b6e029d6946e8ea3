//! The deterministic stage scheduler.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use lockstep_sync::{NamedThreadFactory, ThreadBody, ThreadFactory, panic_message};
use tracing::{debug, warn};

use crate::ring::{Ring, RunnerState};
use crate::{Interrupted, Interrupter, MIN_STAGES, StageError, StageFailure, StageResult, Yielder};

/// Sequential logic for one actor in a scenario.
pub type Stage = Arc<dyn Fn(&Yielder) -> eyre::Result<()> + Send + Sync + 'static>;

/// How a runner's stage ended.
enum StageOutcome {
    Completed,
    Failed(StageFailure),
    Interrupted,
}

/// Runs stages on dedicated threads, one at a time, in an order fixed by
/// enqueue position and `yield_now` call sites.
///
/// # Example
///
/// ```ignore
/// let mut scheduler = StageScheduler::new();
/// scheduler
///     .enqueue(|y: &Yielder| { read_balance(); y.yield_now()?; write_balance(); Ok(()) })
///     .enqueue(|_: &Yielder| { deposit(); Ok(()) })
///     .run()?;
/// ```
pub struct StageScheduler {
    factory: Arc<dyn ThreadFactory>,
    stages: Vec<Stage>,
    completed: bool,
    interrupter: Interrupter,
    last_states: Vec<RunnerState>,
}

impl Default for StageScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl StageScheduler {
    /// Scheduler spawning threads named `stage-runner-{n}`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_thread_factory(Arc::new(NamedThreadFactory::new("stage-runner")))
    }

    /// Scheduler spawning its runner threads through `factory`.
    #[must_use]
    pub fn with_thread_factory(factory: Arc<dyn ThreadFactory>) -> Self {
        Self {
            factory,
            stages: Vec::new(),
            completed: false,
            interrupter: Interrupter::default(),
            last_states: Vec::new(),
        }
    }

    /// Append a stage.
    pub fn enqueue<S>(&mut self, stage: S) -> &mut Self
    where
        S: Fn(&Yielder) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.enqueue_shared(Arc::new(stage))
    }

    /// Append an already shared stage. The same stage may be enqueued any
    /// number of times; every occurrence gets its own runner.
    pub fn enqueue_shared(&mut self, stage: Stage) -> &mut Self {
        self.stages.push(stage);
        self
    }

    /// Number of enqueued stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Handle for interrupting runs of this scheduler.
    #[must_use]
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Runner states as the last run left them.
    #[must_use]
    pub fn runner_states(&self) -> &[RunnerState] {
        &self.last_states
    }

    /// Forget all stages and the last run so the scheduler can be reused.
    pub fn reset(&mut self) -> &mut Self {
        self.stages.clear();
        self.last_states.clear();
        self.completed = false;
        self.interrupter.clear();
        self
    }

    /// Run every enqueued stage to completion.
    ///
    /// Blocks until all runner threads have exited. If a stage fails, stages
    /// still parked are woken with [`Interrupted`] and the first failure in
    /// enqueue order is returned.
    pub fn run(&mut self) -> StageResult<&mut Self> {
        if self.stages.len() < MIN_STAGES {
            return Err(StageError::TooFewStages {
                stages: self.stages.len(),
            });
        }
        if self.completed {
            return Err(StageError::NotReset);
        }
        self.completed = true;

        let ring = Arc::new(Ring::new(self.stages.len()));
        self.interrupter.attach(&ring);
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();

        debug!(stages = self.stages.len(), "starting stage run");

        let stages = self.stages.clone();
        let mut runners = Vec::with_capacity(stages.len());
        for (index, stage) in stages.into_iter().enumerate() {
            let body = runner_body(Arc::clone(&ring), index, stage, outcome_tx.clone());
            match self.factory.spawn(body) {
                Ok(handle) => runners.push(handle),
                Err(err) => {
                    warn!(index, "runner spawn failed, aborting run: {}", err);
                    ring.abort();
                    self.finish_run(&ring, runners);
                    return Err(StageError::Spawn(err));
                }
            }
        }
        drop(outcome_tx);

        ring.wait_all_parked();
        if !ring.is_aborted() {
            ring.start();
        }

        self.finish_run(&ring, runners);

        let mut outcomes: Vec<_> = outcome_rx.try_iter().collect();
        outcomes.sort_by_key(|(index, _)| *index);

        // A request landing after every stage completed does not count.
        let interrupted = outcomes
            .iter()
            .any(|(_, outcome)| matches!(outcome, StageOutcome::Interrupted));
        if interrupted && self.interrupter.is_interrupted() {
            debug!("stage run interrupted");
            return Err(StageError::Interrupted);
        }

        let first_failure = outcomes.into_iter().find_map(|(index, outcome)| match outcome {
            StageOutcome::Failed(failure) => Some((index, failure)),
            StageOutcome::Completed | StageOutcome::Interrupted => None,
        });
        if let Some((index, failure)) = first_failure {
            debug!(index, "stage run failed");
            return Err(StageError::Stage { index, failure });
        }

        debug!("stage run completed");
        Ok(self)
    }

    fn finish_run(&mut self, ring: &Ring, runners: Vec<JoinHandle<()>>) {
        for runner in runners {
            if let Err(payload) = runner.join() {
                warn!("stage runner thread panicked: {}", panic_message(&*payload));
            }
        }
        self.interrupter.detach();
        self.last_states = ring.states();
    }
}

impl core::fmt::Debug for StageScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StageScheduler")
            .field("stages", &self.stages.len())
            .field("completed", &self.completed)
            .field("interrupter", &self.interrupter)
            .field("last_states", &self.last_states)
            .finish_non_exhaustive()
    }
}

fn runner_body(
    ring: Arc<Ring>,
    index: usize,
    stage: Stage,
    outcomes: Sender<(usize, StageOutcome)>,
) -> ThreadBody {
    Box::new(move || {
        if ring.park_initial(index).is_err() {
            ring.retire(index);
            let _ = outcomes.send((index, StageOutcome::Interrupted));
            return;
        }

        let yielder = Yielder::new(Arc::clone(&ring), index);
        let outcome = match catch_unwind(AssertUnwindSafe(|| stage(&yielder))) {
            Ok(Ok(())) => StageOutcome::Completed,
            // Only an abort interrupts; an `Interrupted` from anywhere else is
            // an ordinary failure and must still free the ring.
            Ok(Err(report))
                if ring.is_aborted() && report.downcast_ref::<Interrupted>().is_some() =>
            {
                StageOutcome::Interrupted
            }
            Ok(Err(report)) => StageOutcome::Failed(StageFailure::Error(report)),
            Err(payload) => StageOutcome::Failed(StageFailure::Panic(panic_message(&*payload))),
        };

        match &outcome {
            StageOutcome::Completed => ring.finish(index),
            StageOutcome::Failed(failure) => {
                debug!(index, "stage failed: {}", failure);
                // Nobody may progress past their last yield once a stage fails.
                ring.abort();
                ring.retire(index);
            }
            StageOutcome::Interrupted => ring.retire(index),
        }

        let _ = outcomes.send((index, outcome));
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_checked_before_state() {
        let mut scheduler = StageScheduler::new();
        assert!(matches!(
            scheduler.run(),
            Err(StageError::TooFewStages { stages: 0 })
        ));

        scheduler.enqueue(|_: &Yielder| Ok(()));
        assert!(matches!(
            scheduler.run(),
            Err(StageError::TooFewStages { stages: 1 })
        ));
        assert!(scheduler.runner_states().is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut scheduler = StageScheduler::new();
        scheduler
            .enqueue(|_: &Yielder| Ok(()))
            .enqueue(|_: &Yielder| Ok(()));
        scheduler.run().unwrap();
        assert_eq!(scheduler.runner_states(), [RunnerState::Terminated; 2]);

        scheduler.reset();
        assert!(scheduler.is_empty());
        assert!(scheduler.runner_states().is_empty());
    }
}
