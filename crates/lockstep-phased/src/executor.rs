//! The phased batch executor.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use lockstep_sync::{ThreadFactory, available_parallelism, panic_message};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::barrier::{BeforePhase, PhaseBarrier};
use crate::{ExecutorConfig, PhasedError, PhasedResult, TaskError, TaskHandle};

/// A unit of work accepted by [`PhasedExecutor::invoke_all`].
pub type Task<T> = Box<dyn FnOnce() -> eyre::Result<T> + Send + 'static>;

/// Whether a batch is in flight.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle = 0,
    Running = 1,
}

impl ExecutorState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            _ => Self::Running,
        }
    }
}

/// Runs batches of independent tasks so that groups of `threads` tasks start
/// at (nearly) the same instant.
///
/// # Example
///
/// ```ignore
/// let executor = PhasedExecutor::new(4)?;
/// let handles = executor.invoke_all((0..16).map(|i| move || Ok(i * 2)))?;
/// assert_eq!(handles[3].result().ok(), Some(&6));
/// ```
pub struct PhasedExecutor {
    threads: usize,
    factory: Arc<dyn ThreadFactory>,
    state: AtomicU8,
}

impl PhasedExecutor {
    /// Executor with `threads` workers and the default thread factory.
    pub fn new(threads: usize) -> PhasedResult<Self> {
        Self::with_config(ExecutorConfig::default().with_threads(threads))
    }

    /// Executor built from an explicit configuration.
    pub fn with_config(config: ExecutorConfig) -> PhasedResult<Self> {
        config.validate(available_parallelism())?;

        Ok(Self {
            threads: config.threads,
            factory: config.thread_factory,
            state: AtomicU8::new(ExecutorState::Idle as u8),
        })
    }

    /// Worker count, which is also the pulse size.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    #[must_use]
    pub fn state(&self) -> ExecutorState {
        ExecutorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Run `tasks`, returning one handle per task in submission order.
    pub fn invoke_all<T, F, I>(&self, tasks: I) -> PhasedResult<Vec<TaskHandle<T>>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> eyre::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_batch(collect_tasks(tasks), None)
    }

    /// Like [`invoke_all`](Self::invoke_all), consulting `before_phase` before
    /// each pulse is released.
    pub fn invoke_all_with<T, F, I, B>(
        &self,
        tasks: I,
        before_phase: B,
    ) -> PhasedResult<Vec<TaskHandle<T>>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> eyre::Result<T> + Send + 'static,
        T: Send + 'static,
        B: BeforePhase + 'static,
    {
        self.run_batch(collect_tasks(tasks), Some(Box::new(before_phase)))
    }

    fn run_batch<T: Send + 'static>(
        &self,
        tasks: Vec<Task<T>>,
        before_phase: Option<Box<dyn BeforePhase>>,
    ) -> PhasedResult<Vec<TaskHandle<T>>> {
        let _running = RunningGuard::enter(&self.state)?;

        let total = tasks.len();
        if total < self.threads {
            return Err(PhasedError::BatchTooSmall {
                tasks: total,
                threads: self.threads,
            });
        }

        debug!(tasks = total, threads = self.threads, "starting batch");

        let batch = Arc::new(Batch {
            queue: Mutex::new(tasks.into_iter().enumerate().collect()),
            barrier: PhaseBarrier::new(self.threads, before_phase),
            threads: self.threads,
        });
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();

        let mut workers = Vec::with_capacity(self.threads);
        for _ in 0..self.threads {
            let worker_batch = Arc::clone(&batch);
            let outcome_tx = outcome_tx.clone();
            match self.factory.spawn(Box::new(move || work(&worker_batch, &outcome_tx))) {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    warn!("worker spawn failed, tearing down batch: {}", err);
                    batch.barrier.break_barrier();
                    join_workers(workers);
                    return Err(PhasedError::Spawn(err));
                }
            }
        }
        drop(outcome_tx);

        join_workers(workers);

        let handles = assemble(total, &batch, &outcome_rx);
        debug!(tasks = total, pulses = batch.barrier.phase(), "batch finished");
        Ok(handles)
    }
}

impl core::fmt::Debug for PhasedExecutor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhasedExecutor")
            .field("threads", &self.threads)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Flips the executor to `Running` and back to `Idle` on every exit path.
struct RunningGuard<'a>(&'a AtomicU8);

impl<'a> RunningGuard<'a> {
    fn enter(state: &'a AtomicU8) -> PhasedResult<Self> {
        state
            .compare_exchange(
                ExecutorState::Idle as u8,
                ExecutorState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| PhasedError::AlreadyRunning)?;
        Ok(Self(state))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(ExecutorState::Idle as u8, Ordering::Release);
    }
}

struct Batch<T> {
    queue: Mutex<VecDeque<(usize, Task<T>)>>,
    barrier: PhaseBarrier,
    threads: usize,
}

struct Outcome<T> {
    index: usize,
    pulse: Option<u64>,
    result: Result<T, TaskError>,
}

fn collect_tasks<T, F, I>(tasks: I) -> Vec<Task<T>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> eyre::Result<T> + Send + 'static,
    T: 'static,
{
    tasks
        .into_iter()
        .map(|task| Box::new(task) as Task<T>)
        .collect()
}

fn work<T>(batch: &Batch<T>, outcomes: &Sender<Outcome<T>>) {
    let barrier = &batch.barrier;

    loop {
        if barrier.is_broken() {
            break;
        }

        // Pop, decide and enlist under one lock: a forming pulse is then
        // always completable from tasks still in the queue.
        let (index, task, join) = {
            let mut queue = batch.queue.lock();
            let Some((index, task)) = queue.pop_front() else {
                break;
            };
            let remaining = queue.len() + 1;
            let join =
                !barrier.is_broken() && (barrier.is_forming() || remaining >= batch.threads);
            if join {
                barrier.enlist();
            }
            (index, task, join)
        };

        let pulse = if join {
            match barrier.wait() {
                Ok(phase) => {
                    trace!(index, phase, "released in pulse");
                    Some(phase)
                }
                Err(_) => {
                    trace!(index, "barrier broken, running unphased");
                    None
                }
            }
        } else {
            trace!(index, "too few tasks left for a pulse, running unphased");
            None
        };

        let result = run_task(task);
        if outcomes
            .send(Outcome {
                index,
                pulse,
                result,
            })
            .is_err()
        {
            break;
        }
    }
}

fn run_task<T>(task: Task<T>) -> Result<T, TaskError> {
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(report)) => Err(TaskError::Failed(report)),
        Err(payload) => Err(TaskError::Panicked(panic_message(&*payload))),
    }
}

fn join_workers(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        if let Err(payload) = worker.join() {
            warn!("worker thread panicked: {}", panic_message(&*payload));
        }
    }
}

/// Put outcomes back into submission order, cancelling whatever never ran.
fn assemble<T>(total: usize, batch: &Batch<T>, outcomes: &Receiver<Outcome<T>>) -> Vec<TaskHandle<T>> {
    let mut slots: Vec<Option<TaskHandle<T>>> = (0..total).map(|_| None).collect();

    for outcome in outcomes.try_iter() {
        slots[outcome.index] = Some(TaskHandle::new(outcome.index, outcome.pulse, outcome.result));
    }

    let leftover: Vec<_> = batch.queue.lock().drain(..).map(|(index, _)| index).collect();
    if !leftover.is_empty() {
        debug!(cancelled = leftover.len(), "run terminated with tasks still queued");
    }
    for index in leftover {
        slots[index] = Some(TaskHandle::new(index, None, Err(TaskError::Cancelled)));
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                TaskHandle::new(
                    index,
                    None,
                    Err(TaskError::Panicked("worker exited before reporting".to_owned())),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        assert_eq!(ExecutorState::from_u8(ExecutorState::Idle as u8), ExecutorState::Idle);
        assert_eq!(
            ExecutorState::from_u8(ExecutorState::Running as u8),
            ExecutorState::Running
        );
    }

    #[test]
    fn test_guard_rejects_second_entry() {
        let state = AtomicU8::new(ExecutorState::Idle as u8);

        let guard = RunningGuard::enter(&state).unwrap();
        assert!(matches!(
            RunningGuard::enter(&state),
            Err(PhasedError::AlreadyRunning)
        ));
        drop(guard);

        assert_eq!(state.load(Ordering::Acquire), ExecutorState::Idle as u8);
        assert!(RunningGuard::enter(&state).is_ok());
    }

    #[test]
    fn test_run_task_captures_failures() {
        let ok: Task<u8> = Box::new(|| Ok(1));
        assert_eq!(run_task(ok).unwrap(), 1);

        let failed: Task<u8> = Box::new(|| Err(eyre::eyre!("nope")));
        assert!(matches!(run_task(failed), Err(TaskError::Failed(_))));

        let panicked: Task<u8> = Box::new(|| panic!("kaboom"));
        match run_task(panicked) {
            Err(TaskError::Panicked(message)) => assert_eq!(message, "kaboom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
