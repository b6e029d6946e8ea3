//! Scheduler error types.

use thiserror::Error;

use crate::MIN_STAGES;

/// A stage was woken by an interrupt or an aborted run instead of the baton.
///
/// Returned from [`Yielder::yield_now`](crate::Yielder::yield_now); propagate
/// it with `?` so the stage unwinds promptly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stage interrupted while waiting for the baton")]
pub struct Interrupted;

/// What went wrong inside a stage body.
#[derive(Debug, Error)]
pub enum StageFailure {
    /// The stage returned an error.
    #[error("{0}")]
    Error(eyre::Report),

    /// The stage panicked.
    #[error("panicked: {0}")]
    Panic(String),
}

impl StageFailure {
    /// The error the stage returned, if it returned one.
    #[must_use]
    pub fn report(&self) -> Option<&eyre::Report> {
        match self {
            Self::Error(report) => Some(report),
            Self::Panic(_) => None,
        }
    }
}

/// Stage scheduler error type.
#[derive(Debug, Error)]
pub enum StageError {
    /// A schedule needs at least two stages to interleave.
    #[error("at least {min} stages are required, {stages} enqueued", min = MIN_STAGES)]
    TooFewStages { stages: usize },

    /// `run` was called again without `reset`.
    #[error("scheduler already ran; call reset() before running again")]
    NotReset,

    /// The run was interrupted through an [`Interrupter`](crate::Interrupter).
    #[error("stage run interrupted")]
    Interrupted,

    /// The first stage (in enqueue order) that failed.
    #[error("stage {index} failed: {failure}")]
    Stage {
        index: usize,
        #[source]
        failure: StageFailure,
    },

    /// The thread factory failed to start a runner.
    #[error("failed to spawn stage runner: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result type for scheduler operations.
pub type StageResult<T> = Result<T, StageError>;
