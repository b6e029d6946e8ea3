//! Executor error types.

use thiserror::Error;

use crate::MIN_THREADS;

/// Rejected executor configuration. Raised before any thread exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A pulse needs at least two parties to mean anything.
    #[error("phased executor needs at least {min} threads, got {threads}", min = MIN_THREADS)]
    TooFewThreads { threads: usize },

    /// The host cannot run two threads at once, so pulses cannot overlap.
    #[error(
        "phased executor needs at least {min} hardware threads, host reports {available}",
        min = MIN_THREADS
    )]
    InsufficientParallelism { available: usize },
}

/// Phased executor error type.
#[derive(Debug, Error)]
pub enum PhasedError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Another batch is still executing on this instance.
    #[error("a batch is already executing on this executor")]
    AlreadyRunning,

    /// Too few tasks to ever fill one pulse.
    #[error("batch of {tasks} tasks cannot fill a pulse of {threads} threads")]
    BatchTooSmall { tasks: usize, threads: usize },

    /// The thread factory failed to start a worker.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result type for executor operations.
pub type PhasedResult<T> = Result<T, PhasedError>;
