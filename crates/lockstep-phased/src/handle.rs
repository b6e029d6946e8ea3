//! Per-task result handles.

use thiserror::Error;

/// Why a task produced no value.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task returned an error.
    #[error("task failed: {0}")]
    Failed(eyre::Report),

    /// The task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The run was terminated before any worker picked the task up.
    #[error("task cancelled before it was picked up")]
    Cancelled,
}

impl TaskError {
    /// The error the task returned, if it returned one.
    #[must_use]
    pub fn report(&self) -> Option<&eyre::Report> {
        match self {
            Self::Failed(report) => Some(report),
            Self::Panicked(_) | Self::Cancelled => None,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Outcome of one submitted task.
///
/// Handles come back from `invoke_all` in submission order. A task's failure
/// stays inside its handle until the caller looks at it.
#[derive(Debug)]
pub struct TaskHandle<T> {
    index: usize,
    pulse: Option<u64>,
    outcome: Result<T, TaskError>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(index: usize, pulse: Option<u64>, outcome: Result<T, TaskError>) -> Self {
        Self {
            index,
            pulse,
            outcome,
        }
    }

    /// Position of the task in the submitted batch.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Phase index of the pulse the task was released in.
    ///
    /// `None` if the task ran unphased (tail or broken barrier) or never ran.
    #[must_use]
    pub fn pulse(&self) -> Option<u64> {
        self.pulse
    }

    /// Borrow the outcome.
    pub fn result(&self) -> Result<&T, &TaskError> {
        self.outcome.as_ref()
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Take the outcome.
    pub fn into_result(self) -> Result<T, TaskError> {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let ok = TaskHandle::new(3, Some(1), Ok::<_, TaskError>(7));
        assert_eq!(ok.index(), 3);
        assert_eq!(ok.pulse(), Some(1));
        assert_eq!(ok.result().ok(), Some(&7));
        assert_eq!(ok.into_result().unwrap(), 7);

        let failed = TaskHandle::<u32>::new(0, None, Err(TaskError::Failed(eyre::eyre!("boom"))));
        assert!(!failed.is_ok());
        let err = failed.result().unwrap_err();
        assert_eq!(err.report().unwrap().to_string(), "boom");
        assert_eq!(err.to_string(), "task failed: boom");
    }

    #[test]
    fn test_cancelled() {
        let handle = TaskHandle::<()>::new(9, None, Err(TaskError::Cancelled));
        assert!(handle.result().unwrap_err().is_cancelled());
        assert!(handle.result().unwrap_err().report().is_none());
    }
}
