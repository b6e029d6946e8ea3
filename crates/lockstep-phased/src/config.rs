//! Executor configuration.

use std::sync::Arc;

use lockstep_sync::{NamedThreadFactory, ThreadFactory};

use crate::{ConfigError, MIN_THREADS};

/// Default worker count when nothing else is configured.
pub const DEFAULT_THREADS: usize = MIN_THREADS;

/// Environment variable read by [`ExecutorConfig::from_env`].
pub const THREADS_ENV: &str = "LOCKSTEP_THREADS";

/// Configuration for a [`PhasedExecutor`](crate::PhasedExecutor).
#[derive(Clone)]
pub struct ExecutorConfig {
    /// Workers per batch, which is also the pulse size.
    pub threads: usize,
    /// Creates the worker threads.
    pub thread_factory: Arc<dyn ThreadFactory>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            thread_factory: Arc::new(NamedThreadFactory::new("phased-worker")),
        }
    }
}

impl ExecutorConfig {
    /// Defaults, with the thread count taken from `LOCKSTEP_THREADS` if it parses.
    #[must_use]
    pub fn from_env() -> Self {
        let threads = std::env::var(THREADS_ENV)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_THREADS);

        Self {
            threads,
            ..Self::default()
        }
    }

    /// Set the worker count.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the thread factory.
    #[must_use]
    pub fn with_thread_factory(mut self, factory: Arc<dyn ThreadFactory>) -> Self {
        self.thread_factory = factory;
        self
    }

    /// Check the configuration against the host's hardware parallelism.
    pub(crate) fn validate(&self, available: usize) -> Result<(), ConfigError> {
        if self.threads < MIN_THREADS {
            return Err(ConfigError::TooFewThreads {
                threads: self.threads,
            });
        }
        if available < MIN_THREADS {
            return Err(ConfigError::InsufficientParallelism { available });
        }
        Ok(())
    }
}

impl core::fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}
