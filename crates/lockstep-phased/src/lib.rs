#![allow(clippy::redundant_pub_crate)]

//! Phased batch execution.
//!
//! [`PhasedExecutor`] takes a batch of independent tasks and a worker count
//! `N`, and runs the batch so that groups of `N` tasks ("pulses") start at
//! nearly the same instant. Overlapping starts make races in the code under
//! test show up on every run instead of occasionally.
//!
//! # Pulse Formation
//!
//! ```text
//!   queue: t0 t1 t2 t3 t4 t5 t6        N = 3
//!
//!   worker A ─ pop t0 (7 left ≥ N) ─ enlist ─┐
//!   worker B ─ pop t1 (pulse forming) ─ enlist ─┼─▶ barrier ─▶ pulse 0 = {t0,t1,t2}
//!   worker C ─ pop t2 (pulse forming) ─ enlist ─┘
//!   ...                                               pulse 1 = {t3,t4,t5}
//!   worker ? ─ pop t6 (1 left < N, none forming) ───▶ runs unphased
//! ```
//!
//! A worker joins the current pulse when one is already forming, or when
//! enough tasks remain to fill a whole pulse. Anything else runs unphased,
//! so the tail of a batch may start staggered. That is best-effort by
//! construction, not a guarantee about every pulse's size.
//!
//! An optional [`BeforePhase`] hook sees `(phase, arrived)` before each pulse
//! is released and may end the run early: the releasing pulse still runs,
//! nothing after it is picked up, and unpicked tasks come back
//! [`TaskError::Cancelled`].

mod barrier;
mod config;
mod error;
mod executor;
mod handle;

/// Smallest worker count (and hardware parallelism) a pulse makes sense with.
pub const MIN_THREADS: usize = 2;

pub use barrier::{BarrierBroken, BeforePhase, PhaseControl};
pub use config::{DEFAULT_THREADS, ExecutorConfig, THREADS_ENV};
pub use error::{ConfigError, PhasedError, PhasedResult};
pub use executor::{ExecutorState, PhasedExecutor, Task};
pub use handle::{TaskError, TaskHandle};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BeforePhase, ExecutorConfig, PhaseControl, PhasedError, PhasedExecutor, TaskError,
        TaskHandle,
    };
}
