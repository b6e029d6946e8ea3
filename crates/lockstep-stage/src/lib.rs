#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::missing_fields_in_debug)]

//! Deterministic stage scheduling.
//!
//! [`StageScheduler`] runs N independently written stages, each on its own
//! OS thread, but lets exactly one of them execute at a time. A stage gives
//! up control only by calling [`Yielder::yield_now`] or by returning, and
//! control always moves to the next live stage in enqueue order (wrapping,
//! skipping stages that have finished). The interleaving is therefore a
//! function of enqueue order and yield call sites alone, never of OS
//! scheduling or timing.
//!
//! # Example Interleaving
//!
//! ```text
//!   S0: a ─────────────────────────── done
//!   S1:      b ── yield          c ── yield (no-op) ── d ── done
//!   S2:                 e ── done
//!
//!   log: a b e c d
//! ```
//!
//! # Failure and Interruption
//!
//! A stage that fails aborts the run: stages still parked wake with
//! [`Interrupted`] and never get past their last reached yield point. After
//! every runner thread has joined, `run` reports the first failure in enqueue
//! order. An [`Interrupter`] stops a run the same way from outside.

mod error;
mod ring;
mod scheduler;
mod yielder;

/// Fewest stages a run accepts.
pub const MIN_STAGES: usize = 2;

pub use error::{Interrupted, StageError, StageFailure, StageResult};
pub use ring::RunnerState;
pub use scheduler::{Stage, StageScheduler};
pub use yielder::{Interrupter, Yielder};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Interrupted, Interrupter, StageError, StageScheduler, Yielder};
}
