//! Shared building blocks for the lockstep harnesses.
//!
//! Both harness crates spawn real OS threads and coordinate them with a small
//! set of blocking primitives:
//!
//! - [`ThreadFactory`]: pluggable thread creation (named threads, custom
//!   stack sizes, or anything the caller's environment manages)
//! - [`Baton`]: a single-permit semaphore that can be cancelled, used to hand
//!   control from one thread to exactly one other
//! - [`Latch`]: a countdown latch for "wait until N threads are ready"
//!   handshakes
//!
//! ```text
//!   driver ──spawn──▶ worker 0 ──count_down──┐
//!          ──spawn──▶ worker 1 ──count_down──┤
//!          ──spawn──▶ worker 2 ──count_down──┴──▶ Latch::wait() returns
//! ```

mod baton;
mod factory;
mod latch;
mod panic;

pub use baton::{Baton, Cancelled};
pub use factory::{NamedThreadFactory, ThreadBody, ThreadFactory};
pub use latch::Latch;
pub use panic::panic_message;

/// Number of hardware threads the process may use, `1` if unknown.
#[must_use]
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Baton, Cancelled, Latch, NamedThreadFactory, ThreadFactory};
}
