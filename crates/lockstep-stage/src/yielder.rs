//! Handles given to stage bodies and to callers that want to stop a run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::Interrupted;
use crate::ring::Ring;

/// A stage's capability to hand control to the next live stage.
pub struct Yielder {
    ring: Arc<Ring>,
    index: usize,
}

impl Yielder {
    pub(crate) fn new(ring: Arc<Ring>, index: usize) -> Self {
        Self { ring, index }
    }

    /// Enqueue position of the stage holding this yielder.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of stages in the run.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.ring.len()
    }

    /// Let the next live stage (in enqueue order, wrapping) run until it
    /// yields or finishes, then continue.
    ///
    /// Returns immediately when every other stage has finished. Fails with
    /// [`Interrupted`] if the run is interrupted or aborted, in which case the
    /// stage should return without doing more work.
    pub fn yield_now(&self) -> Result<(), Interrupted> {
        self.ring.yield_from(self.index)
    }
}

impl core::fmt::Debug for Yielder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Yielder")
            .field("index", &self.index)
            .field("stage_count", &self.ring.len())
            .finish()
    }
}

#[derive(Default)]
struct InterruptState {
    requested: AtomicBool,
    ring: Mutex<Option<Arc<Ring>>>,
}

/// Stops a [`StageScheduler`](crate::StageScheduler) run from another thread
/// or from inside a stage.
///
/// Parked stages wake with [`Interrupted`]; a stage that is running keeps
/// going until its next `yield_now` or until it returns. The run then
/// reports [`StageError::Interrupted`](crate::StageError::Interrupted).
#[derive(Clone, Default)]
pub struct Interrupter {
    inner: Arc<InterruptState>,
}

impl Interrupter {
    /// Request interruption of the current (or next) run.
    pub fn interrupt(&self) {
        self.inner.requested.store(true, Ordering::Release);
        if let Some(ring) = self.inner.ring.lock().as_ref() {
            debug!("interrupting stage run");
            ring.abort();
        }
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Bind to a starting run. A pending request aborts it straight away.
    pub(crate) fn attach(&self, ring: &Arc<Ring>) {
        let mut slot = self.inner.ring.lock();
        *slot = Some(Arc::clone(ring));
        if self.is_interrupted() {
            ring.abort();
        }
    }

    pub(crate) fn detach(&self) {
        self.inner.ring.lock().take();
    }

    pub(crate) fn clear(&self) {
        self.inner.requested.store(false, Ordering::Release);
    }
}

impl core::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Interrupter")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}
