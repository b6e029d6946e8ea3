//! Pluggable thread creation.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

/// Work handed to a [`ThreadFactory`].
pub type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

/// Creates the OS threads a harness runs its workers on.
///
/// Implement this to hand out daemon-like threads, threads registered with
/// some outer runtime, or threads with a particular stack size. Closures of
/// the shape `Fn(ThreadBody) -> io::Result<JoinHandle<()>>` implement it
/// directly.
pub trait ThreadFactory: Send + Sync {
    /// Start a new thread running `body`.
    fn spawn(&self, body: ThreadBody) -> io::Result<JoinHandle<()>>;
}

impl<F> ThreadFactory for F
where
    F: Fn(ThreadBody) -> io::Result<JoinHandle<()>> + Send + Sync,
{
    fn spawn(&self, body: ThreadBody) -> io::Result<JoinHandle<()>> {
        self(body)
    }
}

/// Spawns threads named `{prefix}-{n}` with `n` counting up from zero.
pub struct NamedThreadFactory {
    prefix: String,
    stack_size: Option<usize>,
    spawned: AtomicUsize,
}

impl NamedThreadFactory {
    /// Create a factory whose threads are named after `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            stack_size: None,
            spawned: AtomicUsize::new(0),
        }
    }

    /// Use a fixed stack size (in bytes) for every spawned thread.
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Thread name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of threads this factory has started so far.
    #[must_use]
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl ThreadFactory for NamedThreadFactory {
    fn spawn(&self, body: ThreadBody) -> io::Result<JoinHandle<()>> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let mut builder = std::thread::Builder::new().name(format!("{}-{n}", self.prefix));
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        builder.spawn(body)
    }
}

impl core::fmt::Debug for NamedThreadFactory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NamedThreadFactory")
            .field("prefix", &self.prefix)
            .field("stack_size", &self.stack_size)
            .field("spawned", &self.spawned())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_threads() {
        let factory = NamedThreadFactory::new("unit");

        let handles: Vec<_> = (0..3)
            .map(|_| {
                factory
                    .spawn(Box::new(|| {
                        let name = std::thread::current().name().map(str::to_owned);
                        assert!(name.unwrap().starts_with("unit-"));
                    }))
                    .unwrap()
            })
            .collect();

        let names: Vec<_> = handles
            .iter()
            .map(|h| h.thread().name().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["unit-0", "unit-1", "unit-2"]);

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(factory.spawned(), 3);
    }

    #[test]
    fn test_closure_factory() {
        let factory = |body: ThreadBody| std::thread::Builder::new().name("closure".into()).spawn(body);

        let handle = ThreadFactory::spawn(&factory, Box::new(|| {})).unwrap();
        assert_eq!(handle.thread().name(), Some("closure"));
        handle.join().unwrap();
    }
}
