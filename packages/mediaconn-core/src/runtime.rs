//! Task spawning abstraction.
//!
//! Sessions run their inbound-event pump in the background. [`TaskSpawner`]
//! keeps the library independent of where that task runs, so an embedding
//! host can route it onto its own runtime while the CLI uses Tokio directly.

use std::future::Future;

/// Abstraction for spawning background tasks.
///
/// Spawned tasks are detached: the spawner offers no join or cancel handle.
/// Callers that need to stop a task pass it a `CancellationToken`.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a detached background task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-backed spawner.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a spawner for the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a spawner for the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
