//! Task spawning abstraction for the coordinator's background work.
//!
//! A session runs two long-lived tasks: the subscription loop and the
//! heartbeat. Both go through [`TaskSpawner`] and are tied to a
//! [`CancellationToken`] that fires before the final leave write.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Abstraction for spawning background tasks.
///
/// # Example
///
/// ```ignore
/// let spawner = TokioSpawner::current();
/// let cancel = CancellationToken::new();
/// spawner.spawn_until_cancelled(cancel.clone(), async {
///     // heartbeat loop
/// });
/// cancel.cancel();
/// ```
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a detached background task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Spawns a future that is dropped as soon as `cancel` fires.
    ///
    /// The future itself does not need to observe the token; it is raced
    /// against it.
    fn spawn_until_cancelled<F>(&self, cancel: CancellationToken, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = future => {}
            }
        });
    }
}

/// Tokio-based spawner.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
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
