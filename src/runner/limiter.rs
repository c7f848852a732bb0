//! Bounded parallelism
//!
//! Tasks acquire a semaphore permit before they are spawned and carry it for
//! their whole lifetime, so the permit is released however the task ends:
//! normal return, error, panic, or being dropped on cancellation. Permits are
//! granted in submission order.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::error;

use crate::error::{Error, Result};

/// Limits how many spawned tasks run at once
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyLimiter {
    /// Limiter admitting `limit` tasks at a time (at least one)
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Configured bound
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a permit, then spawn `task` holding it
    pub async fn spawn<F, T>(&self, task: F) -> Result<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::Cancelled)?;

        Ok(tokio::spawn(async move {
            let _permit = permit;
            task.await
        }))
    }
}

/// Run `tasks` with at most `limit` in flight; results keep submission order
///
/// A task that panicked yields an error in its slot; siblings are unaffected.
pub async fn run_bounded<I, F, T>(tasks: I, limit: usize) -> Vec<Result<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let limiter = ConcurrencyLimiter::new(limit);
    let mut handles = Vec::new();
    for task in tasks {
        handles.push(limiter.spawn(task).await);
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = match handle {
            Ok(handle) => handle.await.map_err(|e| {
                error!(error = %e, "Bounded task did not complete");
                Error::other(format!("task failed: {e}"))
            }),
            Err(e) => Err(e),
        };
        results.push(result);
    }
    results
}
