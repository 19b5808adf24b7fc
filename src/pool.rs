//! Bounded worker pool for fan-out fetches
//!
//! Each job runs as its own Tokio task, so jobs execute in parallel on the
//! multi-threaded runtime. At most `concurrency` jobs are in flight at once:
//! the next job is only spawned when a running one finishes. Dropping the
//! returned future aborts every job still in flight.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::{JoinError, JoinHandle};
use tracing::error;

use crate::config::DEFAULT_CONCURRENCY;

/// Join handle that aborts its task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx)
    }
}

/// Concurrency-bounded executor shared by every fan-out phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    concurrency: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl WorkerPool {
    /// Create a pool; zero is raised to one
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Maximum jobs in flight
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `job` for every item and return results in input order.
    ///
    /// A job that panics is logged and left out of the results.
    pub async fn run_ordered<I, F, Fut, T>(&self, items: I, job: F) -> Vec<T>
    where
        I: IntoIterator,
        I::IntoIter: Send,
        F: FnMut(I::Item) -> Fut + Send,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        stream::iter(items)
            .map(job)
            .map(|fut| AbortOnDrop(tokio::spawn(fut)))
            .boxed()
            .buffered(self.concurrency)
            .filter_map(|joined| async move { Self::unwrap_joined(joined) })
            .collect()
            .await
    }

    /// Run `job` for every item; results arrive in completion order.
    pub async fn run_unordered<I, F, Fut, T>(&self, items: I, job: F) -> Vec<T>
    where
        I: IntoIterator,
        I::IntoIter: Send,
        F: FnMut(I::Item) -> Fut + Send,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        stream::iter(items)
            .map(job)
            .map(|fut| AbortOnDrop(tokio::spawn(fut)))
            .boxed()
            .buffer_unordered(self.concurrency)
            .filter_map(|joined| async move { Self::unwrap_joined(joined) })
            .collect()
            .await
    }

    fn unwrap_joined<T>(joined: Result<T, JoinError>) -> Option<T> {
        match joined {
            Ok(value) => Some(value),
            Err(e) => {
                error!(error = %e, "Worker task failed");
                None
            }
        }
    }
}
