//! Graceful shutdown coordination.
//!
//! A [`ShutdownCoordinator`] is shared between the Ctrl+C handler and the
//! poll loop. The loop races its pipeline run and its inter-run sleep against
//! [`ShutdownCoordinator::wait_for_shutdown`], so an interrupt abandons
//! in-flight fetches without ever cutting a snapshot write in half.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// Coordinates graceful shutdown across async tasks.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    is_shutdown: AtomicBool,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            is_shutdown: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request shutdown. Notifies all registered waiters exactly once.
    pub fn request_shutdown(&self) {
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested. Returns immediately if already set.
    pub async fn wait_for_shutdown(&self) {
        // Register interest before checking the flag so a request landing
        // between the check and the await is not missed.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    /// Drive `fut` to completion unless shutdown wins the race.
    ///
    /// Returns `None` when shutdown was requested first; `fut` is dropped.
    pub async fn run_until_shutdown<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_shutdown_requested() {
            return None;
        }
        tokio::select! {
            output = fut => Some(output),
            _ = self.wait_for_shutdown() => None,
        }
    }

    /// Sleep for `duration`; returns `false` if shutdown interrupted the sleep.
    pub async fn sleep(&self, duration: Duration) -> bool {
        self.run_until_shutdown(tokio::time::sleep(duration))
            .await
            .is_some()
    }
}
