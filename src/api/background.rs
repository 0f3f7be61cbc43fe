//! Fire-and-forget work that outlives the request that started it.
//!
//! Tasks are registered with a [`TaskTracker`] so shutdown can wait for them. A
//! panicking task is logged and dropped; it never reaches the request or the
//! runtime.

use futures::FutureExt;
use std::{future::Future, panic::AssertUnwindSafe, time::Duration};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};

use super::interceptor::recover::panic_message;

#[derive(Clone, Debug, Default)]
pub struct Background {
    tracker: TaskTracker,
}

impl Background {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `task` detached from the caller. `name` labels the task in logs.
    pub fn run<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = tracing::info_span!("background", task = name);
        self.tracker.spawn(
            async move {
                debug!("background task started");
                if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                    error!("background task panicked: {}", panic_message(panic.as_ref()));
                }
            }
            .instrument(span),
        );
    }

    /// Tasks started and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Close the tracker and wait up to `timeout` for in-flight tasks.
    ///
    /// Returns `true` when every task finished in time. Tasks still running after
    /// the timeout are abandoned.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "waiting for background tasks");
        }

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            debug!("background tasks drained");
            true
        } else {
            warn!(
                remaining = self.tracker.len(),
                "background tasks still running after {timeout:?}, abandoning"
            );
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_tasks() {
        let background = Background::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = done.clone();
            background.run("count", async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(background.shutdown(Duration::from_secs(5)).await);
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(background.in_flight(), 0);
    }

    #[tokio::test]
    async fn panicking_task_is_contained() {
        let background = Background::new();
        let done = Arc::new(AtomicUsize::new(0));

        background.run("boom", async {
            panic!("task failed");
        });
        let after = done.clone();
        background.run("after", async move {
            after.fetch_add(1, Ordering::SeqCst);
        });

        assert!(background.shutdown(Duration::from_secs(5)).await);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_gives_up_after_timeout() {
        let background = Background::new();
        background.run("stuck", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        assert!(!background.shutdown(Duration::from_secs(1)).await);
        assert_eq!(background.in_flight(), 1);
    }

    #[tokio::test]
    async fn run_does_not_block_the_caller() {
        let background = Background::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        background.run("wait", async move {
            let _ = rx.await;
        });
        assert_eq!(background.in_flight(), 1);
        tx.send(()).unwrap();
        assert!(background.shutdown(Duration::from_secs(5)).await);
    }
}
