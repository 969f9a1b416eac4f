//! Fire-and-forget background work with a shutdown drain.
//!
//! [`TaskDrain::submit`] starts a future on its own tokio task and returns
//! at once. A panic inside the future is caught at the task boundary,
//! logged and counted; it never reaches the submitter or any other task.
//! [`TaskDrain::wait`] resolves once every submitted task has finished,
//! normally or by panicking. It has no deadline of its own; shutdown code
//! uses [`TaskDrain::wait_timeout`].
//!
//! Tasks are not cancelled when the submitting request ends, are not
//! retried and are not persisted.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::Instrument;

/// The drain deadline passed with tasks still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{outstanding} background task(s) still running after {deadline:?}")]
pub struct DrainTimeout {
    /// Tasks still outstanding when the deadline expired.
    pub outstanding: usize,
    /// The deadline that expired.
    pub deadline: Duration,
}

#[derive(Debug, Default)]
struct DrainState {
    outstanding: AtomicUsize,
    faults: AtomicUsize,
    idle: Notify,
}

/// Deregisters a task when dropped, whether it completed, panicked or was
/// dropped by a shutting-down runtime.
struct OutstandingGuard {
    state: Arc<DrainState>,
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        if self.state.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.idle.notify_waiters();
        }
    }
}

/// Tracker for outstanding background tasks.
///
/// Cheap to clone; clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct TaskDrain {
    state: Arc<DrainState>,
}

impl TaskDrain {
    /// Creates an empty drain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` on its own tokio task without waiting for it.
    ///
    /// `name` identifies the task in logs.
    pub fn submit<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.state.outstanding.fetch_add(1, Ordering::AcqRel);
        let guard = OutstandingGuard {
            state: Arc::clone(&self.state),
        };

        tokio::spawn(
            async move {
                if let Err(payload) = AssertUnwindSafe(task).catch_unwind().await {
                    guard.state.faults.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        task = name,
                        panic = %panic_message(payload.as_ref()),
                        "Background task panicked"
                    );
                }
            }
            .in_current_span(),
        );
    }

    /// Number of tasks submitted but not yet finished.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.load(Ordering::Acquire)
    }

    /// Number of tasks that ended in a panic.
    #[must_use]
    pub fn faults(&self) -> usize {
        self.state.faults.load(Ordering::Relaxed)
    }

    /// Waits until no task is outstanding.
    pub async fn wait(&self) {
        loop {
            let notified = self.state.idle.notified();
            tokio::pin!(notified);
            // Register before reading the counter so a wake-up between the
            // check and the await is not lost.
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Waits until no task is outstanding or `deadline` passes.
    ///
    /// # Errors
    ///
    /// Returns [`DrainTimeout`] with the number of tasks still running.
    pub async fn wait_timeout(&self, deadline: Duration) -> Result<(), DrainTimeout> {
        tokio::time::timeout(deadline, self.wait())
            .await
            .map_err(|_| DrainTimeout {
                outstanding: self.outstanding(),
                deadline,
            })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return message;
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.as_str();
    }
    "non-string panic payload"
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio::sync::oneshot;

    #[rstest]
    #[tokio::test]
    async fn test_wait_on_empty_drain_returns_immediately() {
        let drain = TaskDrain::new();
        drain.wait().await;
        assert_eq!(drain.outstanding(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_submit_does_not_block_submitter() {
        let drain = TaskDrain::new();
        let (release, released) = oneshot::channel::<()>();

        drain.submit("blocked", async move {
            let _ = released.await;
        });
        assert_eq!(drain.outstanding(), 1);

        release.send(()).unwrap();
        drain.wait().await;
        assert_eq!(drain.outstanding(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_wait_timeout_reports_outstanding() {
        let drain = TaskDrain::new();
        let (_release, released) = oneshot::channel::<()>();
        drain.submit("stuck", async move {
            let _ = released.await;
        });

        let result = drain.wait_timeout(Duration::from_millis(20)).await;

        assert_eq!(
            result,
            Err(DrainTimeout {
                outstanding: 1,
                deadline: Duration::from_millis(20),
            })
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_panic_is_counted_and_deregistered() {
        let drain = TaskDrain::new();
        drain.submit("explodes", async { panic!("boom") });

        drain.wait_timeout(Duration::from_secs(1)).await.unwrap();

        assert_eq!(drain.outstanding(), 0);
        assert_eq!(drain.faults(), 1);
    }

    #[rstest]
    #[case::static_str(Box::new("static message") as Box<dyn Any + Send>, "static message")]
    #[case::string(Box::new(String::from("owned message")) as Box<dyn Any + Send>, "owned message")]
    #[case::other(Box::new(7_u8) as Box<dyn Any + Send>, "non-string panic payload")]
    fn test_panic_message(#[case] payload: Box<dyn Any + Send>, #[case] expected: &str) {
        assert_eq!(panic_message(payload.as_ref()), expected);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_clones_share_counters() {
        let drain = TaskDrain::new();
        let clone = drain.clone();

        for _ in 0..32 {
            clone.submit("noop", async {
                tokio::task::yield_now().await;
            });
        }
        drain.wait().await;

        assert_eq!(clone.outstanding(), 0);
        assert_eq!(drain.faults(), 0);
    }
}
