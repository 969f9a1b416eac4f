//! Periodic eviction of idle client buckets.
//!
//! The sweeper runs on its own tokio task and is owned through a
//! [`SweeperHandle`]; dropping the gate or calling
//! [`SweeperHandle::shutdown`] ends the loop.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::AdmissionGate;

/// Owner of a running sweep loop.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Spawns the sweep loop for `gate`.
    ///
    /// The loop holds only a weak reference, so it exits on its own once
    /// the gate has been dropped.
    pub(super) fn spawn(gate: Weak<AdmissionGate>, period: Duration) -> Self {
        let (shutdown, mut stop) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = ticker.tick() => {
                        let Some(gate) = gate.upgrade() else { break };
                        let evicted = gate.sweep();
                        if evicted > 0 {
                            tracing::debug!(
                                evicted,
                                remaining = gate.tracked_clients(),
                                "Evicted idle admission buckets"
                            );
                        }
                    }
                }
            }

            tracing::debug!("Admission sweeper stopped");
        });

        Self {
            shutdown: Some(shutdown),
            task,
        }
    }

    /// Signals the loop to stop and waits for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The receiver is gone only if the loop already exited.
            let _ = shutdown.send(());
        }
        if let Err(error) = self.task.await {
            tracing::warn!(%error, "Admission sweeper terminated abnormally");
        }
    }

    /// Returns true once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
