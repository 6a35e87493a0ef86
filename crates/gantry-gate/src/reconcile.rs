//! Periodic reconciliation task.
//!
//! An explicitly started, cancellable task owned by the process lifecycle,
//! not a fire-and-forget thread. Each tick runs one
//! [`TrustEngine::run_reconciliation`] cycle, going through the same
//! engine lock as the request path, so background and live mutations of
//! the same reader are serialized.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::TrustEngine;

/// Handle to the running reconciliation task.
pub struct Reconciler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Reconciler {
    /// Spawn the task, ticking at the given interval.
    ///
    /// The first cycle runs immediately.
    #[must_use]
    pub fn start(engine: Arc<TrustEngine>, interval: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "reconciler started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let summary = engine.run_reconciliation();
                        if summary.recovered > 0 {
                            info!(recovered = summary.recovered, "decay recovery applied");
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("reconciler stopped");
        });
        Self { shutdown, handle }
    }

    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish()
    }
}
