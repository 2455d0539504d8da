use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs a reconciliation cycle on a fixed interval until stopped.
///
/// The first cycle runs immediately. A cycle in progress always completes; `stop`
/// waits for it, so no partially applied pass is left behind.
#[derive(Debug)]
pub struct SyncScheduler {
    name: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    pub fn start<F, Fut>(name: &str, interval: Duration, mut cycle: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task_name = name.to_string();

        let handle = tokio::spawn(async move {
            info!(scheduler = %task_name, interval_ms = interval.as_millis() as u64, "sync scheduler started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!(scheduler = %task_name, "sync scheduler stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        debug!(scheduler = %task_name, "running sync cycle");
                        cycle().await;
                    }
                }
            }
        });

        SyncScheduler {
            name: name.to_string(),
            cancel,
            handle,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the timer and wait for the task to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(scheduler = %self.name, error = %e, "sync scheduler task failed");
        }
    }
}
