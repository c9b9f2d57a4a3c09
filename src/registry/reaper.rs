//! Idle session reaper

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::store::SessionRegistry;

impl SessionRegistry {
    /// Run one idle sweep, returning how many sessions were reaped
    pub async fn reap(&self) -> usize {
        let Some(cutoff) = Instant::now().checked_sub(self.config().idle_timeout) else {
            return 0;
        };

        let mut reaped = 0;
        for session in self.list_idle(cutoff).await {
            if self.reap_if_idle(&session, cutoff).await {
                reaped += 1;
            }
        }

        if reaped > 0 {
            let remaining = self.session_count().await;
            tracing::debug!(reaped, remaining, "Reaper sweep");
        }
        reaped
    }

    /// Spawn the background reaper
    ///
    /// Sweeps every `reap_interval` until `shutdown` is cancelled.
    pub fn spawn_reaper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config().reap_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.reap().await;
                    }
                }
            }
        })
    }
}
