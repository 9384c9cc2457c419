//! Periodic session sweep.

use std::time::Duration;

use chartfeed_cache::SessionRegistry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Runs [`SessionRegistry::sweep`] on a fixed period until stopped.
#[derive(Debug)]
pub struct SweepScheduler {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepScheduler {
    /// Starts sweeping every `period`, beginning immediately.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(registry: SessionRegistry, period: Duration) -> Self {
        let (shutdown, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(period_secs = period.as_secs(), "session sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // A failed cycle is retried on the next tick
                        if let Err(e) = registry.sweep().await {
                            error!(error = %e, "session sweep failed");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            info!("session sweeper stopped");
        });
        Self { shutdown, task }
    }

    /// Signals the sweeper to stop and waits for it.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "session sweeper panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartfeed_cache::MemoryStore;
    use chrono::Utc;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_idle_sessions_each_period() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new(
            store.clone(),
            Duration::from_secs(30 * 60),
            Duration::from_secs(24 * 3600),
        );
        let now = Utc::now().timestamp();
        registry.touch_at("idle", now - 3600).await.unwrap();

        let sweeper = SweepScheduler::spawn(registry.clone(), Duration::from_secs(300));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(registry.last_seen("idle").await.unwrap().is_none());

        registry.touch_at("later", now - 3600).await.unwrap();
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(registry.last_seen("later").await.unwrap().is_none());

        sweeper.stop().await;
    }
}
