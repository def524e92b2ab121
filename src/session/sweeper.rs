use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use super::SessionStore;

/// Periodically delete expired session records.
///
/// Runs on its own timer, independent of request handling. A failed sweep is
/// logged and retried on the next tick.
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.sweep_expired(Utc::now()).await {
                Ok(0) => tracing::debug!("Session sweep found nothing to remove"),
                Ok(removed) => tracing::info!(removed, "Expired sessions swept"),
                Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
            }
        }
    })
}
