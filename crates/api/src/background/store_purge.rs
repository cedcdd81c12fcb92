//! Periodic removal of expired cache entries and task records.
//!
//! Expired entries are already invisible to readers; this only reclaims
//! their storage.

use std::sync::Arc;
use std::time::Duration;

use sculpt_store::KvBackend;
use tokio_util::sync::CancellationToken;

/// How often the purge runs.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Run the purge loop until `cancel` is triggered.
pub async fn run(backend: Arc<dyn KvBackend>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Store purge job started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Store purge job stopping");
                break;
            }
            _ = ticker.tick() => {
                match backend.purge_expired().await {
                    Ok(0) => tracing::debug!("Store purge: nothing expired"),
                    Ok(purged) => tracing::info!(purged, "Store purge: removed expired entries"),
                    Err(e) => tracing::error!(error = %e, "Store purge failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sculpt_core::clock::{Clock, ManualClock};
    use sculpt_store::MemoryBackend;

    #[tokio::test]
    async fn purges_on_first_tick_and_stops_on_cancel() {
        let clock = Arc::new(ManualClock::default());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let backend = Arc::new(MemoryBackend::with_clock(dyn_clock));
        backend
            .set("f1:session:2024:1:Q:loaded", "1".into(), Duration::from_secs(1))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(2));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(backend.clone(), PURGE_INTERVAL, cancel.clone()));

        for _ in 0..100 {
            if backend.raw_len().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(backend.raw_len().await, 0);

        cancel.cancel();
        task.await.unwrap();
    }
}
