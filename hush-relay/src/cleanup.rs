//! Background sweep task for expired blind objects.
//!
//! Runs periodically to reclaim objects past their retention window and to
//! drop rate limiter state left behind by closed connections.

use crate::config::CleanupConfig;
use crate::limits::RateLimits;
use crate::server::RelayMetrics;
use crate::store::BlindStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Spawn the background sweep task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_sweep_task(
    store: Arc<BlindStore>,
    rate_limits: RateLimits,
    metrics: Arc<RelayMetrics>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Sweep task disabled");
            return;
        }

        let interval_secs = config.interval_secs.max(1);
        tracing::info!("Sweep task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));

        loop {
            timer.tick().await;

            let reclaimed = store.sweep();
            if reclaimed > 0 {
                metrics
                    .objects_expired
                    .fetch_add(reclaimed as u64, Ordering::Relaxed);
                tracing::info!("Sweep: reclaimed {} expired objects", reclaimed);
            } else {
                tracing::debug!("Sweep: no expired objects");
            }

            rate_limits.shrink();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::store::StoreLimits;

    fn short_lived_store() -> Arc<BlindStore> {
        Arc::new(BlindStore::new(StoreLimits {
            retention: Duration::from_millis(10),
            max_object_size: 1024,
            max_objects: 16,
            max_total_bytes: 16 * 1024,
        }))
    }

    #[tokio::test]
    async fn sweep_task_reclaims_expired_objects() {
        let store = short_lived_store();
        let metrics = Arc::new(RelayMetrics::default());
        store.put(b"expired".to_vec()).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        // First tick fires immediately
        let handle = spawn_sweep_task(
            store.clone(),
            RateLimits::new(&LimitsConfig::default()),
            metrics.clone(),
            CleanupConfig {
                interval_secs: 3600,
                enabled: true,
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(store.is_empty());
        assert_eq!(store.resident_bytes(), 0);
        assert_eq!(metrics.objects_expired.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn disabled_sweep_task_exits_immediately() {
        let store = short_lived_store();
        store.put(b"kept".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let handle = spawn_sweep_task(
            store.clone(),
            RateLimits::new(&LimitsConfig::default()),
            Arc::new(RelayMetrics::default()),
            CleanupConfig {
                interval_secs: 1,
                enabled: false,
            },
        );

        handle.await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
