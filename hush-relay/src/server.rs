//! Main ChatRelay service object.
//!
//! ChatRelay owns the session registry, the relay router, the signaling
//! coordinator and the blind object store, and is shared by every
//! connection task and HTTP handler.

use crate::audit::{spawn_audit_writer, AuditSink};
use crate::cleanup::spawn_sweep_task;
use crate::config::Config;
use crate::error::Result;
use crate::limits::RateLimits;
use crate::registry::SessionRegistry;
use crate::router::RelayRouter;
use crate::signaling::SignalingCoordinator;
use crate::storage::SqliteStorage;
use crate::store::{BlindStore, StoreLimits};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total WebSocket connections accepted.
    pub connections_total: AtomicU64,
    /// Total chat messages routed (delivered or not).
    pub messages_routed: AtomicU64,
    /// Total signaling events routed (delivered or not).
    pub signals_routed: AtomicU64,
    /// Total frames queued on recipient connections.
    pub deliveries_total: AtomicU64,
    /// Events whose recipient had no live connection.
    pub routing_misses: AtomicU64,
    /// Connections found closed during routing and deregistered.
    pub stale_connections: AtomicU64,
    /// Pushes skipped because a connection's buffer was full.
    pub backlogged_pushes: AtomicU64,
    /// Chat records written to the audit log.
    pub audit_appended: AtomicU64,
    /// Chat records the audit log failed to write.
    pub audit_failures: AtomicU64,
    /// Chat records dropped because the audit queue was full.
    pub audit_dropped: AtomicU64,
    /// Blind objects uploaded.
    pub objects_stored: AtomicU64,
    /// Blind objects downloaded.
    pub objects_taken: AtomicU64,
    /// Blind objects reclaimed by the sweep.
    pub objects_expired: AtomicU64,
    /// Total payload bytes uploaded.
    pub bytes_uploaded: AtomicU64,
    /// Total payload bytes downloaded.
    pub bytes_downloaded: AtomicU64,
    /// Total rate limit rejections.
    pub rate_limit_hits: AtomicU64,
    /// Total malformed frames and refused requests.
    pub errors_total: AtomicU64,
}

/// The relay service.
pub struct ChatRelay {
    config: Config,
    storage: Arc<SqliteStorage>,
    registry: Arc<SessionRegistry>,
    router: Arc<RelayRouter>,
    signaling: SignalingCoordinator,
    store: Arc<BlindStore>,
    rate_limits: RateLimits,
    metrics: Arc<RelayMetrics>,
    /// Open WebSocket connections, joined or not.
    active_connections: AtomicUsize,
    started_at: Instant,
}

impl std::fmt::Debug for ChatRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRelay")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .field("active_connections", &self.active_connections)
            .field("stored_objects", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl ChatRelay {
    /// Create a relay.
    ///
    /// `audit` must feed the audit writer (see
    /// [`crate::audit::spawn_audit_writer`]) created with the same `metrics`.
    pub fn new(
        config: Config,
        storage: Arc<SqliteStorage>,
        audit: AuditSink,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let router = Arc::new(RelayRouter::new(registry.clone(), audit, metrics.clone()));
        let signaling = SignalingCoordinator::new(router.clone());
        let store = Arc::new(BlindStore::new(StoreLimits::from(&config.store)));
        let rate_limits = RateLimits::new(&config.limits);

        Self {
            config,
            storage,
            registry,
            router,
            signaling,
            store,
            rate_limits,
            metrics,
            active_connections: AtomicUsize::new(0),
            started_at: Instant::now(),
        }
    }

    /// Open the audit database and start the audit writer and sweep tasks.
    pub async fn start(config: Config) -> Result<Arc<Self>> {
        config.validate()?;

        let storage = Arc::new(SqliteStorage::new(&config.audit.database).await?);
        let metrics = Arc::new(RelayMetrics::default());
        let (audit, _writer) =
            spawn_audit_writer(storage.clone(), config.audit.queue_capacity, metrics.clone());

        let cleanup = config.cleanup.clone();
        let relay = Arc::new(Self::new(config, storage, audit, metrics));
        spawn_sweep_task(
            relay.store_arc(),
            relay.rate_limits.clone(),
            relay.metrics_arc(),
            cleanup,
        );

        tracing::info!("Audit log at {}", relay.config.audit.database.display());
        Ok(relay)
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the database.
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Get access to the session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Get access to the relay router.
    pub fn router(&self) -> &RelayRouter {
        &self.router
    }

    /// Get access to the signaling coordinator.
    pub fn signaling(&self) -> &SignalingCoordinator {
        &self.signaling
    }

    /// Get access to the blind object store.
    pub fn store(&self) -> &BlindStore {
        &self.store
    }

    /// Get a clone of the store Arc for background tasks.
    pub fn store_arc(&self) -> Arc<BlindStore> {
        self.store.clone()
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Get a clone of the metrics Arc for background tasks.
    pub fn metrics_arc(&self) -> Arc<RelayMetrics> {
        self.metrics.clone()
    }

    /// Claim a connection slot. Returns false when the relay is full.
    pub fn try_open_connection(&self) -> bool {
        let max = self.config.limits.max_concurrent_sessions;
        let claimed = self
            .active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok();

        if claimed {
            self.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
        }
        claimed
    }

    /// Release a slot claimed by [`Self::try_open_connection`].
    pub fn close_connection(&self) {
        self.active_connections.fetch_sub(1, Ordering::AcqRel);
    }

    /// Open WebSocket connections, joined or not.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    /// Time since this relay was created.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Serve HTTP and WebSocket traffic on `listener` until `shutdown` resolves.
pub async fn serve<F>(relay: Arc<ChatRelay>, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, crate::http::build_router(relay))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::spawn_audit_writer;

    async fn test_relay(config: Config) -> ChatRelay {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let metrics = Arc::new(RelayMetrics::default());
        let (audit, _writer) =
            spawn_audit_writer(storage.clone(), config.audit.queue_capacity, metrics.clone());
        ChatRelay::new(config, storage, audit, metrics)
    }

    #[tokio::test]
    async fn connection_slots_are_bounded() {
        let mut config = Config::default();
        config.limits.max_concurrent_sessions = 2;
        let relay = test_relay(config).await;

        assert!(relay.try_open_connection());
        assert!(relay.try_open_connection());
        assert!(!relay.try_open_connection());
        assert_eq!(relay.active_connections(), 2);

        relay.close_connection();
        assert!(relay.try_open_connection());
        assert_eq!(relay.metrics().connections_total.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn store_uses_configured_limits() {
        let mut config = Config::default();
        config.store.retention_secs = 90;
        config.store.max_objects = 7;
        let relay = test_relay(config).await;

        assert_eq!(relay.store().limits().retention.as_secs(), 90);
        assert_eq!(relay.store().limits().max_objects, 7);
    }

    #[tokio::test]
    async fn uptime_counts_from_creation() {
        let relay = test_relay(Config::default()).await;
        let first = relay.uptime();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(relay.uptime() >= first + Duration::from_millis(20));
    }

    #[tokio::test]
    async fn start_opens_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.audit.database = dir.path().join("audit.db");

        let relay = ChatRelay::start(config).await.unwrap();
        assert!(dir.path().join("audit.db").exists());
        assert_eq!(relay.active_connections(), 0);
    }

    #[tokio::test]
    async fn start_rejects_invalid_config() {
        let mut config = Config::default();
        config.limits.outbound_buffer = 0;

        let err = ChatRelay::start(config).await.unwrap_err();
        assert!(matches!(err, crate::error::RelayError::Config(_)));
    }

    #[tokio::test]
    async fn serve_returns_after_shutdown() {
        let relay = test_relay(Config::default()).await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        serve(Arc::new(relay), listener, async {}).await.unwrap();
    }

    #[tokio::test]
    async fn debug_output_is_summarized() {
        let relay = test_relay(Config::default()).await;
        let debug = format!("{:?}", relay);
        assert!(debug.contains("ChatRelay"));
        assert!(debug.contains("stored_objects"));
    }
}
