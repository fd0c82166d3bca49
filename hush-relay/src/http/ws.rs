//! WebSocket upgrade endpoint.

use crate::server::ChatRelay;
use crate::session::Session;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use std::sync::Arc;

/// A claimed connection slot, released on drop.
///
/// Dropped either when the session ends or when the upgrade never completes.
struct ConnectionSlot(Arc<ChatRelay>);

impl ConnectionSlot {
    fn claim(relay: &Arc<ChatRelay>) -> Option<Self> {
        relay
            .try_open_connection()
            .then(|| ConnectionSlot(relay.clone()))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.close_connection();
    }
}

/// GET /ws - upgrade to a relay session.
pub async fn ws_handler(
    Extension(relay): Extension<Arc<ChatRelay>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(slot) = ConnectionSlot::claim(&relay) else {
        tracing::warn!("Connection refused: relay at session capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "relay is full").into_response();
    };

    ws.on_upgrade(move |socket| async move {
        let (session, outbound) = Session::new(relay);
        session.run(socket, outbound).await;
        drop(slot);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::spawn_audit_writer;
    use crate::config::Config;
    use crate::server::RelayMetrics;
    use crate::storage::SqliteStorage;

    #[tokio::test]
    async fn slot_is_released_on_drop() {
        let mut config = Config::default();
        config.limits.max_concurrent_sessions = 1;
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let metrics = Arc::new(RelayMetrics::default());
        let (audit, _writer) = spawn_audit_writer(storage.clone(), 16, metrics.clone());
        let relay = Arc::new(ChatRelay::new(config, storage, audit, metrics));

        let slot = ConnectionSlot::claim(&relay).unwrap();
        assert!(ConnectionSlot::claim(&relay).is_none());
        assert_eq!(relay.active_connections(), 1);

        drop(slot);
        assert_eq!(relay.active_connections(), 0);
        assert!(ConnectionSlot::claim(&relay).is_some());
    }
}
