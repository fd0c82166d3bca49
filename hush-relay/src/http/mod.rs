//! HTTP endpoints for hush-relay.
//!
//! Serves the WebSocket upgrade, blind object upload and download, key
//! lookup, the conversation graph, health checks and metrics.

mod blind;
pub mod health;
mod keys;
mod metrics;
mod ws;

use crate::server::ChatRelay;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Extension, Router};
use std::sync::Arc;

pub use health::HealthStatus;

/// Headroom over the object size limit for multipart framing.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<ChatRelay>) -> Router {
    let body_limit = relay
        .config()
        .store
        .max_object_size
        .saturating_add(BODY_LIMIT_SLACK);

    let mut router = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/blind", post(blind::upload_raw))
        .route("/upload_blind", post(blind::upload_multipart))
        .route("/blind/:handle", get(blind::download))
        .route("/download_blind/:handle", get(blind::download))
        .route("/get_key/:identity", get(keys::get_key))
        .route("/admin/graph", get(keys::graph))
        .route("/health", get(health::health_handler));

    if relay.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(Extension(relay))
}
