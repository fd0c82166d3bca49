//! Key directory lookup and conversation graph endpoints.

use crate::server::ChatRelay;
use crate::storage::{ConversationGraph, KeyDirectory};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use hush_types::Identity;
use serde_json::json;
use std::sync::Arc;

/// GET /get_key/:identity
pub async fn get_key(
    Extension(relay): Extension<Arc<ChatRelay>>,
    Path(identity): Path<String>,
) -> Response {
    let Ok(identity) = Identity::new(identity) else {
        return not_found();
    };

    match relay.storage().get_public_key(&identity).await {
        Ok(Some(public_key)) => Json(json!({ "public_key": public_key })).into_response(),
        Ok(None) => not_found(),
        Err(e) => {
            tracing::error!("Key lookup for {:?} failed: {}", identity, e);
            storage_unavailable()
        }
    }
}

/// GET /admin/graph
pub async fn graph(Extension(relay): Extension<Arc<ChatRelay>>) -> Response {
    match relay.storage().conversation_graph().await {
        Ok(graph) => Json::<ConversationGraph>(graph).into_response(),
        Err(e) => {
            tracing::error!("Graph query failed: {}", e);
            storage_unavailable()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
}

fn storage_unavailable() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "storage unavailable" })),
    )
        .into_response()
}
