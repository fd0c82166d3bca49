//! Blind object upload and download endpoints.

use crate::error::StoreError;
use crate::server::ChatRelay;
use axum::body::Bytes;
use axum::extract::{Multipart, Path};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use hush_types::ObjectHandle;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            StoreError::NotFound => StatusCode::NOT_FOUND,
            StoreError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            StoreError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Handle(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            StoreError::NotFound => "not found".to_string(),
            other => other.to_string(),
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, header::HeaderValue::from_static("30"));
        }
        response
    }
}

/// POST /blind - store the raw request body.
pub async fn upload_raw(
    Extension(relay): Extension<Arc<ChatRelay>>,
    body: Bytes,
) -> Response {
    match store_payload(&relay, body.to_vec()) {
        Ok(handle) => (StatusCode::CREATED, Json(json!({ "handle": handle }))).into_response(),
        Err(response) => response,
    }
}

/// POST /upload_blind - store the `file` field of a multipart form.
///
/// Answers with both `handle` and the legacy `file_id` key.
pub async fn upload_multipart(
    Extension(relay): Extension<Arc<ChatRelay>>,
    mut multipart: Multipart,
) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return e.into_response(),
        };
        if field.name() != Some("file") {
            continue;
        }
        return match field.bytes().await {
            Ok(payload) => match store_payload(&relay, payload.to_vec()) {
                Ok(handle) => (
                    StatusCode::CREATED,
                    Json(json!({ "handle": handle, "file_id": handle })),
                )
                    .into_response(),
                Err(response) => response,
            },
            Err(e) => e.into_response(),
        };
    }

    relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "missing file field" })),
    )
        .into_response()
}

/// GET /blind/:handle - destructive read.
pub async fn download(
    Extension(relay): Extension<Arc<ChatRelay>>,
    Path(handle): Path<String>,
) -> Response {
    // Malformed handles are reported like any other unknown one.
    let result = handle
        .parse::<ObjectHandle>()
        .map_err(|_| StoreError::NotFound)
        .and_then(|handle| relay.store().take(&handle));

    match result {
        Ok(payload) => {
            let m = relay.metrics();
            m.objects_taken.fetch_add(1, Ordering::Relaxed);
            m.bytes_downloaded
                .fetch_add(payload.len() as u64, Ordering::Relaxed);
            tracing::debug!("Released blind object ({} bytes)", payload.len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/octet-stream")],
                payload,
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

fn store_payload(relay: &ChatRelay, payload: Vec<u8>) -> Result<String, Response> {
    if let Err(e) = relay.rate_limits().check_global() {
        relay.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response());
    }

    let size = payload.len();
    match relay.store().put(payload) {
        Ok(handle) => {
            let m = relay.metrics();
            m.objects_stored.fetch_add(1, Ordering::Relaxed);
            m.bytes_uploaded.fetch_add(size as u64, Ordering::Relaxed);
            tracing::debug!("Stored blind object ({} bytes)", size);
            Ok(handle.to_string())
        }
        Err(e) => {
            relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Upload refused: {}", e);
            Err(e.into_response())
        }
    }
}
