//! Prometheus metrics endpoint.

use crate::server::ChatRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::fmt::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const PREFIX: &str = "hush_relay";

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Gauges describe current state, counters are monotonic since startup.
pub async fn metrics_handler(Extension(relay): Extension<Arc<ChatRelay>>) -> impl IntoResponse {
    let m = relay.metrics();
    let mut body = String::new();

    // Gauges
    let gauges: [(&str, &str, u64); 5] = [
        (
            "connections_active",
            "Open WebSocket connections",
            relay.active_connections() as u64,
        ),
        (
            "identities_active",
            "Identities with at least one joined connection",
            relay.registry().identity_count().await as u64,
        ),
        (
            "store_objects",
            "Blind objects awaiting retrieval",
            relay.store().len() as u64,
        ),
        (
            "store_bytes",
            "Payload bytes held by the blind store",
            relay.store().resident_bytes() as u64,
        ),
        (
            "rate_limit_keys",
            "Connections tracked by the per-connection rate limiter",
            relay.rate_limits().message_keys_count() as u64,
        ),
    ];
    for (name, help, value) in gauges {
        write_metric(&mut body, name, "gauge", help, value);
    }

    let _ = writeln!(
        body,
        "# HELP {PREFIX}_info Server information\n# TYPE {PREFIX}_info gauge\n{PREFIX}_info{{version=\"{}\"}} 1\n",
        env!("CARGO_PKG_VERSION"),
    );

    // Counters
    let counters = [
        ("connections_total", "Total connections accepted", &m.connections_total),
        ("messages_routed_total", "Total chat messages routed", &m.messages_routed),
        ("signals_routed_total", "Total signaling events routed", &m.signals_routed),
        ("deliveries_total", "Total frames queued on recipient connections", &m.deliveries_total),
        ("routing_misses_total", "Events whose recipient was offline", &m.routing_misses),
        ("stale_connections_total", "Closed connections found during routing", &m.stale_connections),
        ("backlogged_pushes_total", "Pushes skipped on a full connection buffer", &m.backlogged_pushes),
        ("audit_appended_total", "Chat records written to the audit log", &m.audit_appended),
        ("audit_failures_total", "Chat records the audit log failed to write", &m.audit_failures),
        ("audit_dropped_total", "Chat records dropped on a full audit queue", &m.audit_dropped),
        ("objects_stored_total", "Blind objects uploaded", &m.objects_stored),
        ("objects_taken_total", "Blind objects downloaded", &m.objects_taken),
        ("objects_expired_total", "Blind objects reclaimed by the sweep", &m.objects_expired),
        ("bytes_uploaded_total", "Blind payload bytes uploaded", &m.bytes_uploaded),
        ("bytes_downloaded_total", "Blind payload bytes downloaded", &m.bytes_downloaded),
        ("rate_limit_hits_total", "Total rate limit rejections", &m.rate_limit_hits),
        ("errors_total", "Total malformed frames and refused requests", &m.errors_total),
    ];
    for (name, help, counter) in counters {
        write_metric(&mut body, name, "counter", help, counter.load(Ordering::Relaxed));
    }

    // Database stats (best effort)
    let logged = relay.storage().message_count().await.unwrap_or(0);
    write_metric(
        &mut body,
        "audit_messages",
        "gauge",
        "Chat records held in the audit database",
        logged,
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

fn write_metric(out: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(
        out,
        "# HELP {PREFIX}_{name} {help}\n# TYPE {PREFIX}_{name} {kind}\n{PREFIX}_{name} {value}\n"
    );
}
