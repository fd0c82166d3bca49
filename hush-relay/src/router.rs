//! Relay router: pushes an event to every live connection of its recipient.
//!
//! Routing is best-effort and at-most-once per live connection. An event for
//! an identity with no live connections is dropped without error. A
//! connection whose writer has gone away is removed from the registry the
//! first time a push to it fails.

use crate::audit::{AuditSink, ChatRecord};
use crate::error::ProtocolResult;
use crate::registry::{Frame, PushError, SessionRegistry};
use crate::server::RelayMetrics;
use hush_types::{ChatMessage, EventKind, Identity, ServerEvent};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// An event addressed to one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEvent {
    /// What kind of event this is.
    pub kind: EventKind,
    /// Originating identity, when the event carries one.
    pub sender: Option<Identity>,
    /// Addressee.
    pub recipient: Identity,
    /// Frame pushed to each of the recipient's connections.
    pub body: ServerEvent,
}

impl RelayEvent {
    /// A chat message, forwarded verbatim as `incoming_message`.
    pub fn chat(message: ChatMessage) -> Self {
        Self {
            kind: EventKind::ChatMessage,
            sender: Some(message.sender.clone()),
            recipient: message.recipient.clone(),
            body: ServerEvent::IncomingMessage(message),
        }
    }
}

/// What happened to one routed event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Connections the frame was queued on.
    pub delivered: usize,
    /// Connections found closed and deregistered.
    pub stale: usize,
    /// Connections skipped because their outbound buffer was full.
    pub backlogged: usize,
}

impl RouteOutcome {
    /// Whether the recipient had no live connections at routing time.
    pub fn is_miss(&self) -> bool {
        self.delivered == 0 && self.stale == 0 && self.backlogged == 0
    }
}

/// Forwards events to the connections registered for their recipient.
#[derive(Debug)]
pub struct RelayRouter {
    registry: Arc<SessionRegistry>,
    audit: AuditSink,
    metrics: Arc<RelayMetrics>,
}

impl RelayRouter {
    /// Create a router over a registry and an audit sink.
    pub fn new(registry: Arc<SessionRegistry>, audit: AuditSink, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            registry,
            audit,
            metrics,
        }
    }

    /// Route an event to every live connection of its recipient.
    ///
    /// Chat messages are also handed to the audit sink; that handoff never
    /// waits and its failure is not reported here.
    pub async fn route(&self, event: RelayEvent) -> ProtocolResult<RouteOutcome> {
        if let ServerEvent::IncomingMessage(message) = &event.body {
            if !self.audit.submit(ChatRecord::capture(message)) {
                self.metrics.audit_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        let counter = if event.kind.is_signaling() {
            &self.metrics.signals_routed
        } else {
            &self.metrics.messages_routed
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let targets = self.registry.connections_for(&event.recipient).await;
        if targets.is_empty() {
            self.metrics.routing_misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "Dropped {} for {:?}: no live connections",
                event.kind,
                event.recipient
            );
            return Ok(RouteOutcome::default());
        }

        let frame: Frame = Arc::from(event.body.to_json()?);
        let mut outcome = RouteOutcome::default();

        for target in &targets {
            match target.push(frame.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(PushError::Closed) => {
                    outcome.stale += 1;
                    self.metrics.stale_connections.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "Connection {:?} of {:?} is closed, deregistering",
                        target.id(),
                        event.recipient
                    );
                    self.registry.leave(&target.id()).await;
                }
                Err(PushError::Full) => {
                    outcome.backlogged += 1;
                    self.metrics.backlogged_pushes.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "Connection {:?} of {:?} is backlogged, skipping {}",
                        target.id(),
                        event.recipient,
                        event.kind
                    );
                }
            }
        }

        self.metrics
            .deliveries_total
            .fetch_add(outcome.delivered as u64, Ordering::Relaxed);

        tracing::debug!(
            "Routed {} from {:?} to {}/{} connections of {:?}",
            event.kind,
            event.sender,
            outcome.delivered,
            targets.len(),
            event.recipient
        );

        Ok(outcome)
    }
}
