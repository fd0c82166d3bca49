//! Per-connection session management.
//!
//! Each WebSocket gets a Session that reads inbound frames, dispatches them
//! to the router or the signaling coordinator, and a writer task that drains
//! the connection's outbound queue into the socket.

use crate::error::{ProtocolError, ProtocolResult};
use crate::registry::{ConnectionHandle, Frame};
use crate::router::RelayEvent;
use crate::server::ChatRelay;
use crate::signaling::Origin;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use hush_types::{ClientEvent, ConnectionId, Identity, Joined, ServerEvent};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A per-connection session.
pub struct Session {
    relay: Arc<ChatRelay>,
    handle: ConnectionHandle,
    identity: Option<Identity>,
}

impl Session {
    /// Create a session and the receiver its writer drains.
    pub fn new(relay: Arc<ChatRelay>) -> (Self, mpsc::Receiver<Frame>) {
        let capacity = relay.config().limits.outbound_buffer;
        let (handle, outbound) = ConnectionHandle::channel(ConnectionId::new(), capacity);
        (
            Self {
                relay,
                handle,
                identity: None,
            },
            outbound,
        )
    }

    /// This session's connection id.
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// The identity this connection has joined as.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Serve a WebSocket until it closes.
    pub async fn run(mut self, socket: WebSocket, mut outbound: mpsc::Receiver<Frame>) {
        let id = self.id();
        tracing::info!("New connection {:?}", id);

        let (mut sink, mut stream) = socket.split();

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                if sink.send(WsMessage::Text(frame.to_string())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        while let Some(result) = stream.next().await {
            let text = match result {
                Ok(WsMessage::Text(text)) => text,
                Ok(WsMessage::Binary(_)) => {
                    self.fail(ProtocolError::UnsupportedFrame("binary"));
                    continue;
                }
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("Connection {:?} read error: {}", id, e);
                    break;
                }
            };

            if let Err(e) = self.handle_text(&text).await {
                self.fail(e);
            }
        }

        // Cleanup
        if let Some(identity) = self.relay.registry().leave(&id).await {
            tracing::info!("Connection {:?} of {:?} closed", id, identity);
        } else {
            tracing::info!("Connection {:?} closed", id);
        }
        writer.abort();
    }

    /// Handle one inbound text frame.
    pub async fn handle_text(&mut self, text: &str) -> ProtocolResult<()> {
        if let Err(e) = self.relay.rate_limits().check_message(&self.id()) {
            self.relay
                .metrics()
                .rate_limit_hits
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Connection {:?} rate limited: {}", self.id(), e);
            return Err(ProtocolError::RateLimited {
                reason: e.to_string(),
            });
        }

        let event = ClientEvent::from_json(text).map_err(|e| ProtocolError::InvalidMessage {
            reason: e.to_string(),
        })?;

        match event {
            ClientEvent::Join(join) => self.handle_join(join.identity).await?,
            ClientEvent::Leave(_) => {
                self.relay.registry().leave(&self.id()).await;
                self.identity = None;
            }
            ClientEvent::PrivateMessage(message) => {
                self.relay.router().route(RelayEvent::chat(message)).await?;
            }
            ClientEvent::CallUser(offer) => {
                self.relay.signaling().offer(&self.origin(), offer).await?;
            }
            ClientEvent::MakeAnswer(answer) => {
                self.relay.signaling().answer(&self.origin(), answer).await?;
            }
            ClientEvent::IceCandidate(candidate) => {
                self.relay
                    .signaling()
                    .ice_candidate(&self.origin(), candidate)
                    .await?;
            }
        }

        Ok(())
    }

    async fn handle_join(&mut self, identity: Identity) -> ProtocolResult<()> {
        let previous = self
            .relay
            .registry()
            .join(identity.clone(), self.handle.clone())
            .await;

        match previous {
            Some(previous) => tracing::info!(
                "Connection {:?} moved from {:?} to {:?}",
                self.id(),
                previous,
                identity
            ),
            None => tracing::info!("Connection {:?} joined as {:?}", self.id(), identity),
        }

        self.identity = Some(identity.clone());
        self.reply(&ServerEvent::Joined(Joined {
            identity,
            socket: self.id(),
        }))
    }

    fn origin(&self) -> Origin {
        Origin {
            connection: self.id(),
            identity: self.identity.clone(),
        }
    }

    /// Queue a frame for this connection only.
    fn reply(&self, event: &ServerEvent) -> ProtocolResult<()> {
        let frame: Frame = Arc::from(event.to_json()?);
        if let Err(e) = self.handle.push(frame) {
            tracing::debug!("Reply to {:?} not queued: {:?}", self.id(), e);
        }
        Ok(())
    }

    /// Report a failed request back to this connection.
    fn fail(&self, error: ProtocolError) {
        self.relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Connection {:?} request failed: {}", self.id(), error);
        if let Err(e) = self.reply(&ServerEvent::error(error.to_string())) {
            tracing::error!("Failed to encode error frame: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::spawn_audit_writer;
    use crate::config::Config;
    use crate::server::RelayMetrics;
    use crate::storage::SqliteStorage;
    use serde_json::json;

    async fn test_relay(config: Config) -> Arc<ChatRelay> {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let metrics = Arc::new(RelayMetrics::default());
        let (audit, _writer) = spawn_audit_writer(storage.clone(), 16, metrics.clone());
        Arc::new(ChatRelay::new(config, storage, audit, metrics))
    }

    fn next_event(rx: &mut mpsc::Receiver<Frame>) -> ServerEvent {
        ServerEvent::from_json(&rx.try_recv().unwrap()).unwrap()
    }

    async fn joined(relay: &Arc<ChatRelay>, name: &str) -> (Session, mpsc::Receiver<Frame>) {
        let (mut session, mut rx) = Session::new(relay.clone());
        let frame = json!({"event": "join", "data": {"username": name}}).to_string();
        session.handle_text(&frame).await.unwrap();
        assert!(matches!(next_event(&mut rx), ServerEvent::Joined(_)));
        (session, rx)
    }

    #[tokio::test]
    async fn join_acknowledges_with_socket() {
        let relay = test_relay(Config::default()).await;
        let (mut session, mut rx) = Session::new(relay.clone());

        session
            .handle_text(r#"{"event":"join","data":{"identity":"alice"}}"#)
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut rx),
            ServerEvent::Joined(Joined {
                identity: Identity::new("alice").unwrap(),
                socket: session.id(),
            })
        );
        assert_eq!(session.identity().map(Identity::as_str), Some("alice"));
        assert_eq!(relay.registry().bound_connections().await, 1);
    }

    #[tokio::test]
    async fn chat_between_sessions() {
        let relay = test_relay(Config::default()).await;
        let (mut alice, mut alice_rx) = joined(&relay, "alice").await;
        let (_bob, mut bob_rx) = joined(&relay, "bob").await;

        alice
            .handle_text(
                r#"{"event":"private_message","data":{"sender":"alice","recipient":"bob","ciphertext":"xyz"}}"#,
            )
            .await
            .unwrap();

        let ServerEvent::IncomingMessage(msg) = next_event(&mut bob_rx) else {
            panic!("expected IncomingMessage");
        };
        assert_eq!(msg.sender.as_str(), "alice");
        assert_eq!(msg.ciphertext, "xyz");
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offer_carries_session_socket() {
        let relay = test_relay(Config::default()).await;
        let (mut alice, _alice_rx) = joined(&relay, "alice").await;
        let (_bob, mut bob_rx) = joined(&relay, "bob").await;

        alice
            .handle_text(
                r#"{"event":"call-user","data":{"offer":"sdp1","to":"bob","sender":"alice"}}"#,
            )
            .await
            .unwrap();

        let ServerEvent::CallMade(made) = next_event(&mut bob_rx) else {
            panic!("expected CallMade");
        };
        assert_eq!(made.socket, alice.id());
        assert_eq!(made.offer, json!("sdp1"));
    }

    #[tokio::test]
    async fn leave_stops_delivery() {
        let relay = test_relay(Config::default()).await;
        let (mut alice, _alice_rx) = joined(&relay, "alice").await;
        let (mut bob, mut bob_rx) = joined(&relay, "bob").await;

        bob.handle_text(r#"{"event":"leave","data":{}}"#).await.unwrap();
        assert!(bob.identity().is_none());
        assert!(bob_rx.try_recv().is_err());
        assert_eq!(relay.registry().bound_connections().await, 1);

        alice
            .handle_text(
                r#"{"event":"private_message","data":{"sender":"alice","recipient":"bob","ciphertext":"x"}}"#,
            )
            .await
            .unwrap();
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_frame_is_reported_to_sender() {
        let relay = test_relay(Config::default()).await;
        let (mut session, mut rx) = Session::new(relay.clone());

        let err = session.handle_text("{not json").await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage { .. }));

        session.fail(err);
        assert!(matches!(next_event(&mut rx), ServerEvent::Error { .. }));
        assert_eq!(relay.metrics().errors_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn rate_limited_session_gets_error() {
        let mut config = Config::default();
        config.limits.messages_per_minute = 2;
        let relay = test_relay(config).await;
        let (mut session, _rx) = Session::new(relay.clone());

        let frame = r#"{"event":"leave"}"#;
        session.handle_text(frame).await.unwrap();
        session.handle_text(frame).await.unwrap();
        let err = session.handle_text(frame).await.unwrap_err();

        assert!(matches!(err, ProtocolError::RateLimited { .. }));
        assert_eq!(relay.metrics().rate_limit_hits.load(Ordering::Relaxed), 1);
    }
}
