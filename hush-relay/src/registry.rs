//! Session registry: which live connections belong to which identity.
//!
//! The registry is a bidirectional index (identity → connections,
//! connection → identity) kept under a single lock so that `join`, `leave`
//! and `connections_for` always observe a consistent snapshot. The lock only
//! guards map mutation; pushing frames to a connection happens after the
//! handles have been cloned out.

use hush_types::{ConnectionId, Identity};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// A serialized outbound frame, shared between all recipients of one event.
pub type Frame = Arc<str>;

/// Why a push to a connection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The connection's writer is gone; the socket has closed.
    Closed,
    /// The connection's outbound buffer is full.
    Full,
}

/// Sending half of one connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Frame>,
}

impl ConnectionHandle {
    /// Wrap an existing outbound sender.
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<Frame>) -> Self {
        Self { id, outbound }
    }

    /// Create a handle together with the receiver its writer task drains.
    pub fn channel(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(id, tx), rx)
    }

    /// The connection this handle writes to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame without waiting.
    pub fn push(&self, frame: Frame) -> Result<(), PushError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }
}

#[derive(Debug, Default)]
struct RoutingIndex {
    /// Identity → its live connections.
    rooms: HashMap<Identity, HashMap<ConnectionId, ConnectionHandle>>,
    /// Connection → the identity it is bound to.
    bindings: HashMap<ConnectionId, Identity>,
}

impl RoutingIndex {
    fn unbind(&mut self, connection: &ConnectionId) -> Option<Identity> {
        let identity = self.bindings.remove(connection)?;
        if let Some(room) = self.rooms.get_mut(&identity) {
            room.remove(connection);
            if room.is_empty() {
                self.rooms.remove(&identity);
            }
        }
        Some(identity)
    }
}

/// Maps identities to their live connections.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    index: RwLock<RoutingIndex>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to an identity.
    ///
    /// Joining the identity the connection is already bound to changes
    /// nothing. Joining a different identity detaches it from the previous
    /// one, which is returned.
    pub async fn join(&self, identity: Identity, handle: ConnectionHandle) -> Option<Identity> {
        let id = handle.id();
        let mut index = self.index.write().await;

        let previous = match index.bindings.get(&id) {
            Some(current) if *current == identity => None,
            Some(_) => index.unbind(&id),
            None => None,
        };

        index.bindings.insert(id, identity.clone());
        let room = index.rooms.entry(identity.clone()).or_default();
        room.insert(id, handle);

        tracing::debug!(
            "Joined: connection={:?} identity={:?} (connections: {})",
            id,
            identity,
            room.len()
        );

        previous
    }

    /// Unbind a connection. Returns the identity it was bound to, if any.
    pub async fn leave(&self, connection: &ConnectionId) -> Option<Identity> {
        let mut index = self.index.write().await;
        let identity = index.unbind(connection);

        if let Some(identity) = &identity {
            tracing::debug!(
                "Left: connection={:?} identity={:?} (remaining: {})",
                connection,
                identity,
                index.rooms.get(identity).map(|r| r.len()).unwrap_or(0)
            );
        }

        identity
    }

    /// Live connections currently bound to an identity.
    pub async fn connections_for(&self, identity: &Identity) -> Vec<ConnectionHandle> {
        let index = self.index.read().await;
        index
            .rooms
            .get(identity)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The identity a connection is bound to.
    pub async fn identity_of(&self, connection: &ConnectionId) -> Option<Identity> {
        self.index.read().await.bindings.get(connection).cloned()
    }

    /// Number of identities with at least one live connection.
    pub async fn identity_count(&self) -> usize {
        self.index.read().await.rooms.len()
    }

    /// Number of connections bound to some identity.
    pub async fn bound_connections(&self) -> usize {
        self.index.read().await.bindings.len()
    }
}
