//! Durable storage collaborators for hush-relay.
//!
//! The relay only consumes two narrow interfaces here: an append-only chat
//! log ([`crate::audit::AuditLog`]) and a read-only public key directory
//! ([`KeyDirectory`]). Both are served by the same SQLite database.

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use hush_types::Identity;
use serde::Serialize;

/// Read-only lookup of registered public keys.
///
/// Registration itself lives outside the relay.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// The public key registered for an identity, if any.
    async fn get_public_key(&self, identity: &Identity) -> Result<Option<String>, StorageError>;
}

/// A participant in the conversation graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    /// Node id (the identity).
    pub id: String,
    /// Display label.
    pub label: String,
    /// Node group for the visualization layer.
    pub group: &'static str,
}

/// Messages sent from one identity to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    /// Sender identity.
    pub from: String,
    /// Recipient identity.
    pub to: String,
    /// Number of logged messages along this edge.
    pub count: i64,
}

/// Who talked to whom, derived from the audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationGraph {
    /// Registered identities plus any identity seen in the log.
    pub nodes: Vec<GraphNode>,
    /// One edge per (sender, recipient) pair.
    pub edges: Vec<GraphEdge>,
}
