//! SQLite storage backend for hush-relay.

use super::{ConversationGraph, GraphEdge, GraphNode, KeyDirectory};
use crate::audit::{AuditLog, ChatRecord};
use crate::error::StorageError;
use async_trait::async_trait;
use hush_types::Identity;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

/// SQLite-backed audit log and key directory.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("connections", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Open (creating if needed) the database at `path`.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let path_str = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;

        let options = SqliteConnectOptions::from_str(path_str)
            .map_err(StorageError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:").map_err(StorageError::Database)?;

        // One connection that never idles out, or the database goes with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                ciphertext TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Written by the registration service sharing this database.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                public_key TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages(sender, recipient)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or replace the public key for an identity.
    ///
    /// The relay never calls this itself; it exists for the registration
    /// side of the shared database and for seeding.
    pub async fn put_public_key(
        &self,
        identity: &Identity,
        public_key: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO users (username, public_key) VALUES (?1, ?2)
            ON CONFLICT(username) DO UPDATE SET public_key = excluded.public_key
            "#,
        )
        .bind(identity.as_str())
        .bind(public_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of logged chat messages.
    pub async fn message_count(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Build the who-talked-to-whom graph from users and the message log.
    pub async fn conversation_graph(&self) -> Result<ConversationGraph, StorageError> {
        let users: Vec<(String,)> = sqlx::query_as("SELECT username FROM users")
            .fetch_all(&self.pool)
            .await?;

        let edges: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT sender, recipient, COUNT(*)
            FROM messages
            GROUP BY sender, recipient
            ORDER BY sender, recipient
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut names: BTreeSet<String> = users.into_iter().map(|(name,)| name).collect();
        for (from, to, _) in &edges {
            names.insert(from.clone());
            names.insert(to.clone());
        }

        Ok(ConversationGraph {
            nodes: names
                .into_iter()
                .map(|name| GraphNode {
                    label: name.clone(),
                    id: name,
                    group: "users",
                })
                .collect(),
            edges: edges
                .into_iter()
                .map(|(from, to, count)| GraphEdge { from, to, count })
                .collect(),
        })
    }
}

#[async_trait]
impl AuditLog for SqliteStorage {
    async fn append(&self, record: &ChatRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO messages (sender, recipient, ciphertext, timestamp)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(record.sender.as_str())
        .bind(record.recipient.as_str())
        .bind(&record.ciphertext)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl KeyDirectory for SqliteStorage {
    async fn get_public_key(&self, identity: &Identity) -> Result<Option<String>, StorageError> {
        let key: Option<String> =
            sqlx::query_scalar("SELECT public_key FROM users WHERE username = ?1")
                .bind(identity.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(key)
    }
}
