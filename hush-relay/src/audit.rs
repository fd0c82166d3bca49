//! Audit path for relayed chat messages.
//!
//! Delivery and audit are two independent consumers of the same event. The
//! router hands each chat record to an [`AuditSink`], which queues it on a
//! bounded channel without waiting; a single writer task drains the queue
//! into an [`AuditLog`]. A slow or failing log therefore never delays live
//! delivery: when the queue is full the record is dropped and counted.

use crate::error::StorageError;
use crate::server::RelayMetrics;
use async_trait::async_trait;
use hush_types::{ChatMessage, Identity};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// One chat message as written to durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    /// Claimed author.
    pub sender: Identity,
    /// Addressee.
    pub recipient: Identity,
    /// Opaque ciphertext, stored as received.
    pub ciphertext: String,
    /// Unix timestamp (seconds) when the relay saw the message.
    pub timestamp: i64,
}

impl ChatRecord {
    /// Capture a message at the current time.
    pub fn capture(message: &ChatMessage) -> Self {
        Self {
            sender: message.sender.clone(),
            recipient: message.recipient.clone(),
            ciphertext: message.ciphertext.clone(),
            timestamp: current_timestamp(),
        }
    }
}

/// Durable append-only log of chat records.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one record.
    async fn append(&self, record: &ChatRecord) -> Result<(), StorageError>;
}

/// Non-blocking handle for submitting records to the audit writer.
#[derive(Debug, Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<ChatRecord>,
}

impl AuditSink {
    /// Queue a record. Returns false if it was dropped.
    pub fn submit(&self, record: ChatRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(record)) => {
                tracing::warn!(
                    "Audit queue full, dropping record {:?} -> {:?}",
                    record.sender,
                    record.recipient
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Audit writer stopped, dropping record");
                false
            }
        }
    }
}

/// Spawn the audit writer task.
///
/// The task runs until every [`AuditSink`] clone has been dropped and the
/// queue is drained.
pub fn spawn_audit_writer(
    log: Arc<dyn AuditLog>,
    capacity: usize,
    metrics: Arc<RelayMetrics>,
) -> (AuditSink, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ChatRecord>(capacity);

    let handle = tokio::spawn(async move {
        tracing::info!("Audit writer started (queue: {})", capacity);

        while let Some(record) = rx.recv().await {
            match log.append(&record).await {
                Ok(()) => {
                    metrics.audit_appended.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    metrics.audit_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("Audit append failed: {}", e);
                }
            }
        }

        tracing::info!("Audit writer stopped");
    });

    (AuditSink { tx }, handle)
}

/// Audit log kept in process memory.
///
/// For tests and for embedders that inspect records directly. The
/// `hush-relay` binary always writes to [`crate::storage::SqliteStorage`].
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<ChatRecord>>,
}

impl MemoryAuditLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far.
    pub fn records(&self) -> Vec<ChatRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, record: &ChatRecord) -> Result<(), StorageError> {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        Ok(())
    }
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct FailingLog;

    #[async_trait]
    impl AuditLog for FailingLog {
        async fn append(&self, _record: &ChatRecord) -> Result<(), StorageError> {
            Err(StorageError::Database(sqlx::Error::PoolClosed))
        }
    }

    /// Blocks every append until the test releases it.
    struct StalledLog {
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl AuditLog for StalledLog {
        async fn append(&self, _record: &ChatRecord) -> Result<(), StorageError> {
            let _permit = self.gate.acquire().await;
            Ok(())
        }
    }

    fn record(text: &str) -> ChatRecord {
        ChatRecord::capture(&ChatMessage::new(
            Identity::new("alice").unwrap(),
            Identity::new("bob").unwrap(),
            text,
        ))
    }

    #[tokio::test]
    async fn records_reach_the_log() {
        let log = Arc::new(MemoryAuditLog::new());
        let metrics = Arc::new(RelayMetrics::default());
        let (sink, handle) = spawn_audit_writer(log.clone(), 8, metrics.clone());

        assert!(sink.submit(record("one")));
        assert!(sink.submit(record("two")));
        drop(sink);
        handle.await.unwrap();

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ciphertext, "one");
        assert_eq!(records[1].ciphertext, "two");
        assert_eq!(metrics.audit_appended.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn failures_are_counted_not_propagated() {
        let metrics = Arc::new(RelayMetrics::default());
        let (sink, handle) = spawn_audit_writer(Arc::new(FailingLog), 8, metrics.clone());

        assert!(sink.submit(record("lost")));
        drop(sink);
        handle.await.unwrap();

        assert_eq!(metrics.audit_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.audit_appended.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let log = Arc::new(StalledLog {
            gate: tokio::sync::Semaphore::new(0),
        });
        let metrics = Arc::new(RelayMetrics::default());
        let (sink, _handle) = spawn_audit_writer(log.clone(), 1, metrics);

        // The writer takes the first record and stalls on it; the second
        // fills the queue; the third has nowhere to go.
        assert!(sink.submit(record("1")));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.submit(record("2")));
        assert!(!sink.submit(record("3")));

        log.gate.add_permits(10);
    }

    #[test]
    fn capture_copies_routing_fields() {
        let r = record("xyz");
        assert_eq!(r.sender.as_str(), "alice");
        assert_eq!(r.recipient.as_str(), "bob");
        assert_eq!(r.ciphertext, "xyz");
        assert!(r.timestamp > 0);
    }
}
