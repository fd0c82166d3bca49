//! Error types for hush-relay.

use std::path::PathBuf;

/// Errors that stop the relay from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Database error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database layer errors (audit log and key directory).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Blind object store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unknown, already consumed, or expired. Deliberately indistinguishable.
    #[error("object not found")]
    NotFound,

    /// The store is full; the upload may be retried later.
    #[error("object store at capacity ({resident} objects, {bytes} bytes)")]
    CapacityExceeded {
        /// Objects resident when the upload was refused.
        resident: usize,
        /// Payload bytes resident when the upload was refused.
        bytes: usize,
    },

    /// Single payload over the configured maximum.
    #[error("object too large: {size} bytes (limit: {limit} bytes)")]
    TooLarge {
        /// Actual size of the payload.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },

    /// Handle could not be generated.
    #[error("handle generation failed: {0}")]
    Handle(#[from] hush_types::TypesError),
}

/// Protocol layer errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Invalid message format.
    #[error("invalid message format: {reason}")]
    InvalidMessage {
        /// Reason the message is invalid.
        reason: String,
    },

    /// Frame type the relay does not accept.
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(&'static str),

    /// Rate limit exceeded.
    #[error("rate limit exceeded: {reason}")]
    RateLimited {
        /// Reason for rate limiting.
        reason: String,
    },

    /// Encoding an outbound frame failed.
    #[error("encoding failed: {0}")]
    Encoding(#[from] hush_types::TypesError),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for blind store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
