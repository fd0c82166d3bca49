//! Error types for hush wire types.

use thiserror::Error;

/// Errors that can occur while parsing or encoding wire types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// JSON encoding or decoding failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Identity failed validation
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Object handle is not a well-formed token
    #[error("invalid object handle")]
    InvalidHandle,

    /// OS random number generator failed
    #[error("random source unavailable: {0}")]
    Random(String),
}
