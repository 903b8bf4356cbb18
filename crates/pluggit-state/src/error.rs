//! Error types for pluggit-state

use thiserror::Error;

/// Errors that can occur in the feed persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// The connection target is not a valid connection descriptor
    #[error("Malformed connection target {target:?}: {reason}")]
    MalformedTarget { target: String, reason: String },

    /// Backend unreachable, authentication failed, or namespace selection failed
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Per-call storage I/O failure
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// A backend call did not finish within the configured bound
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Raw input that is neither a post nor a reply
    #[error("Unsupported item: {0}")]
    UnsupportedItem(String),

    /// Empty or blank feed name
    #[error("Invalid feed name: {0:?}")]
    InvalidFeedName(String),

    /// Unparseable configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The backend was already closed
    #[error("Store is closed")]
    Closed,
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}
