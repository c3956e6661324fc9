//! Error types for the store contracts.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in a store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The named collection or graph does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// A document, node, or key was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A vector had the wrong dimension for its collection.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The item already exists and upsert was not requested.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The backend rejected the request.
    #[error("backend error: {0}")]
    Backend(String),

    /// A backup or restore payload could not be used.
    #[error("invalid dump: {0}")]
    InvalidDump(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
