//! Error types for the adapter layer.

use thiserror::Error;

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors that can occur in an adapter call.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The adapter was asked to handle a source it does not support.
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    /// The adapter is missing required configuration (API key, model path).
    #[error("adapter not configured: {0}")]
    NotConfigured(String),

    /// A remote API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// A remote API returned a response the adapter cannot use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The produced output does not line up with the input.
    #[error("output misaligned: expected {expected} items, got {actual}")]
    Misaligned { expected: usize, actual: usize },

    /// The input text is not valid for this adapter.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation was cancelled through its context.
    #[error("operation cancelled")]
    Cancelled,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
