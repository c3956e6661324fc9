//! Error types for the engine.
//!
//! Every public operation surfaces a single error carrying the originating
//! stage (for adapter failures) or subsystem (for store failures) together
//! with the underlying cause.

use std::fmt;

use thiserror::Error;
use trellis_adapters::{AdapterError, ProgressStage};
use trellis_stores::StoreError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Backing subsystem a store failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    /// The vector store.
    Vector,
    /// The graph store.
    Graph,
    /// The key/value store.
    KeyValue,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vector => "vector",
            Self::Graph => "graph",
            Self::KeyValue => "key/value",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by public engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid input: empty ids, missing required adapters, malformed
    /// options.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown collection, document, or segment.
    #[error("not found: {0}")]
    NotFound(String),

    /// An adapter failed; `stage` names the pipeline stage.
    #[error("{stage} adapter error: {source}")]
    Adapter {
        stage: ProgressStage,
        #[source]
        source: AdapterError,
    },

    /// A store failed; `subsystem` names the backend.
    #[error("{subsystem} store error: {source}")]
    Store {
        subsystem: Subsystem,
        #[source]
        source: StoreError,
    },

    /// Extraction output that contradicts itself or the pipeline contract.
    #[error("inconsistent extraction: {0}")]
    Inconsistency(String),

    /// Backup archive error.
    #[error("backup error: {0}")]
    Backup(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Mapper tagging an adapter failure with its pipeline stage.
    ///
    /// Cancellation is folded into [`EngineError::Cancelled`] regardless of
    /// the stage it surfaced in.
    pub fn adapter(stage: ProgressStage) -> impl FnOnce(AdapterError) -> Self {
        move |source| match source {
            AdapterError::Cancelled => Self::Cancelled,
            source => Self::Adapter { stage, source },
        }
    }

    /// Mapper tagging a store failure with its subsystem.
    pub fn store(subsystem: Subsystem) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store { subsystem, source }
    }
}
