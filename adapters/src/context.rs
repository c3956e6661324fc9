//! Shared operation context for adapter calls.
//!
//! Every adapter invocation receives an [`OpContext`] carrying the progress
//! callback and the cancellation token of the public operation it belongs to.
//! Adapters report into a single typed event stream; the engine decides where
//! the events go.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{AdapterError, Result};

/// Pipeline stage an event originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    /// URL fetching.
    Fetcher,
    /// Source-to-text conversion.
    Converter,
    /// Hierarchical chunking.
    Chunking,
    /// Entity/relationship extraction.
    Extraction,
    /// Dense-vector embedding.
    Embedding,
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetcher => "fetcher",
            Self::Converter => "converter",
            Self::Chunking => "chunking",
            Self::Extraction => "extraction",
            Self::Embedding => "embedding",
        };
        f.write_str(name)
    }
}

/// Lifecycle status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// The stage started.
    Started,
    /// The stage made measurable progress.
    Progress,
    /// The stage finished successfully.
    Completed,
    /// The stage failed.
    Error,
}

/// A single progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Identifier of the operation subject (usually the document id).
    pub id: String,

    /// Stage the event belongs to.
    pub stage: ProgressStage,

    /// Lifecycle status.
    pub status: ProgressStatus,

    /// Fractional progress in `[0.0, 1.0]`, when measurable.
    pub progress: Option<f32>,

    /// Human-readable detail (item counts, error messages).
    pub detail: Option<String>,
}

/// Callback receiving progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Context threaded through every adapter call of one operation.
#[derive(Clone, Default)]
pub struct OpContext {
    /// Progress callback, if the caller wants events.
    progress: Option<ProgressCallback>,

    /// Cancellation handle for the whole operation.
    cancel: CancellationToken,

    /// Subject identifier stamped on every emitted event.
    id: String,
}

impl OpContext {
    /// Create an empty context (no progress reporting, fresh token).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the progress callback.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Set the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set the subject identifier stamped on events.
    pub fn for_subject(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// The cancellation token of this operation.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the operation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast if the operation has been cancelled.
    ///
    /// Adapters call this between units of work so cancellation propagates
    /// promptly into in-flight calls.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }
        Ok(())
    }

    /// Emit a progress event.
    pub fn emit(
        &self,
        stage: ProgressStage,
        status: ProgressStatus,
        progress: Option<f32>,
        detail: Option<String>,
    ) {
        if let Some(callback) = &self.progress {
            callback(ProgressEvent {
                id: self.id.clone(),
                stage,
                status,
                progress,
                detail,
            });
        }
    }

    /// Emit a `Started` event for a stage.
    pub fn started(&self, stage: ProgressStage) {
        self.emit(stage, ProgressStatus::Started, Some(0.0), None);
    }

    /// Emit a `Completed` event for a stage.
    pub fn completed(&self, stage: ProgressStage) {
        self.emit(stage, ProgressStatus::Completed, Some(1.0), None);
    }

    /// Emit an `Error` event carrying the failure message.
    pub fn errored(&self, stage: ProgressStage, message: &str) {
        self.emit(stage, ProgressStatus::Error, None, Some(message.to_string()));
    }
}

impl fmt::Debug for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpContext")
            .field("id", &self.id)
            .field("has_progress", &self.progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
