//! Options for upsert-style operations.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use trellis_adapters::{
    Chunker, ChunkingOptions, Converter, Embedder, Extractor, Fetcher, ProgressCallback,
};

use crate::naming::DEFAULT_COLLECTION;

/// Options recognized by `add_*`, segment, and re-extract operations.
///
/// Adapters resolve in this order: explicit option, engine default, then
/// (for the converter only) source-type auto-detection.
#[derive(Clone)]
pub struct UpsertOptions {
    /// Document id; generated from the collection when absent.
    pub doc_id: Option<String>,

    /// Target collection.
    pub collection_id: String,

    /// User metadata merged into every chunk/entity/relationship payload,
    /// with the lowest precedence.
    pub user_metadata: Map<String, Value>,

    /// Converter override.
    pub converter: Option<Arc<dyn Converter>>,

    /// Chunker override.
    pub chunker: Option<Arc<dyn Chunker>>,

    /// Embedder override.
    pub embedder: Option<Arc<dyn Embedder>>,

    /// Extractor override.
    pub extractor: Option<Arc<dyn Extractor>>,

    /// Fetcher override (URL sources).
    pub fetcher: Option<Arc<dyn Fetcher>>,

    /// Chunking behavior.
    pub chunking: ChunkingOptions,

    /// Progress callback receiving the operation's event stream.
    pub progress: Option<ProgressCallback>,

    /// Cancellation handle; cancelling aborts in-flight adapter calls.
    pub cancel: CancellationToken,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            doc_id: None,
            collection_id: DEFAULT_COLLECTION.to_string(),
            user_metadata: Map::new(),
            converter: None,
            chunker: None,
            embedder: None,
            extractor: None,
            fetcher: None,
            chunking: ChunkingOptions::default(),
            progress: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl UpsertOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a collection.
    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = collection_id.into();
        self
    }

    /// Fix the document id instead of generating one.
    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    /// Attach user metadata.
    pub fn with_user_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.user_metadata = metadata;
        self
    }

    /// Override the converter.
    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Override the chunker.
    pub fn with_chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Override the embedder.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Override the extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Override the fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Set chunking behavior.
    pub fn with_chunking(mut self, chunking: ChunkingOptions) -> Self {
        self.chunking = chunking;
        self
    }

    /// Receive progress events.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Use an external cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl fmt::Debug for UpsertOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpsertOptions")
            .field("doc_id", &self.doc_id)
            .field("collection_id", &self.collection_id)
            .field("user_metadata_keys", &self.user_metadata.len())
            .field("has_converter", &self.converter.is_some())
            .field("has_chunker", &self.chunker.is_some())
            .field("has_embedder", &self.embedder.is_some())
            .field("has_extractor", &self.extractor.is_some())
            .field("has_fetcher", &self.fetcher.is_some())
            .field("chunking", &self.chunking)
            .finish()
    }
}

/// A hand-authored segment for `add_segments` / `update_segments`.
#[derive(Debug, Clone, Default)]
pub struct SegmentText {
    /// Segment id; required by `update_segments`, optional otherwise.
    pub id: Option<String>,

    /// Segment text.
    pub text: String,
}

impl SegmentText {
    /// Create a segment with a generated id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
        }
    }

    /// Create a segment with a fixed id.
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: text.into(),
        }
    }
}
