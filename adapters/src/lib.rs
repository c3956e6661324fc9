//! # Trellis Adapters
//!
//! Capability interfaces consumed by the trellis retrieval engine, plus the
//! built-in implementations that work without external services:
//!
//! - **Converter**: opaque source → plain text (`PlainTextConverter`)
//! - **Fetcher**: URL → bytes (`HttpFetcher`)
//! - **Chunker**: text → hierarchical chunk tree (`HierarchicalChunker`)
//! - **Extractor**: texts → entities and relationships (`PatternExtractor`)
//! - **Embedder**: texts → dense vectors (`OpenAiEmbedder`, `HashEmbedder`)
//!
//! Every adapter call receives an [`OpContext`] carrying the operation's
//! progress callback and cancellation token, and reports into one typed
//! event stream.

pub mod chunker;
pub mod context;
pub mod converter;
pub mod embedder;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod source;

pub use chunker::{
    Chunk, ChunkType, Chunker, ChunkingOptions, HierarchicalChunker, MediaPosition, TextPosition,
};
pub use context::{OpContext, ProgressCallback, ProgressEvent, ProgressStage, ProgressStatus};
pub use converter::{Converted, Converter, PlainTextConverter, detect_converter};
pub use embedder::{Embedder, HashEmbedder, OpenAiEmbedder};
pub use error::{AdapterError, Result};
pub use extractor::{
    ExtractedNode, ExtractedRelationship, ExtractionResult, Extractor, PatternExtractor,
    PatternExtractorConfig, suggest_id,
};
pub use fetcher::{Fetched, Fetcher, HttpFetcher};
pub use source::{Source, SourceKind, detect_kind};
