//! # Trellis Engine
//!
//! A graph-augmented retrieval engine. Documents are converted to text,
//! split into hierarchical segments, mined for entities and relationships,
//! embedded, and persisted across three coordinated stores:
//!
//! - a **vector store** indexing chunks, entities, and relationships,
//! - a **graph store** holding deduplicated entities and typed
//!   relationships with source-chunk provenance,
//! - an optional **key/value store** for origin texts and per-segment
//!   vote/score/weight values.
//!
//! ## Pipeline
//!
//! ```text
//! source ──► Converter ──► Chunker ──► Extractor ──► Embedder
//!                                          │             │
//!                                          ▼             ▼
//!                                     Graph store   Vector store
//!                                    (identity      (aligned batch
//!                                     authority)     [chunks|entities|rels])
//! ```
//!
//! The graph store owns identity: canonical ids returned by
//! `save_extraction_results` are the only ids that reach the vector store.
//! Deletion inverts ingest by surrendering the document's provenance
//! contributions; shared identities survive while other documents still
//! reference them.

mod backup;
mod collection;
mod deletion;
mod engine;
mod ingest;
mod reextract;
mod search;
mod segments;

pub mod error;
pub mod naming;
pub mod options;
pub mod payload;

pub use collection::CollectionConfig;
pub use engine::{DEFAULT_BATCH_SIZE, Engine, EngineBuilder};
pub use error::{EngineError, Result, Subsystem};
pub use options::{SegmentText, UpsertOptions};
pub use reextract::SegmentGraph;
pub use search::{SearchHit, SearchRequest};
pub use segments::Segment;

// The adapter and store vocabulary is part of the public API.
pub use trellis_adapters::{
    Chunk, ChunkType, Chunker, ChunkingOptions, Converter, Embedder, ExtractionResult, Extractor,
    Fetcher, ProgressCallback, ProgressEvent, ProgressStage, ProgressStatus, Source,
};
pub use trellis_stores::{
    GraphNode, GraphRelationship, GraphStore, KvStore, VectorDocument, VectorStore,
};
