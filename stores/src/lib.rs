//! # Trellis Stores
//!
//! Store contracts consumed by the trellis retrieval engine, and in-memory
//! reference backends implementing them:
//!
//! - **Vector store**: named collections of `{id, content, vector, payload}`
//!   documents with idempotent upsert and similarity search
//! - **Graph store**: entities and typed relationships with provenance
//!   arrays; the identity authority of the whole system
//! - **Key/value store**: origin texts and per-segment scoring values
//!
//! Canonical-identity derivation lives here too, next to its authority.

pub mod error;
pub mod graph;
pub mod identity;
pub mod kv;
pub mod memory;
pub mod vector;

pub use error::{Result, StoreError};
pub use graph::{GraphNode, GraphRelationship, GraphStore, SavedExtraction};
pub use identity::{
    canonical_entity_id, canonical_relationship_id, merge_unique, remove_values,
};
pub use kv::KvStore;
pub use memory::{MemoryGraphStore, MemoryKvStore, MemoryVectorStore};
pub use vector::{
    Distance, DocumentFilter, ScoredDocument, VectorCollectionConfig, VectorDocument,
    VectorSearchOptions, VectorStore,
};
