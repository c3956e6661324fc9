//! Vector store contract.
//!
//! A vector store holds named collections of documents, each carrying a
//! dense vector and a JSON metadata payload. The engine treats upsert by id
//! as idempotent and relies on that for retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A document stored in a vector collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    /// Unique identifier within the collection.
    pub id: String,

    /// The raw content that was embedded.
    pub content: String,

    /// Dense embedding vector.
    pub dense_vector: Vec<f32>,

    /// JSON metadata payload.
    pub metadata: Value,
}

impl VectorDocument {
    /// Create a document.
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        dense_vector: Vec<f32>,
        metadata: Value,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            dense_vector,
            metadata,
        }
    }

    /// Read a string field from the metadata payload.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Distance function of a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Dot product.
    Dot,
}

/// Configuration of a vector collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorCollectionConfig {
    /// Dimension of stored vectors.
    pub dimension: usize,

    /// Distance function used by search.
    pub distance: Distance,
}

impl VectorCollectionConfig {
    /// Create a cosine-distance configuration.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            distance: Distance::Cosine,
        }
    }
}

/// Conjunctive filter over documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Match these exact document ids.
    pub ids: Vec<String>,

    /// Match rows whose metadata `doc_id` equals this value.
    pub doc_id: Option<String>,

    /// Match rows whose metadata `document_type` equals this value.
    pub document_type: Option<String>,

    /// Match rows whose metadata `doc_ids` array contains this value.
    ///
    /// Backends without native array-contains filtering may reject this
    /// field; callers then fall back to read-modify-write over listings.
    pub doc_ids_contains: Option<String>,
}

impl DocumentFilter {
    /// Filter by exact ids.
    pub fn by_ids(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Filter by owning document.
    pub fn by_doc_id(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: Some(doc_id.into()),
            ..Self::default()
        }
    }

    /// Restrict to a `document_type`.
    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    /// Restrict to rows whose `doc_ids` array contains the value.
    pub fn with_doc_ids_contains(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_ids_contains = Some(doc_id.into());
        self
    }

    /// Whether a document matches this filter.
    pub fn matches(&self, document: &VectorDocument) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|id| *id == document.id) {
            return false;
        }
        if let Some(doc_id) = &self.doc_id {
            if document.metadata_str("doc_id") != Some(doc_id.as_str()) {
                return false;
            }
        }
        if let Some(document_type) = &self.document_type {
            if document.metadata_str("document_type") != Some(document_type.as_str()) {
                return false;
            }
        }
        if let Some(contained) = &self.doc_ids_contains {
            let contains = document
                .metadata
                .get("doc_ids")
                .and_then(Value::as_array)
                .is_some_and(|array| {
                    array.iter().any(|value| value.as_str() == Some(contained))
                });
            if !contains {
                return false;
            }
        }
        true
    }
}

/// Options for a vector search.
#[derive(Debug, Clone)]
pub struct VectorSearchOptions {
    /// Query vector.
    pub vector: Vec<f32>,

    /// Maximum number of hits.
    pub limit: usize,

    /// Minimum similarity score.
    pub min_score: f32,

    /// Optional metadata filter applied before scoring.
    pub filter: Option<DocumentFilter>,
}

/// A scored search hit.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    /// The matched document.
    pub document: VectorDocument,

    /// Similarity score.
    pub score: f32,
}

/// Contract for vector store backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a collection; succeeds if it already exists with the same
    /// dimension.
    async fn create_collection(&self, name: &str, config: VectorCollectionConfig) -> Result<()>;

    /// Drop a collection and everything in it.
    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Whether the collection exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Names of all collections.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Insert or update documents in batches of `batch_size`.
    ///
    /// With `upsert` false, an existing id is an error. Returns the number
    /// of documents written.
    async fn add_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
        upsert: bool,
        batch_size: usize,
    ) -> Result<usize>;

    /// Fetch documents by id; unknown ids are skipped. With
    /// `include_payload` false the metadata is returned as JSON null.
    async fn get_documents(
        &self,
        collection: &str,
        ids: &[String],
        include_payload: bool,
    ) -> Result<Vec<VectorDocument>>;

    /// List documents matching a filter. With `include_vector` false the
    /// dense vectors are returned empty.
    async fn list_documents(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        include_vector: bool,
        limit: Option<usize>,
    ) -> Result<Vec<VectorDocument>>;

    /// Delete documents matching a filter; returns how many were removed.
    async fn delete_documents(&self, collection: &str, filter: &DocumentFilter) -> Result<usize>;

    /// Similarity search.
    async fn search(
        &self,
        collection: &str,
        options: &VectorSearchOptions,
    ) -> Result<Vec<ScoredDocument>>;

    /// Serialize the collection to an opaque dump.
    async fn backup(&self, collection: &str) -> Result<Vec<u8>>;

    /// Load a dump produced by [`VectorStore::backup`] into the collection,
    /// creating it if needed.
    async fn restore(&self, collection: &str, data: &[u8]) -> Result<()>;
}
