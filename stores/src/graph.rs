//! Graph store contract.
//!
//! The graph store holds entities and typed relationships with provenance
//! arrays, and is the sole authority on their identity: every save returns
//! the canonical ids it decided to use, and callers must rewrite their own
//! references with them before touching any other store.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An entity node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Identifier. On input to a save this is a suggestion; on output it is
    /// canonical (`name[_type]`).
    pub id: String,

    /// Entity name.
    pub name: String,

    /// Entity type; may be empty.
    pub node_type: String,

    /// Entity description.
    pub description: String,

    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f32,

    /// Documents whose ingests currently reference this entity.
    pub source_documents: Vec<String>,

    /// Chunks whose extractions currently reference this entity.
    pub source_chunks: Vec<String>,
}

/// A typed relationship edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRelationship {
    /// Identifier. On input a suggestion; on output canonical
    /// (`start_TYPE_end`).
    pub id: String,

    /// Canonical (or suggested) id of the start entity.
    pub start: String,

    /// Canonical (or suggested) id of the end entity.
    pub end: String,

    /// Relationship type.
    pub rel_type: String,

    /// Relationship description.
    pub description: String,

    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f32,

    /// Optional strength weight.
    pub weight: Option<f32>,

    /// Documents whose ingests currently reference this relationship.
    pub source_documents: Vec<String>,

    /// Chunks whose extractions currently reference this relationship.
    pub source_chunks: Vec<String>,
}

/// Outcome of [`GraphStore::save_extraction_results`].
#[derive(Debug, Clone, Default)]
pub struct SavedExtraction {
    /// Canonical entities after the merge, including provenance accumulated
    /// from earlier ingests.
    pub entities: Vec<GraphNode>,

    /// Canonical relationships after the merge.
    pub relationships: Vec<GraphRelationship>,

    /// Map from every input entity id to its canonical id.
    pub entity_ids: HashMap<String, String>,

    /// Map from every input relationship id to its canonical id.
    pub relationship_ids: HashMap<String, String>,
}

impl SavedExtraction {
    /// Canonical id for an input entity id, if the save produced one.
    pub fn entity_id(&self, input: &str) -> Option<&str> {
        self.entity_ids.get(input).map(String::as_str)
    }

    /// Canonical id for an input relationship id, if the save produced one.
    pub fn relationship_id(&self, input: &str) -> Option<&str> {
        self.relationship_ids.get(input).map(String::as_str)
    }
}

/// Contract for graph store backends.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create a graph; succeeds if it already exists.
    async fn create_graph(&self, graph: &str) -> Result<()>;

    /// Drop a graph and everything in it.
    async fn drop_graph(&self, graph: &str) -> Result<()>;

    /// Whether the graph exists.
    async fn graph_exists(&self, graph: &str) -> Result<bool>;

    /// Whether the backend is reachable.
    async fn is_connected(&self) -> bool;

    /// Identity-based upsert of provenance-stamped extraction output.
    ///
    /// Nodes are keyed by `(name, type)` and relationships by
    /// `(start, type, end)` after start/end remapping; provenance arrays are
    /// merged with set semantics. The returned mapping covers every input id.
    async fn save_extraction_results(
        &self,
        graph: &str,
        nodes: Vec<GraphNode>,
        relationships: Vec<GraphRelationship>,
    ) -> Result<SavedExtraction>;

    /// Upsert nodes by their (already canonical) id.
    async fn add_nodes(&self, graph: &str, nodes: Vec<GraphNode>) -> Result<()>;

    /// Upsert relationships by their (already canonical) id.
    async fn add_relationships(
        &self,
        graph: &str,
        relationships: Vec<GraphRelationship>,
    ) -> Result<()>;

    /// Fetch nodes by id; unknown ids are skipped.
    async fn get_nodes(&self, graph: &str, ids: &[String]) -> Result<Vec<GraphNode>>;

    /// Fetch relationships by id; unknown ids are skipped.
    async fn get_relationships(&self, graph: &str, ids: &[String])
    -> Result<Vec<GraphRelationship>>;

    /// Nodes whose `source_documents` contains the document.
    async fn nodes_by_document(&self, graph: &str, doc_id: &str) -> Result<Vec<GraphNode>>;

    /// Relationships whose `source_documents` contains the document.
    async fn relationships_by_document(
        &self,
        graph: &str,
        doc_id: &str,
    ) -> Result<Vec<GraphRelationship>>;

    /// Nodes whose `source_chunks` intersects the given chunk ids.
    async fn nodes_by_chunks(&self, graph: &str, chunk_ids: &[String]) -> Result<Vec<GraphNode>>;

    /// Relationships whose `source_chunks` intersects the given chunk ids.
    async fn relationships_by_chunks(
        &self,
        graph: &str,
        chunk_ids: &[String],
    ) -> Result<Vec<GraphRelationship>>;

    /// Delete nodes by id; with `delete_relationships` true, incident edges
    /// are removed as well. Returns the number of nodes removed.
    async fn delete_nodes(
        &self,
        graph: &str,
        ids: &[String],
        delete_relationships: bool,
    ) -> Result<usize>;

    /// Delete relationships by id; returns how many were removed.
    async fn delete_relationships(&self, graph: &str, ids: &[String]) -> Result<usize>;

    /// Substring search over node names and descriptions.
    async fn search_nodes(&self, graph: &str, query: &str, limit: usize)
    -> Result<Vec<GraphNode>>;

    /// Serialize the graph to an opaque dump.
    async fn backup(&self, graph: &str) -> Result<Vec<u8>>;

    /// Load a dump produced by [`GraphStore::backup`], creating the graph if
    /// needed.
    async fn restore(&self, graph: &str, data: &[u8]) -> Result<()>;
}
