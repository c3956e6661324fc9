//! Search delegation.
//!
//! Search is a boundary contract: the engine embeds the query and hands it
//! to the vector store, or forwards a text query to the graph store. Ranking
//! beyond the stores' own scores is out of scope.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;

use trellis_adapters::{Embedder, OpContext, ProgressStage};
use trellis_stores::{
    DocumentFilter, GraphNode, GraphStore, VectorSearchOptions, VectorStore,
};

use crate::engine::Engine;
use crate::error::{EngineError, Result, Subsystem};
use crate::naming;

/// A vector search request.
#[derive(Clone)]
pub struct SearchRequest {
    /// Collection to search.
    pub collection_id: String,

    /// Query text.
    pub query: String,

    /// Maximum number of hits.
    pub limit: usize,

    /// Minimum similarity score.
    pub min_score: f32,

    /// Restrict hits to a `document_type` ("chunk", "entity",
    /// "relationship").
    pub document_type: Option<String>,

    /// Restrict hits to one document.
    pub doc_id: Option<String>,

    /// Embedder override for the query text.
    pub embedder: Option<Arc<dyn Embedder>>,
}

impl SearchRequest {
    /// Create a request with a limit of 10 and no score floor.
    pub fn new(collection_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            query: query.into(),
            limit: 10,
            min_score: 0.0,
            document_type: None,
            doc_id: None,
            embedder: None,
        }
    }

    /// Set the hit limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the score floor.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Restrict to a document type.
    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    /// Restrict to one document.
    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    /// Override the query embedder.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Row id.
    pub id: String,

    /// Similarity score.
    pub score: f32,

    /// Row content.
    pub content: String,

    /// Row payload.
    pub metadata: Value,
}

impl Engine {
    /// Dense search over a collection.
    pub async fn search_vector(&self, request: SearchRequest) -> Result<Vec<SearchHit>> {
        let embedder = request
            .embedder
            .clone()
            .or_else(|| self.default_embedder.clone())
            .ok_or_else(|| EngineError::Validation("an embedder is required".to_string()))?;

        let names = naming::names(&request.collection_id);
        let ctx = OpContext::new().for_subject(&request.collection_id);
        let vectors = embedder
            .embed(&[request.query.clone()], &ctx)
            .await
            .map_err(EngineError::adapter(ProgressStage::Embedding))?;
        let vector = vectors.into_iter().next().ok_or_else(|| {
            EngineError::Inconsistency("embedder returned no vector for the query".to_string())
        })?;

        let mut filter = DocumentFilter::default();
        if let Some(document_type) = &request.document_type {
            filter = filter.with_document_type(document_type.clone());
        }
        if let Some(doc_id) = &request.doc_id {
            filter.doc_id = Some(doc_id.clone());
        }
        let has_filter = filter.document_type.is_some() || filter.doc_id.is_some();

        let hits = self
            .vector
            .search(
                &names.vector,
                &VectorSearchOptions {
                    vector,
                    limit: request.limit,
                    min_score: request.min_score,
                    filter: has_filter.then_some(filter),
                },
            )
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;

        Ok(hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.document.id,
                score: hit.score,
                content: hit.document.content,
                metadata: hit.document.metadata,
            })
            .collect())
    }

    /// Text search over graph nodes.
    pub async fn search_graph(
        &self,
        collection_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<GraphNode>> {
        let graph = self.graph.as_ref().ok_or_else(|| {
            EngineError::Validation("no graph store configured".to_string())
        })?;
        let names = naming::names(collection_id);
        graph
            .search_nodes(&names.graph, query, limit)
            .await
            .map_err(EngineError::store(Subsystem::Graph))
    }

    /// Run several vector searches concurrently, one result list per
    /// request, in request order.
    pub async fn multi_search(
        &self,
        requests: Vec<SearchRequest>,
    ) -> Result<Vec<Vec<SearchHit>>> {
        try_join_all(requests.into_iter().map(|request| self.search_vector(request))).await
    }
}
