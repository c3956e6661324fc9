//! The engine facade.
//!
//! [`Engine`] coordinates the three stores and the default adapters. It is
//! cheap to clone and safe to share; all state lives in the stores.

use std::sync::Arc;

use tracing::info;

use trellis_adapters::{
    Chunker, Embedder, Extractor, Fetcher, HierarchicalChunker, HttpFetcher, OpContext,
    PatternExtractor,
};
use trellis_stores::{GraphStore, KvStore, VectorCollectionConfig, VectorStore};

use crate::error::{EngineError, Result, Subsystem};
use crate::naming::CollectionNames;
use crate::options::UpsertOptions;

/// Default vector upsert batch size.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// The graph-augmented retrieval engine.
#[derive(Clone)]
pub struct Engine {
    pub(crate) vector: Arc<dyn VectorStore>,
    pub(crate) graph: Option<Arc<dyn GraphStore>>,
    pub(crate) kv: Option<Arc<dyn KvStore>>,
    pub(crate) default_chunker: Arc<dyn Chunker>,
    pub(crate) default_embedder: Option<Arc<dyn Embedder>>,
    pub(crate) default_extractor: Option<Arc<dyn Extractor>>,
    pub(crate) default_fetcher: Arc<dyn Fetcher>,
    pub(crate) batch_size: usize,
}

impl Engine {
    /// Start building an engine over a vector store.
    pub fn builder(vector: Arc<dyn VectorStore>) -> EngineBuilder {
        EngineBuilder::new(vector)
    }

    /// Whether a graph store is configured.
    pub fn has_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// Whether a key/value store is configured.
    pub fn has_kv(&self) -> bool {
        self.kv.is_some()
    }

    /// Build the operation context for a subject from the options.
    pub(crate) fn op_context(&self, subject: &str, options: &UpsertOptions) -> OpContext {
        let mut ctx = OpContext::new()
            .for_subject(subject)
            .with_cancel(options.cancel.clone());
        if let Some(progress) = &options.progress {
            ctx = ctx.with_progress(progress.clone());
        }
        ctx
    }

    /// Resolve the embedder: option, then engine default. Always required.
    pub(crate) fn resolve_embedder(&self, options: &UpsertOptions) -> Result<Arc<dyn Embedder>> {
        options
            .embedder
            .clone()
            .or_else(|| self.default_embedder.clone())
            .ok_or_else(|| EngineError::Validation("an embedder is required".to_string()))
    }

    /// Resolve the extractor when a graph store is configured.
    ///
    /// With `auto` true (ingest path) a missing extractor falls back to the
    /// built-in pattern extractor; with `auto` false (segment paths) it is a
    /// validation error. Without a graph store the result is always `None` —
    /// auto-detection never fabricates a graph extractor.
    pub(crate) fn resolve_extractor(
        &self,
        options: &UpsertOptions,
        auto: bool,
    ) -> Result<Option<Arc<dyn Extractor>>> {
        if self.graph.is_none() {
            return Ok(None);
        }
        if let Some(extractor) = options
            .extractor
            .clone()
            .or_else(|| self.default_extractor.clone())
        {
            return Ok(Some(extractor));
        }
        if auto {
            Ok(Some(Arc::new(PatternExtractor::new())))
        } else {
            Err(EngineError::Validation(
                "an extractor is required when a graph store is configured".to_string(),
            ))
        }
    }

    /// Resolve the chunker: option, then engine default.
    pub(crate) fn resolve_chunker(&self, options: &UpsertOptions) -> Arc<dyn Chunker> {
        options
            .chunker
            .clone()
            .unwrap_or_else(|| self.default_chunker.clone())
    }

    /// Resolve the fetcher: option, then engine default.
    pub(crate) fn resolve_fetcher(&self, options: &UpsertOptions) -> Arc<dyn Fetcher> {
        options
            .fetcher
            .clone()
            .unwrap_or_else(|| self.default_fetcher.clone())
    }

    /// Make sure the backing vector collection and graph exist.
    pub(crate) async fn ensure_backing(
        &self,
        names: &CollectionNames,
        dimension: usize,
    ) -> Result<()> {
        if !self
            .vector
            .collection_exists(&names.vector)
            .await
            .map_err(EngineError::store(Subsystem::Vector))?
        {
            info!("creating vector collection {}", names.vector);
            self.vector
                .create_collection(&names.vector, VectorCollectionConfig::new(dimension))
                .await
                .map_err(EngineError::store(Subsystem::Vector))?;
        }

        if let Some(graph) = &self.graph {
            if !graph
                .graph_exists(&names.graph)
                .await
                .map_err(EngineError::store(Subsystem::Graph))?
            {
                info!("creating graph {}", names.graph);
                graph
                    .create_graph(&names.graph)
                    .await
                    .map_err(EngineError::store(Subsystem::Graph))?;
            }
        }

        Ok(())
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    vector: Arc<dyn VectorStore>,
    graph: Option<Arc<dyn GraphStore>>,
    kv: Option<Arc<dyn KvStore>>,
    chunker: Arc<dyn Chunker>,
    embedder: Option<Arc<dyn Embedder>>,
    extractor: Option<Arc<dyn Extractor>>,
    fetcher: Arc<dyn Fetcher>,
    batch_size: usize,
}

impl EngineBuilder {
    /// Create a builder over a vector store.
    pub fn new(vector: Arc<dyn VectorStore>) -> Self {
        Self {
            vector,
            graph: None,
            kv: None,
            chunker: Arc::new(HierarchicalChunker::new()),
            embedder: None,
            extractor: None,
            fetcher: Arc::new(HttpFetcher::new()),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Attach a graph store.
    pub fn with_graph_store(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Attach a key/value store.
    pub fn with_kv_store(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Set the default chunker.
    pub fn with_chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// Set the default embedder.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the default extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the default fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Set the vector upsert batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Build the engine.
    pub fn build(self) -> Engine {
        Engine {
            vector: self.vector,
            graph: self.graph,
            kv: self.kv,
            default_chunker: self.chunker,
            default_embedder: self.embedder,
            default_extractor: self.extractor,
            default_fetcher: self.fetcher,
            batch_size: self.batch_size,
        }
    }
}
