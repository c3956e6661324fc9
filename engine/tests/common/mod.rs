//! Shared helpers for the engine integration suites.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use trellis_adapters::{
    ExtractionResult, Extractor, HashEmbedder, OpContext, PatternExtractor, ProgressEvent,
};
use trellis_engine::{Engine, UpsertOptions};
use trellis_stores::{MemoryGraphStore, MemoryKvStore, MemoryVectorStore};

/// Embedding dimension used across the suites.
pub const DIMENSION: usize = 64;

/// An engine together with direct handles on its backing stores.
pub struct Harness {
    pub engine: Engine,
    pub vector: Arc<MemoryVectorStore>,
    pub graph: Arc<MemoryGraphStore>,
    pub kv: Arc<MemoryKvStore>,
}

/// Engine over all three stores, with the hash embedder and the pattern
/// extractor as defaults.
pub fn harness() -> Harness {
    let vector = Arc::new(MemoryVectorStore::new());
    let graph = Arc::new(MemoryGraphStore::new());
    let kv = Arc::new(MemoryKvStore::new());

    let engine = Engine::builder(vector.clone())
        .with_graph_store(graph.clone())
        .with_kv_store(kv.clone())
        .with_embedder(Arc::new(HashEmbedder::new(DIMENSION)))
        .with_extractor(Arc::new(PatternExtractor::new()))
        .build();

    Harness {
        engine,
        vector,
        graph,
        kv,
    }
}

/// Engine with only a vector store configured.
pub fn vector_only_harness() -> Harness {
    let vector = Arc::new(MemoryVectorStore::new());
    let engine = Engine::builder(vector.clone())
        .with_embedder(Arc::new(HashEmbedder::new(DIMENSION)))
        .build();

    Harness {
        engine,
        vector,
        graph: Arc::new(MemoryGraphStore::new()),
        kv: Arc::new(MemoryKvStore::new()),
    }
}

/// Options targeting a collection.
pub fn options(collection_id: &str) -> UpsertOptions {
    UpsertOptions::new().with_collection(collection_id)
}

/// An extractor scripted to return fixed results regardless of input.
pub struct ScriptedExtractor {
    results: Vec<ExtractionResult>,
}

impl ScriptedExtractor {
    pub fn new(results: Vec<ExtractionResult>) -> Self {
        Self { results }
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract(
        &self,
        texts: &[String],
        _ctx: &OpContext,
    ) -> trellis_adapters::Result<Vec<ExtractionResult>> {
        Ok(texts
            .iter()
            .enumerate()
            .map(|(i, _)| self.results.get(i).cloned().unwrap_or_default())
            .collect())
    }
}

/// Collects progress events across threads.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> trellis_adapters::ProgressCallback {
        let events = self.events.clone();
        Arc::new(move |event| {
            events.lock().unwrap().push(event);
        })
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}
