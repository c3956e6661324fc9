//! Collection lifecycle.
//!
//! A collection is a logical namespace mapping to one vector collection, one
//! graph, and a key prefix in the key/value store. Removing a collection
//! removes all derived artifacts across the three stores.

use serde_json::{Map, Value};
use tracing::{info, warn};

use trellis_stores::{Distance, GraphStore, KvStore, VectorCollectionConfig, VectorStore};

use crate::engine::Engine;
use crate::error::{EngineError, Result, Subsystem};
use crate::naming;

/// Configuration for creating a collection.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Collection id; must not contain the doc-id delimiter.
    pub id: String,

    /// Arbitrary collection metadata, persisted in the key/value store when
    /// one is configured.
    pub metadata: Map<String, Value>,

    /// Vector dimension of the backing collection.
    pub dimension: usize,

    /// Distance function of the backing collection.
    pub distance: Distance,

    /// Whether to create a graph for this collection; ignored when the
    /// engine has no graph store.
    pub graph: bool,
}

impl CollectionConfig {
    /// Create a configuration with cosine distance and a graph.
    pub fn new(id: impl Into<String>, dimension: usize) -> Self {
        Self {
            id: id.into(),
            metadata: Map::new(),
            dimension,
            distance: Distance::Cosine,
            graph: true,
        }
    }

    /// Attach collection metadata.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Disable the graph for this collection.
    pub fn without_graph(mut self) -> Self {
        self.graph = false;
        self
    }
}

impl Engine {
    /// Create a collection across the configured stores.
    pub async fn create_collection(&self, config: CollectionConfig) -> Result<()> {
        naming::validate_collection_id(&config.id)?;
        let names = naming::names(&config.id);

        self.vector
            .create_collection(
                &names.vector,
                VectorCollectionConfig {
                    dimension: config.dimension,
                    distance: config.distance,
                },
            )
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;

        if config.graph {
            if let Some(graph) = &self.graph {
                graph
                    .create_graph(&names.graph)
                    .await
                    .map_err(EngineError::store(Subsystem::Graph))?;
            }
        }

        if let Some(kv) = &self.kv {
            let metadata = serde_json::to_string(&config.metadata)?;
            kv.set(&naming::collection_key(&config.id), &metadata)
                .await
                .map_err(EngineError::store(Subsystem::KeyValue))?;
        }

        info!("created collection {}", config.id);
        Ok(())
    }

    /// Remove a collection and every derived artifact.
    ///
    /// Store failures are logged and do not stop the cleanup of the other
    /// subsystems.
    pub async fn remove_collection(&self, collection_id: &str) -> Result<()> {
        naming::validate_collection_id(collection_id)?;
        let names = naming::names(collection_id);

        if let Err(e) = self.vector.drop_collection(&names.vector).await {
            warn!("dropping vector collection {} failed: {e}", names.vector);
        }

        if let Some(graph) = &self.graph {
            if let Err(e) = graph.drop_graph(&names.graph).await {
                warn!("dropping graph {} failed: {e}", names.graph);
            }
        }

        if let Some(kv) = &self.kv {
            if let Err(e) = kv.delete(&naming::collection_key(collection_id)).await {
                warn!("deleting collection metadata key failed: {e}");
            }
            for prefix in naming::collection_prefixes(collection_id) {
                if let Err(e) = kv.delete_prefix(&prefix).await {
                    warn!("deleting keys under {prefix} failed: {e}");
                }
            }
        }

        info!("removed collection {collection_id}");
        Ok(())
    }

    /// Whether the collection exists in the vector store.
    pub async fn collection_exists(&self, collection_id: &str) -> Result<bool> {
        let names = naming::names(collection_id);
        self.vector
            .collection_exists(&names.vector)
            .await
            .map_err(EngineError::store(Subsystem::Vector))
    }

    /// List collections, optionally filtered by a substring.
    pub async fn get_collections(&self, filter: Option<&str>) -> Result<Vec<String>> {
        let mut collections = self
            .vector
            .list_collections()
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;

        if let Some(filter) = filter {
            collections.retain(|name| name.contains(filter));
        }
        Ok(collections)
    }

    /// Metadata stored for a collection, when a key/value store holds it.
    pub async fn collection_metadata(
        &self,
        collection_id: &str,
    ) -> Result<Option<Map<String, Value>>> {
        let Some(kv) = &self.kv else {
            return Ok(None);
        };
        let raw = kv
            .get(&naming::collection_key(collection_id))
            .await
            .map_err(EngineError::store(Subsystem::KeyValue))?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trellis_stores::{MemoryGraphStore, MemoryKvStore, MemoryVectorStore};

    fn engine() -> Engine {
        Engine::builder(Arc::new(MemoryVectorStore::new()))
            .with_graph_store(Arc::new(MemoryGraphStore::new()))
            .with_kv_store(Arc::new(MemoryKvStore::new()))
            .build()
    }

    #[tokio::test]
    async fn test_create_and_list_collections() {
        let engine = engine();

        engine
            .create_collection(CollectionConfig::new("c1", 8))
            .await
            .unwrap();
        engine
            .create_collection(CollectionConfig::new("docs", 8))
            .await
            .unwrap();

        assert!(engine.collection_exists("c1").await.unwrap());
        assert_eq!(
            engine.get_collections(Some("doc")).await.unwrap(),
            vec!["docs"]
        );
    }

    #[tokio::test]
    async fn test_remove_collection() {
        let engine = engine();
        engine
            .create_collection(CollectionConfig::new("c1", 8))
            .await
            .unwrap();

        engine.remove_collection("c1").await.unwrap();

        assert!(!engine.collection_exists("c1").await.unwrap());
        assert!(engine.collection_metadata("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_collection_id_rejected() {
        let engine = engine();
        let result = engine
            .create_collection(CollectionConfig::new("bad_id", 8))
            .await;

        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_collection_metadata_round_trip() {
        let engine = engine();
        let mut metadata = Map::new();
        metadata.insert("owner".to_string(), Value::from("tests"));

        engine
            .create_collection(CollectionConfig::new("c1", 8).with_metadata(metadata))
            .await
            .unwrap();

        let loaded = engine.collection_metadata("c1").await.unwrap().unwrap();
        assert_eq!(loaded["owner"], "tests");
    }
}
