//! In-memory vector store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::vector::{
    Distance, DocumentFilter, ScoredDocument, VectorCollectionConfig, VectorDocument,
    VectorSearchOptions, VectorStore,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Collection {
    config: VectorCollectionConfig,
    documents: BTreeMap<String, VectorDocument>,
}

/// Exhaustive-scan vector store held in memory.
#[derive(Clone, Default)]
pub struct MemoryVectorStore {
    inner: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryVectorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn score(query: &[f32], candidate: &[f32], distance: Distance) -> f32 {
    if query.len() != candidate.len() {
        return f32::MIN;
    }
    let dot: f32 = query.iter().zip(candidate.iter()).map(|(a, b)| a * b).sum();
    match distance {
        Distance::Dot => dot,
        Distance::Cosine => {
            let magnitude_q: f32 = query.iter().map(|x| x * x).sum::<f32>().sqrt();
            let magnitude_c: f32 = candidate.iter().map(|x| x * x).sum::<f32>().sqrt();
            if magnitude_q == 0.0 || magnitude_c == 0.0 {
                0.0
            } else {
                dot / (magnitude_q * magnitude_c)
            }
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn create_collection(&self, name: &str, config: VectorCollectionConfig) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.get(name) {
            if existing.config.dimension != config.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: existing.config.dimension,
                    actual: config.dimension,
                });
            }
            return Ok(());
        }
        debug!("creating vector collection {name} (dim {})", config.dimension);
        inner.insert(
            name.to_string(),
            Collection {
                config,
                documents: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.inner.write().await.remove(name);
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.inner.read().await.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.inner.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn add_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
        upsert: bool,
        batch_size: usize,
    ) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let target = inner
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let mut written = 0usize;
        for batch in documents.chunks(batch_size.max(1)) {
            for document in batch {
                if !document.dense_vector.is_empty()
                    && document.dense_vector.len() != target.config.dimension
                {
                    return Err(StoreError::DimensionMismatch {
                        expected: target.config.dimension,
                        actual: document.dense_vector.len(),
                    });
                }
                if !upsert && target.documents.contains_key(&document.id) {
                    return Err(StoreError::AlreadyExists(document.id.clone()));
                }
                target.documents.insert(document.id.clone(), document.clone());
                written += 1;
            }
            debug!("upserted batch of {} into {collection}", batch.len());
        }
        Ok(written)
    }

    async fn get_documents(
        &self,
        collection: &str,
        ids: &[String],
        include_payload: bool,
    ) -> Result<Vec<VectorDocument>> {
        let inner = self.inner.read().await;
        let target = inner
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        Ok(ids
            .iter()
            .filter_map(|id| target.documents.get(id))
            .map(|document| {
                let mut document = document.clone();
                if !include_payload {
                    document.metadata = serde_json::Value::Null;
                }
                document
            })
            .collect())
    }

    async fn list_documents(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        include_vector: bool,
        limit: Option<usize>,
    ) -> Result<Vec<VectorDocument>> {
        let inner = self.inner.read().await;
        let target = inner
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let mut results = Vec::new();
        for document in target.documents.values() {
            if !filter.matches(document) {
                continue;
            }
            let mut document = document.clone();
            if !include_vector {
                document.dense_vector = Vec::new();
            }
            results.push(document);
            if limit.is_some_and(|limit| results.len() >= limit) {
                break;
            }
        }
        Ok(results)
    }

    async fn delete_documents(&self, collection: &str, filter: &DocumentFilter) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let target = inner
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let before = target.documents.len();
        target.documents.retain(|_, document| !filter.matches(document));
        Ok(before - target.documents.len())
    }

    async fn search(
        &self,
        collection: &str,
        options: &VectorSearchOptions,
    ) -> Result<Vec<ScoredDocument>> {
        let inner = self.inner.read().await;
        let target = inner
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        if options.vector.len() != target.config.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: target.config.dimension,
                actual: options.vector.len(),
            });
        }

        let mut scored: Vec<(OrderedFloat<f32>, &VectorDocument)> = target
            .documents
            .values()
            .filter(|document| {
                options
                    .filter
                    .as_ref()
                    .is_none_or(|filter| filter.matches(document))
            })
            .map(|document| {
                let score = score(&options.vector, &document.dense_vector, target.config.distance);
                (OrderedFloat(score), document)
            })
            .filter(|(score, _)| score.0 >= options.min_score)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(options.limit)
            .map(|(score, document)| ScoredDocument {
                document: document.clone(),
                score: score.0,
            })
            .collect())
    }

    async fn backup(&self, collection: &str) -> Result<Vec<u8>> {
        let inner = self.inner.read().await;
        let target = inner
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(serde_json::to_vec(target)?)
    }

    async fn restore(&self, collection: &str, data: &[u8]) -> Result<()> {
        let parsed: Collection = serde_json::from_slice(data)
            .map_err(|e| StoreError::InvalidDump(format!("vector dump: {e}")))?;
        self.inner.write().await.insert(collection.to_string(), parsed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(id: &str, vector: Vec<f32>, metadata: serde_json::Value) -> VectorDocument {
        VectorDocument::new(id, format!("content of {id}"), vector, metadata)
    }

    async fn store_with_collection() -> MemoryVectorStore {
        let store = MemoryVectorStore::new();
        store
            .create_collection("c1", VectorCollectionConfig::new(2))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = store_with_collection().await;
        let document = doc("a", vec![1.0, 0.0], json!({"doc_id": "d1"}));

        store
            .add_documents("c1", vec![document.clone()], true, 100)
            .await
            .unwrap();
        store
            .add_documents("c1", vec![document], true, 100)
            .await
            .unwrap();

        let all = store
            .list_documents("c1", &DocumentFilter::default(), false, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_conflict_without_upsert() {
        let store = store_with_collection().await;
        let document = doc("a", vec![1.0, 0.0], json!({}));

        store
            .add_documents("c1", vec![document.clone()], false, 100)
            .await
            .unwrap();
        let result = store.add_documents("c1", vec![document], false, 100).await;

        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_filter_doc_ids_contains() {
        let store = store_with_collection().await;
        store
            .add_documents(
                "c1",
                vec![
                    doc("e1", vec![1.0, 0.0], json!({"doc_ids": ["d1", "d2"]})),
                    doc("e2", vec![0.0, 1.0], json!({"doc_ids": ["d2"]})),
                ],
                true,
                100,
            )
            .await
            .unwrap();

        let hits = store
            .list_documents(
                "c1",
                &DocumentFilter::default().with_doc_ids_contains("d1"),
                false,
                None,
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "e1");
    }

    #[tokio::test]
    async fn test_search_ranks_by_cosine() {
        let store = store_with_collection().await;
        store
            .add_documents(
                "c1",
                vec![
                    doc("a", vec![1.0, 0.0], json!({})),
                    doc("b", vec![0.0, 1.0], json!({})),
                    doc("c", vec![0.7, 0.7], json!({})),
                ],
                true,
                100,
            )
            .await
            .unwrap();

        let hits = store
            .search(
                "c1",
                &VectorSearchOptions {
                    vector: vec![1.0, 0.0],
                    limit: 2,
                    min_score: 0.0,
                    filter: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.id, "a");
        assert_eq!(hits[1].document.id, "c");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = store_with_collection().await;
        let result = store
            .add_documents("c1", vec![doc("a", vec![1.0, 0.0, 0.0], json!({}))], true, 100)
            .await;

        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_backup_restore_round_trip() {
        let store = store_with_collection().await;
        store
            .add_documents("c1", vec![doc("a", vec![1.0, 0.0], json!({"k": "v"}))], true, 100)
            .await
            .unwrap();

        let dump = store.backup("c1").await.unwrap();

        let other = MemoryVectorStore::new();
        other.restore("c2", &dump).await.unwrap();

        let restored = other
            .get_documents("c2", &["a".to_string()], true)
            .await
            .unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].metadata, json!({"k": "v"}));
    }
}
