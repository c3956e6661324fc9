//! In-memory graph store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::graph::{GraphNode, GraphRelationship, GraphStore, SavedExtraction};
use crate::identity::{canonical_entity_id, canonical_relationship_id, merge_unique};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphData {
    nodes: BTreeMap<String, GraphNode>,
    relationships: BTreeMap<String, GraphRelationship>,
}

/// Reference graph backend with identity-based dedup.
#[derive(Clone, Default)]
pub struct MemoryGraphStore {
    inner: Arc<RwLock<HashMap<String, GraphData>>>,
}

impl MemoryGraphStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn merge_node(existing: &mut GraphNode, incoming: &GraphNode) {
    merge_unique(&mut existing.source_documents, &incoming.source_documents);
    merge_unique(&mut existing.source_chunks, &incoming.source_chunks);
    existing.confidence = existing.confidence.max(incoming.confidence);
    if existing.description.is_empty() {
        existing.description = incoming.description.clone();
    }
    if existing.node_type.is_empty() {
        existing.node_type = incoming.node_type.clone();
    }
}

fn merge_relationship(existing: &mut GraphRelationship, incoming: &GraphRelationship) {
    merge_unique(&mut existing.source_documents, &incoming.source_documents);
    merge_unique(&mut existing.source_chunks, &incoming.source_chunks);
    existing.confidence = existing.confidence.max(incoming.confidence);
    if existing.description.is_empty() {
        existing.description = incoming.description.clone();
    }
    if existing.weight.is_none() {
        existing.weight = incoming.weight;
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn create_graph(&self, graph: &str) -> Result<()> {
        self.inner
            .write()
            .await
            .entry(graph.to_string())
            .or_default();
        Ok(())
    }

    async fn drop_graph(&self, graph: &str) -> Result<()> {
        self.inner.write().await.remove(graph);
        Ok(())
    }

    async fn graph_exists(&self, graph: &str) -> Result<bool> {
        Ok(self.inner.read().await.contains_key(graph))
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn save_extraction_results(
        &self,
        graph: &str,
        nodes: Vec<GraphNode>,
        relationships: Vec<GraphRelationship>,
    ) -> Result<SavedExtraction> {
        let mut inner = self.inner.write().await;
        let data = inner
            .get_mut(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;

        let mut saved = SavedExtraction::default();
        let mut touched_nodes: Vec<String> = Vec::new();
        let mut touched_relationships: Vec<String> = Vec::new();

        for node in nodes {
            let canonical = canonical_entity_id(&node.name, &node.node_type);
            saved.entity_ids.insert(node.id.clone(), canonical.clone());
            saved.entity_ids.insert(canonical.clone(), canonical.clone());

            match data.nodes.entry(canonical.clone()) {
                std::collections::btree_map::Entry::Occupied(mut entry) => {
                    merge_node(entry.get_mut(), &node);
                }
                std::collections::btree_map::Entry::Vacant(entry) => {
                    entry.insert(GraphNode {
                        id: canonical.clone(),
                        ..node
                    });
                }
            }

            if !touched_nodes.contains(&canonical) {
                touched_nodes.push(canonical);
            }
        }

        for relationship in relationships {
            let start = saved
                .entity_ids
                .get(&relationship.start)
                .cloned()
                .unwrap_or_else(|| relationship.start.clone());
            let end = saved
                .entity_ids
                .get(&relationship.end)
                .cloned()
                .unwrap_or_else(|| relationship.end.clone());
            let canonical = canonical_relationship_id(&start, &relationship.rel_type, &end);

            saved
                .relationship_ids
                .insert(relationship.id.clone(), canonical.clone());

            match data.relationships.entry(canonical.clone()) {
                std::collections::btree_map::Entry::Occupied(mut entry) => {
                    merge_relationship(entry.get_mut(), &relationship);
                }
                std::collections::btree_map::Entry::Vacant(entry) => {
                    entry.insert(GraphRelationship {
                        id: canonical.clone(),
                        start,
                        end,
                        ..relationship
                    });
                }
            }

            if !touched_relationships.contains(&canonical) {
                touched_relationships.push(canonical);
            }
        }

        saved.entities = touched_nodes
            .iter()
            .filter_map(|id| data.nodes.get(id).cloned())
            .collect();
        saved.relationships = touched_relationships
            .iter()
            .filter_map(|id| data.relationships.get(id).cloned())
            .collect();

        debug!(
            "saved extraction into {graph}: {} entities, {} relationships",
            saved.entities.len(),
            saved.relationships.len()
        );
        Ok(saved)
    }

    async fn add_nodes(&self, graph: &str, nodes: Vec<GraphNode>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let data = inner
            .get_mut(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;
        for node in nodes {
            data.nodes.insert(node.id.clone(), node);
        }
        Ok(())
    }

    async fn add_relationships(
        &self,
        graph: &str,
        relationships: Vec<GraphRelationship>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let data = inner
            .get_mut(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;
        for relationship in relationships {
            data.relationships
                .insert(relationship.id.clone(), relationship);
        }
        Ok(())
    }

    async fn get_nodes(&self, graph: &str, ids: &[String]) -> Result<Vec<GraphNode>> {
        let inner = self.inner.read().await;
        let data = inner
            .get(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;
        Ok(ids.iter().filter_map(|id| data.nodes.get(id).cloned()).collect())
    }

    async fn get_relationships(
        &self,
        graph: &str,
        ids: &[String],
    ) -> Result<Vec<GraphRelationship>> {
        let inner = self.inner.read().await;
        let data = inner
            .get(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;
        Ok(ids
            .iter()
            .filter_map(|id| data.relationships.get(id).cloned())
            .collect())
    }

    async fn nodes_by_document(&self, graph: &str, doc_id: &str) -> Result<Vec<GraphNode>> {
        let inner = self.inner.read().await;
        let data = inner
            .get(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;
        Ok(data
            .nodes
            .values()
            .filter(|node| node.source_documents.iter().any(|d| d == doc_id))
            .cloned()
            .collect())
    }

    async fn relationships_by_document(
        &self,
        graph: &str,
        doc_id: &str,
    ) -> Result<Vec<GraphRelationship>> {
        let inner = self.inner.read().await;
        let data = inner
            .get(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;
        Ok(data
            .relationships
            .values()
            .filter(|rel| rel.source_documents.iter().any(|d| d == doc_id))
            .cloned()
            .collect())
    }

    async fn nodes_by_chunks(&self, graph: &str, chunk_ids: &[String]) -> Result<Vec<GraphNode>> {
        let inner = self.inner.read().await;
        let data = inner
            .get(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;
        Ok(data
            .nodes
            .values()
            .filter(|node| {
                node.source_chunks
                    .iter()
                    .any(|chunk| chunk_ids.iter().any(|c| c == chunk))
            })
            .cloned()
            .collect())
    }

    async fn relationships_by_chunks(
        &self,
        graph: &str,
        chunk_ids: &[String],
    ) -> Result<Vec<GraphRelationship>> {
        let inner = self.inner.read().await;
        let data = inner
            .get(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;
        Ok(data
            .relationships
            .values()
            .filter(|rel| {
                rel.source_chunks
                    .iter()
                    .any(|chunk| chunk_ids.iter().any(|c| c == chunk))
            })
            .cloned()
            .collect())
    }

    async fn delete_nodes(
        &self,
        graph: &str,
        ids: &[String],
        delete_relationships: bool,
    ) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let data = inner
            .get_mut(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;

        let mut removed = 0usize;
        for id in ids {
            if data.nodes.remove(id).is_some() {
                removed += 1;
            }
        }
        if delete_relationships {
            data.relationships.retain(|_, rel| {
                !ids.iter().any(|id| *id == rel.start || *id == rel.end)
            });
        }
        Ok(removed)
    }

    async fn delete_relationships(&self, graph: &str, ids: &[String]) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let data = inner
            .get_mut(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;

        let mut removed = 0usize;
        for id in ids {
            if data.relationships.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn search_nodes(
        &self,
        graph: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<GraphNode>> {
        let inner = self.inner.read().await;
        let data = inner
            .get(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;

        let needle = query.to_lowercase();
        Ok(data
            .nodes
            .values()
            .filter(|node| {
                node.name.to_lowercase().contains(&needle)
                    || node.description.to_lowercase().contains(&needle)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn backup(&self, graph: &str) -> Result<Vec<u8>> {
        let inner = self.inner.read().await;
        let data = inner
            .get(graph)
            .ok_or_else(|| StoreError::CollectionNotFound(graph.to_string()))?;
        Ok(serde_json::to_vec(data)?)
    }

    async fn restore(&self, graph: &str, data: &[u8]) -> Result<()> {
        let parsed: GraphData = serde_json::from_slice(data)
            .map_err(|e| StoreError::InvalidDump(format!("graph dump: {e}")))?;
        self.inner.write().await.insert(graph.to_string(), parsed);
        Ok(())
    }
}
