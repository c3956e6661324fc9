//! Per-segment graph re-extraction and read access.
//!
//! Re-extraction recomputes entities and relationships for one segment and
//! merges them into the graph by identity, then patches the segment's
//! vector payload so search results see the new extraction without
//! re-embedding. It does not remove the segment's previous contributions;
//! callers wanting replacement semantics use `update_segments`.

use serde_json::Value;
use tracing::{info, warn};

use trellis_adapters::Extractor;
use trellis_stores::{GraphNode, GraphRelationship, GraphStore, VectorStore};

use crate::engine::Engine;
use crate::error::{EngineError, Result, Subsystem};
use crate::naming;
use crate::options::UpsertOptions;
use crate::payload;
use crate::segments::Segment;

/// Entities and relationships attached to one segment.
#[derive(Debug, Clone, Default)]
pub struct SegmentGraph {
    /// Entities referencing the segment.
    pub entities: Vec<GraphNode>,

    /// Relationships referencing the segment.
    pub relationships: Vec<GraphRelationship>,
}

impl Engine {
    /// Recompute the extraction of one segment and merge it into the graph.
    ///
    /// Aborts before any mutation when the segment cannot be loaded or the
    /// extractor fails. Returns what this pass saved.
    pub async fn extract_segment_graph(
        &self,
        doc_id: &str,
        segment_id: &str,
        options: UpsertOptions,
    ) -> Result<SegmentGraph> {
        let Some(graph) = &self.graph else {
            return Err(EngineError::Validation(
                "re-extraction requires a graph store".to_string(),
            ));
        };

        let collection_id = naming::extract_collection_id(doc_id).to_string();
        let names = naming::names(&collection_id);
        let ctx = self.op_context(doc_id, &options);

        let extractor = self
            .resolve_extractor(&options, true)?
            .ok_or_else(|| EngineError::Validation("no extractor available".to_string()))?;

        let segment = self.get_segment(&collection_id, segment_id).await?;
        if segment.doc_id != doc_id {
            return Err(EngineError::NotFound(format!(
                "segment {segment_id} does not belong to {doc_id}"
            )));
        }

        let texts = vec![segment.text.clone()];
        let results = extractor
            .extract(&texts, &ctx)
            .await
            .map_err(EngineError::adapter(trellis_adapters::ProgressStage::Extraction))?;
        let result = results.into_iter().next().ok_or_else(|| {
            EngineError::Inconsistency("extractor returned no result".to_string())
        })?;

        // Stamp provenance, reject relationships with unresolved endpoints.
        let mut nodes = Vec::new();
        for node in &result.nodes {
            nodes.push(GraphNode {
                id: node.id.clone(),
                name: node.name.clone(),
                node_type: node.node_type.clone(),
                description: node.description.clone(),
                confidence: node.confidence,
                source_documents: vec![doc_id.to_string()],
                source_chunks: vec![segment_id.to_string()],
            });
        }
        let mut relationships = Vec::new();
        for (i, rel) in result.relationships.iter().enumerate() {
            let resolves = result.nodes.iter().any(|n| n.id == rel.start)
                && result.nodes.iter().any(|n| n.id == rel.end);
            if !resolves {
                warn!(
                    "dropping relationship {}-[{}]->{}: endpoint missing from result",
                    rel.start, rel.rel_type, rel.end
                );
                continue;
            }
            relationships.push(GraphRelationship {
                id: format!("{segment_id}#r{i}"),
                start: rel.start.clone(),
                end: rel.end.clone(),
                rel_type: rel.rel_type.clone(),
                description: rel.description.clone(),
                confidence: rel.confidence,
                weight: rel.weight,
                source_documents: vec![doc_id.to_string()],
                source_chunks: vec![segment_id.to_string()],
            });
        }

        let saved = graph
            .save_extraction_results(&names.graph, nodes, relationships)
            .await
            .map_err(EngineError::store(Subsystem::Graph))?;

        // Patch the segment row so search sees the new extraction without a
        // re-embed.
        let rows = self
            .vector
            .get_documents(&names.vector, &[segment_id.to_string()], true)
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;
        if let Some(mut row) = rows.into_iter().next() {
            patch_segment_extraction(&mut row.metadata, &saved.entities, &saved.relationships, &result.model);
            self.vector
                .add_documents(&names.vector, vec![row], true, self.batch_size)
                .await
                .map_err(EngineError::store(Subsystem::Vector))?;
        }

        info!(
            "re-extracted {segment_id}: {} entities, {} relationships",
            saved.entities.len(),
            saved.relationships.len()
        );
        Ok(SegmentGraph {
            entities: saved.entities,
            relationships: saved.relationships,
        })
    }

    /// Entities and relationships currently attached to a segment.
    pub async fn get_segment_graph(
        &self,
        doc_id: &str,
        segment_id: &str,
    ) -> Result<SegmentGraph> {
        Ok(SegmentGraph {
            entities: self.get_segment_entities(doc_id, segment_id).await?,
            relationships: self.get_segment_relationships(doc_id, segment_id).await?,
        })
    }

    /// Entities currently attached to a segment.
    pub async fn get_segment_entities(
        &self,
        doc_id: &str,
        segment_id: &str,
    ) -> Result<Vec<GraphNode>> {
        let (graph, names, segment) = self.segment_graph_context(doc_id, segment_id).await?;
        let ids = detail_ids(&segment, "entities");
        graph
            .get_nodes(&names.graph, &ids)
            .await
            .map_err(EngineError::store(Subsystem::Graph))
    }

    /// Relationships currently attached to a segment.
    pub async fn get_segment_relationships(
        &self,
        doc_id: &str,
        segment_id: &str,
    ) -> Result<Vec<GraphRelationship>> {
        let (graph, names, segment) = self.segment_graph_context(doc_id, segment_id).await?;
        let ids = detail_ids(&segment, "relationships");
        graph
            .get_relationships(&names.graph, &ids)
            .await
            .map_err(EngineError::store(Subsystem::Graph))
    }

    async fn segment_graph_context(
        &self,
        doc_id: &str,
        segment_id: &str,
    ) -> Result<(
        std::sync::Arc<dyn trellis_stores::GraphStore>,
        crate::naming::CollectionNames,
        Segment,
    )> {
        let graph = self.graph.clone().ok_or_else(|| {
            EngineError::Validation("no graph store configured".to_string())
        })?;
        let collection_id = naming::extract_collection_id(doc_id).to_string();
        let names = naming::names(&collection_id);
        let segment = self.get_segment(&collection_id, segment_id).await?;
        if segment.doc_id != doc_id {
            return Err(EngineError::NotFound(format!(
                "segment {segment_id} does not belong to {doc_id}"
            )));
        }
        Ok((graph, names, segment))
    }
}

/// Canonical ids recorded under `chunk_details.{entities,relationships}`.
fn detail_ids(segment: &Segment, key: &str) -> Vec<String> {
    segment
        .metadata
        .get("chunk_details")
        .and_then(|details| details.get(key))
        .and_then(Value::as_array)
        .map(|array| {
            array
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Rewrite `chunk_details` extraction fields after a re-extract.
fn patch_segment_extraction(
    metadata: &mut Value,
    entities: &[GraphNode],
    relationships: &[GraphRelationship],
    model: &str,
) {
    if let Some(details) = metadata
        .get_mut("chunk_details")
        .and_then(Value::as_object_mut)
    {
        let entity_ids: Vec<&str> = entities.iter().map(|n| n.id.as_str()).collect();
        let relationship_ids: Vec<&str> =
            relationships.iter().map(|r| r.id.as_str()).collect();
        details.insert("entities".to_string(), serde_json::json!(entity_ids));
        details.insert(
            "relationships".to_string(),
            serde_json::json!(relationship_ids),
        );
        details.insert("extraction_model".to_string(), serde_json::json!(model));
        details.insert("extracted".to_string(), serde_json::json!(true));
    }
    payload::touch_updated_at(metadata);
}
