//! Segment add / update / remove and per-segment scoring.
//!
//! Hand-authored segments are root-only, leaf-only chunks pushed through the
//! persistence half of the ingest pipeline. The update path first strips the
//! segments' prior contributions from the graph so shared identities never
//! accumulate stale provenance.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use trellis_adapters::{Chunk, ChunkType, Embedder, TextPosition};
use trellis_stores::{
    DocumentFilter, GraphStore, KvStore, VectorDocument, VectorStore, remove_values,
};

use crate::engine::Engine;
use crate::error::{EngineError, Result, Subsystem};
use crate::ingest::ChunkBatch;
use crate::naming::{self, CollectionNames};
use crate::options::{SegmentText, UpsertOptions};
use crate::payload::{
    self, DOC_TYPE_CHUNK, entity_row_id, relationship_row_id,
};

/// A stored segment.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Segment id.
    pub id: String,

    /// Owning document.
    pub doc_id: String,

    /// Segment text.
    pub text: String,

    /// Full vector payload of the segment row.
    pub metadata: Value,
}

impl Segment {
    fn from_document(document: VectorDocument) -> Self {
        let doc_id = document
            .metadata_str("doc_id")
            .unwrap_or_default()
            .to_string();
        Self {
            id: document.id,
            doc_id,
            text: document.content,
            metadata: document.metadata,
        }
    }

    /// Emission index recorded in the payload, for ordering.
    fn index(&self) -> usize {
        self.metadata
            .get("chunk_details")
            .and_then(|details| details.get("index"))
            .and_then(Value::as_u64)
            .unwrap_or(u64::MAX) as usize
    }
}

impl Engine {
    /// Add hand-authored segments to a document.
    ///
    /// Caller-supplied segment ids are preserved; others are generated.
    /// Both the embedder and, when a graph store is configured, the
    /// extractor must be injected — auto-detection is not used here.
    pub async fn add_segments(
        &self,
        doc_id: &str,
        segments: &[SegmentText],
        options: UpsertOptions,
    ) -> Result<Vec<String>> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }
        if doc_id.is_empty() {
            return Err(EngineError::Validation("empty doc id".to_string()));
        }

        let collection_id = naming::extract_collection_id(doc_id).to_string();
        let names = naming::names(&collection_id);
        let ctx = self.op_context(doc_id, &options);

        let embedder = self.resolve_embedder(&options)?;
        let extractor = self.resolve_extractor(&options, false)?;

        let chunks = fabricate_segment_chunks(segments);
        let ids: Vec<String> = chunks.iter().map(|chunk| chunk.id.clone()).collect();

        self.ensure_backing(&names, embedder.dimension()).await?;
        let batch = ChunkBatch {
            doc_id: doc_id.to_string(),
            collection_id,
            names,
            chunks,
            source_file: "<segment>".to_string(),
            user_metadata: options.user_metadata.clone(),
            convert_metadata: serde_json::Map::new(),
            origin_in_payload: None,
            replace_prior_chunks: false,
        };
        self.persist_chunks(batch, embedder, extractor, &ctx).await?;

        debug!("added {} segments to {doc_id}", ids.len());
        Ok(ids)
    }

    /// Replace existing segments.
    ///
    /// Every segment must carry an id and every id must exist; the check
    /// runs before any write, so a missing id leaves the stores untouched.
    /// Prior per-segment graph contributions are removed before re-ingest.
    pub async fn update_segments(
        &self,
        segments: &[SegmentText],
        options: UpsertOptions,
    ) -> Result<usize> {
        if segments.is_empty() {
            return Ok(0);
        }

        let mut ids = Vec::with_capacity(segments.len());
        for segment in segments {
            match &segment.id {
                Some(id) if !id.is_empty() => ids.push(id.clone()),
                _ => {
                    return Err(EngineError::Validation(
                        "every segment needs an id for update".to_string(),
                    ));
                }
            }
        }

        naming::validate_collection_id(&options.collection_id)?;
        let names = naming::names(&options.collection_id);
        let embedder = self.resolve_embedder(&options)?;
        let extractor = self.resolve_extractor(&options, false)?;

        let rows = self
            .vector
            .get_documents(&names.vector, &ids, true)
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;
        if rows.len() != ids.len() {
            let found: HashSet<&str> = rows.iter().map(|row| row.id.as_str()).collect();
            let missing = ids
                .iter()
                .find(|id| !found.contains(id.as_str()))
                .cloned()
                .unwrap_or_default();
            return Err(EngineError::NotFound(format!("segment {missing}")));
        }

        let doc_by_segment: HashMap<String, String> = rows
            .iter()
            .map(|row| {
                (
                    row.id.clone(),
                    row.metadata_str("doc_id").unwrap_or_default().to_string(),
                )
            })
            .collect();

        self.remove_segment_provenance(&names, &ids).await?;

        // Re-ingest, grouped by owning document.
        let mut by_doc: HashMap<String, Vec<SegmentText>> = HashMap::new();
        for (segment, id) in segments.iter().zip(ids.iter()) {
            let doc_id = doc_by_segment.get(id).cloned().unwrap_or_default();
            by_doc.entry(doc_id).or_default().push(SegmentText {
                id: Some(id.clone()),
                text: segment.text.clone(),
            });
        }

        for (doc_id, doc_segments) in by_doc {
            let ctx = self.op_context(&doc_id, &options);
            let batch = ChunkBatch {
                doc_id,
                collection_id: options.collection_id.clone(),
                names: names.clone(),
                chunks: fabricate_segment_chunks(&doc_segments),
                source_file: "<segment>".to_string(),
                user_metadata: options.user_metadata.clone(),
                convert_metadata: serde_json::Map::new(),
                origin_in_payload: None,
                replace_prior_chunks: false,
            };
            self.persist_chunks(batch, embedder.clone(), extractor.clone(), &ctx)
                .await?;
        }

        Ok(segments.len())
    }

    /// Remove segments by id, including their per-segment graph
    /// contributions and key/value metadata. Best-effort per subsystem.
    pub async fn remove_segments(&self, collection_id: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        naming::validate_collection_id(collection_id)?;
        let names = naming::names(collection_id);

        // Row payloads are read first; the doc ids in them address the
        // key/value entries.
        let rows = self
            .vector
            .get_documents(&names.vector, ids, true)
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;

        if let Err(e) = self.remove_segment_provenance(&names, ids).await {
            warn!("segment provenance removal failed: {e}");
        }

        let removed = self
            .vector
            .delete_documents(&names.vector, &DocumentFilter::by_ids(ids.to_vec()))
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;

        if let Some(kv) = &self.kv {
            for row in &rows {
                let doc_id = row.metadata_str("doc_id").unwrap_or_default();
                for key in [
                    naming::vote_key(doc_id, &row.id),
                    naming::score_key(doc_id, &row.id),
                    naming::weight_key(doc_id, &row.id),
                ] {
                    if let Err(e) = kv.delete(&key).await {
                        warn!("deleting {key} failed: {e}");
                    }
                }
            }
        }

        Ok(removed)
    }

    /// Remove every segment of a document.
    pub async fn remove_segments_by_doc(&self, doc_id: &str) -> Result<usize> {
        let collection_id = naming::extract_collection_id(doc_id).to_string();
        let names = naming::names(&collection_id);

        let filter = DocumentFilter::by_doc_id(doc_id).with_document_type(DOC_TYPE_CHUNK);
        let ids: Vec<String> = self
            .vector
            .list_documents(&names.vector, &filter, false, None)
            .await
            .map_err(EngineError::store(Subsystem::Vector))?
            .into_iter()
            .map(|row| row.id)
            .collect();

        self.remove_segments(&collection_id, &ids).await
    }

    /// Fetch one segment.
    pub async fn get_segment(&self, collection_id: &str, segment_id: &str) -> Result<Segment> {
        let names = naming::names(collection_id);
        let rows = self
            .vector
            .get_documents(&names.vector, &[segment_id.to_string()], true)
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;

        rows.into_iter()
            .next()
            .filter(|row| row.metadata_str("document_type") == Some(DOC_TYPE_CHUNK))
            .map(Segment::from_document)
            .ok_or_else(|| EngineError::NotFound(format!("segment {segment_id}")))
    }

    /// All segments of a document, in document order.
    pub async fn get_segments(&self, doc_id: &str) -> Result<Vec<Segment>> {
        let collection_id = naming::extract_collection_id(doc_id).to_string();
        self.list_collection_segments(&collection_id, doc_id, None, 0)
            .await
    }

    /// Page through the segments of a document.
    pub async fn list_segments(
        &self,
        doc_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Segment>> {
        let collection_id = naming::extract_collection_id(doc_id).to_string();
        self.list_collection_segments(&collection_id, doc_id, limit, offset)
            .await
    }

    /// Page through the segments of a document inside an explicit
    /// collection. Needed when a backup was restored under a different
    /// collection id than the one encoded in its doc ids.
    pub async fn list_collection_segments(
        &self,
        collection_id: &str,
        doc_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Segment>> {
        let names = naming::names(collection_id);
        let filter = DocumentFilter::by_doc_id(doc_id).with_document_type(DOC_TYPE_CHUNK);
        let rows = self
            .vector
            .list_documents(&names.vector, &filter, false, None)
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;

        let mut segments: Vec<Segment> = rows.into_iter().map(Segment::from_document).collect();
        segments.sort_by_key(Segment::index);

        let segments = segments
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(segments)
    }

    /// Set per-segment votes.
    pub async fn update_vote(
        &self,
        collection_id: &str,
        updates: &[(String, i64)],
    ) -> Result<usize> {
        let entries: Vec<(String, String)> = updates
            .iter()
            .map(|(id, value)| (id.clone(), value.to_string()))
            .collect();
        self.update_segment_metric(collection_id, &entries, naming::vote_key)
            .await
    }

    /// Set per-segment scores.
    pub async fn update_score(
        &self,
        collection_id: &str,
        updates: &[(String, f64)],
    ) -> Result<usize> {
        let entries: Vec<(String, String)> = updates
            .iter()
            .map(|(id, value)| (id.clone(), value.to_string()))
            .collect();
        self.update_segment_metric(collection_id, &entries, naming::score_key)
            .await
    }

    /// Set per-segment weights.
    pub async fn update_weight(
        &self,
        collection_id: &str,
        updates: &[(String, f64)],
    ) -> Result<usize> {
        let entries: Vec<(String, String)> = updates
            .iter()
            .map(|(id, value)| (id.clone(), value.to_string()))
            .collect();
        self.update_segment_metric(collection_id, &entries, naming::weight_key)
            .await
    }

    /// Write one metric key per segment, resolving each segment's owning
    /// document through its vector row.
    async fn update_segment_metric(
        &self,
        collection_id: &str,
        entries: &[(String, String)],
        key: fn(&str, &str) -> String,
    ) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let kv = self.kv.as_ref().ok_or_else(|| {
            EngineError::Validation("no key/value store configured".to_string())
        })?;

        naming::validate_collection_id(collection_id)?;
        let names = naming::names(collection_id);
        let ids: Vec<String> = entries.iter().map(|(id, _)| id.clone()).collect();
        let rows = self
            .vector
            .get_documents(&names.vector, &ids, true)
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;
        let doc_by_segment: HashMap<String, String> = rows
            .iter()
            .map(|row| {
                (
                    row.id.clone(),
                    row.metadata_str("doc_id").unwrap_or_default().to_string(),
                )
            })
            .collect();

        for (segment_id, value) in entries {
            let doc_id = doc_by_segment
                .get(segment_id)
                .ok_or_else(|| EngineError::NotFound(format!("segment {segment_id}")))?;
            kv.set(&key(doc_id, segment_id), value)
                .await
                .map_err(EngineError::store(Subsystem::KeyValue))?;
        }

        Ok(entries.len())
    }

    /// Strip a set of segments from every entity and relationship that
    /// references them, deleting identities left without chunks, and keep
    /// the survivors' vector rows in sync.
    pub(crate) async fn remove_segment_provenance(
        &self,
        names: &CollectionNames,
        segment_ids: &[String],
    ) -> Result<()> {
        let Some(graph) = &self.graph else {
            return Ok(());
        };

        // Relationships are read before node deletion cascades them away.
        let relationships = graph
            .relationships_by_chunks(&names.graph, segment_ids)
            .await
            .map_err(EngineError::store(Subsystem::Graph))?;
        let nodes = graph
            .nodes_by_chunks(&names.graph, segment_ids)
            .await
            .map_err(EngineError::store(Subsystem::Graph))?;

        let mut deleted_nodes = Vec::new();
        let mut surviving_nodes = Vec::new();
        for mut node in nodes {
            if remove_values(&mut node.source_chunks, segment_ids) {
                deleted_nodes.push(node.id);
            } else {
                surviving_nodes.push(node);
            }
        }

        let mut deleted_relationships = Vec::new();
        let mut surviving_relationships = Vec::new();
        for mut relationship in relationships {
            if remove_values(&mut relationship.source_chunks, segment_ids) {
                deleted_relationships.push(relationship.id);
            } else {
                surviving_relationships.push(relationship);
            }
        }

        if !deleted_nodes.is_empty() {
            graph
                .delete_nodes(&names.graph, &deleted_nodes, true)
                .await
                .map_err(EngineError::store(Subsystem::Graph))?;
        }
        if !deleted_relationships.is_empty() {
            graph
                .delete_relationships(&names.graph, &deleted_relationships)
                .await
                .map_err(EngineError::store(Subsystem::Graph))?;
        }
        if !surviving_nodes.is_empty() {
            graph
                .add_nodes(&names.graph, surviving_nodes.clone())
                .await
                .map_err(EngineError::store(Subsystem::Graph))?;
        }
        if !surviving_relationships.is_empty() {
            graph
                .add_relationships(&names.graph, surviving_relationships.clone())
                .await
                .map_err(EngineError::store(Subsystem::Graph))?;
        }

        // Vector rows follow the graph's verdict.
        let mut dead_rows: Vec<String> =
            deleted_nodes.iter().map(|id| entity_row_id(id)).collect();
        dead_rows.extend(
            deleted_relationships
                .iter()
                .map(|id| relationship_row_id(id)),
        );
        if !dead_rows.is_empty() {
            self.vector
                .delete_documents(&names.vector, &DocumentFilter::by_ids(dead_rows))
                .await
                .map_err(EngineError::store(Subsystem::Vector))?;
        }

        let mut patched = Vec::new();
        for node in &surviving_nodes {
            let row_id = entity_row_id(&node.id);
            let rows = self
                .vector
                .get_documents(&names.vector, &[row_id], true)
                .await
                .map_err(EngineError::store(Subsystem::Vector))?;
            if let Some(mut row) = rows.into_iter().next() {
                payload::patch_entity_row(&mut row.metadata, node);
                patched.push(row);
            }
        }
        for relationship in &surviving_relationships {
            let row_id = relationship_row_id(&relationship.id);
            let rows = self
                .vector
                .get_documents(&names.vector, &[row_id], true)
                .await
                .map_err(EngineError::store(Subsystem::Vector))?;
            if let Some(mut row) = rows.into_iter().next() {
                payload::patch_relationship_row(&mut row.metadata, relationship);
                patched.push(row);
            }
        }
        if !patched.is_empty() {
            self.vector
                .add_documents(&names.vector, patched, true, self.batch_size)
                .await
                .map_err(EngineError::store(Subsystem::Vector))?;
        }

        Ok(())
    }
}

/// Root-only, leaf-only chunks from hand-authored segment texts.
fn fabricate_segment_chunks(segments: &[SegmentText]) -> Vec<Chunk> {
    segments
        .iter()
        .enumerate()
        .map(|(index, segment)| Chunk {
            id: segment
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            text: segment.text.clone(),
            chunk_type: ChunkType::Text,
            depth: 0,
            index,
            parent_id: None,
            leaf: true,
            root: true,
            text_pos: TextPosition {
                start: 0,
                end: segment.text.len(),
            },
            media_pos: None,
        })
        .collect()
}
