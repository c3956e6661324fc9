//! Document deletion and provenance reclamation.
//!
//! Removing a document deletes its chunk rows, surrenders its contribution
//! to every shared entity and relationship, and cleans its key/value state.
//! An identity survives iff other documents still reference it; survivors
//! keep their dense vectors and get their provenance arrays rewritten to
//! match the graph. Subsystem failures are logged and skipped: best-effort
//! cleanup beats orphaned provenance.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use trellis_stores::{DocumentFilter, GraphStore, KvStore, VectorStore, remove_values};

use crate::engine::Engine;
use crate::error::{EngineError, Result, Subsystem};
use crate::naming::{self, CollectionNames};
use crate::payload::{
    self, DOC_TYPE_CHUNK, DOC_TYPE_ENTITY, DOC_TYPE_RELATIONSHIP, entity_row_id,
    relationship_row_id,
};

impl Engine {
    /// Remove documents across all three stores.
    ///
    /// Ids are partitioned by their collection prefix. Returns the number of
    /// documents processed, which can exceed the number of rows actually
    /// deleted when cleanup partially fails.
    pub async fn remove_docs(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for doc_id in ids {
            groups
                .entry(naming::extract_collection_id(doc_id).to_string())
                .or_default()
                .push(doc_id.clone());
        }

        let mut processed = 0usize;
        for (collection_id, doc_ids) in groups {
            let names = naming::names(&collection_id);
            for doc_id in &doc_ids {
                self.remove_document(&names, doc_id).await;
                processed += 1;
            }
        }

        info!("processed removal of {processed} documents");
        Ok(processed)
    }

    /// Best-effort removal of one document: vector first, then graph, then
    /// key/value.
    async fn remove_document(&self, names: &CollectionNames, doc_id: &str) {
        // Chunk ids are needed afterwards to trim chunk-level provenance.
        let chunk_filter =
            DocumentFilter::by_doc_id(doc_id).with_document_type(DOC_TYPE_CHUNK);
        let chunk_ids: Vec<String> = match self
            .vector
            .list_documents(&names.vector, &chunk_filter, false, None)
            .await
        {
            Ok(rows) => rows.into_iter().map(|row| row.id).collect(),
            Err(e) => {
                warn!("listing chunks of {doc_id} failed: {e}");
                Vec::new()
            }
        };

        match self
            .vector
            .delete_documents(&names.vector, &chunk_filter)
            .await
        {
            Ok(removed) => debug!("removed {removed} chunk rows of {doc_id}"),
            Err(e) => warn!("removing chunk rows of {doc_id} failed: {e}"),
        }

        if self.graph.is_some() {
            if let Err(e) = self
                .reclaim_graph_provenance(names, doc_id, &chunk_ids)
                .await
            {
                warn!("graph reclamation for {doc_id} failed: {e}");
            }
        } else if let Err(e) = self.trim_vector_provenance(names, doc_id).await {
            warn!("vector provenance trim for {doc_id} failed: {e}");
        }

        if let Some(kv) = &self.kv {
            if let Err(e) = kv.delete(&naming::origin_key(doc_id)).await {
                warn!("removing origin of {doc_id} failed: {e}");
            }
            for prefix in naming::document_segment_prefixes(doc_id) {
                if let Err(e) = kv.delete_prefix(&prefix).await {
                    warn!("removing keys under {prefix} failed: {e}");
                }
            }
        }
    }

    /// Graph-authoritative reclamation: trim `doc_id` (and the document's
    /// chunks) out of every provenance array, delete identities whose
    /// document set becomes empty, and rewrite the vector rows of survivors
    /// to match.
    async fn reclaim_graph_provenance(
        &self,
        names: &CollectionNames,
        doc_id: &str,
        chunk_ids: &[String],
    ) -> Result<()> {
        let Some(graph) = &self.graph else {
            return Ok(());
        };
        let removed_doc = [doc_id.to_string()];

        // Relationships are read before node deletion cascades them away.
        let relationships = graph
            .relationships_by_document(&names.graph, doc_id)
            .await
            .map_err(EngineError::store(Subsystem::Graph))?;
        let nodes = graph
            .nodes_by_document(&names.graph, doc_id)
            .await
            .map_err(EngineError::store(Subsystem::Graph))?;

        let mut deleted_nodes = Vec::new();
        let mut surviving_nodes = Vec::new();
        for mut node in nodes {
            remove_values(&mut node.source_documents, &removed_doc);
            remove_values(&mut node.source_chunks, chunk_ids);
            if node.source_documents.is_empty() {
                deleted_nodes.push(node.id);
            } else {
                surviving_nodes.push(node);
            }
        }

        let mut deleted_relationships = Vec::new();
        let mut surviving_relationships = Vec::new();
        for mut relationship in relationships {
            remove_values(&mut relationship.source_documents, &removed_doc);
            remove_values(&mut relationship.source_chunks, chunk_ids);
            if relationship.source_documents.is_empty() {
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

        debug!(
            "reclaimed {doc_id}: {} nodes and {} relationships deleted, {} and {} trimmed",
            deleted_nodes.len(),
            deleted_relationships.len(),
            surviving_nodes.len(),
            surviving_relationships.len()
        );

        // Vector rows of dead identities go away entirely.
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

        // Survivors keep their vectors; only the provenance in the payload
        // is rewritten.
        let mut patched = Vec::new();
        if !surviving_nodes.is_empty() {
            let row_ids: Vec<String> = surviving_nodes
                .iter()
                .map(|node| entity_row_id(&node.id))
                .collect();
            let rows = self
                .vector
                .get_documents(&names.vector, &row_ids, true)
                .await
                .map_err(EngineError::store(Subsystem::Vector))?;
            let by_row: HashMap<String, _> = surviving_nodes
                .iter()
                .map(|node| (entity_row_id(&node.id), node))
                .collect();
            for mut row in rows {
                if let Some(node) = by_row.get(&row.id) {
                    payload::patch_entity_row(&mut row.metadata, node);
                    patched.push(row);
                }
            }
        }
        if !surviving_relationships.is_empty() {
            let row_ids: Vec<String> = surviving_relationships
                .iter()
                .map(|rel| relationship_row_id(&rel.id))
                .collect();
            let rows = self
                .vector
                .get_documents(&names.vector, &row_ids, true)
                .await
                .map_err(EngineError::store(Subsystem::Vector))?;
            let by_row: HashMap<String, _> = surviving_relationships
                .iter()
                .map(|rel| (relationship_row_id(&rel.id), rel))
                .collect();
            for mut row in rows {
                if let Some(relationship) = by_row.get(&row.id) {
                    payload::patch_relationship_row(&mut row.metadata, relationship);
                    patched.push(row);
                }
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

    /// Provenance trim when no graph store is configured: read-modify-write
    /// over the entity/relationship rows themselves, deleting rows whose
    /// trimmed `doc_ids` become empty.
    async fn trim_vector_provenance(
        &self,
        names: &CollectionNames,
        doc_id: &str,
    ) -> Result<()> {
        for document_type in [DOC_TYPE_ENTITY, DOC_TYPE_RELATIONSHIP] {
            let filter = DocumentFilter::default()
                .with_document_type(document_type)
                .with_doc_ids_contains(doc_id);
            let rows = self
                .vector
                .list_documents(&names.vector, &filter, true, None)
                .await
                .map_err(EngineError::store(Subsystem::Vector))?;

            let mut dead = Vec::new();
            let mut patched = Vec::new();
            for mut row in rows {
                let mut doc_ids = payload::payload_doc_ids(&row.metadata);
                doc_ids.retain(|id| id != doc_id);
                if doc_ids.is_empty() {
                    dead.push(row.id);
                } else {
                    payload::set_payload_doc_ids(&mut row.metadata, &doc_ids);
                    patched.push(row);
                }
            }

            if !dead.is_empty() {
                self.vector
                    .delete_documents(&names.vector, &DocumentFilter::by_ids(dead))
                    .await
                    .map_err(EngineError::store(Subsystem::Vector))?;
            }
            if !patched.is_empty() {
                self.vector
                    .add_documents(&names.vector, patched, true, self.batch_size)
                    .await
                    .map_err(EngineError::store(Subsystem::Vector))?;
            }
        }
        Ok(())
    }
}
