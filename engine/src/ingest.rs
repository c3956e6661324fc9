//! The ingest pipeline.
//!
//! One path serves every entry point: `add_text` / `add_url` / `add_stream`
//! normalize to `add_file`-style sources by materializing their content, and
//! the pipeline then runs convert → chunk → extract → embed → persist. Root
//! chunks feed the extractor; the graph store deduplicates identities and
//! the canonical ids it returns are the only ids that reach the vector
//! store. The embedding batch is laid out `[chunks | entities |
//! relationships]` so returned vectors align positionally.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use trellis_adapters::{
    Chunk, Chunker, Converter, Embedder, Extractor, Fetcher, OpContext, ProgressStage,
    ProgressStatus, Source, detect_converter,
};
use trellis_stores::{
    DocumentFilter, GraphNode, GraphRelationship, GraphStore, KvStore, SavedExtraction,
    VectorDocument, VectorStore, canonical_entity_id, canonical_relationship_id,
};

use crate::engine::Engine;
use crate::error::{EngineError, Result, Subsystem};
use crate::naming::{self, CollectionNames};
use crate::options::UpsertOptions;
use crate::payload::{self, ChunkDetails, DOC_TYPE_CHUNK};

/// A set of chunks ready for the persistence stages (steps 6-11).
pub(crate) struct ChunkBatch {
    pub doc_id: String,
    pub collection_id: String,
    pub names: CollectionNames,
    pub chunks: Vec<Chunk>,
    pub source_file: String,
    pub user_metadata: Map<String, Value>,
    pub convert_metadata: Map<String, Value>,
    /// Origin text to embed into chunk payloads when no key/value store is
    /// configured.
    pub origin_in_payload: Option<String>,
    /// Whether prior chunk rows of the document are replaced.
    pub replace_prior_chunks: bool,
}

/// What a persistence pass wrote.
pub(crate) struct IngestOutcome {
    pub chunk_ids: Vec<String>,
    pub entities: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
}

/// Canonical extraction attached to one chunk.
struct ChunkExtraction {
    entities: Vec<String>,
    relationships: Vec<String>,
    model: String,
}

impl Engine {
    /// Ingest a file.
    pub async fn add_file(
        &self,
        path: impl AsRef<Path>,
        options: UpsertOptions,
    ) -> Result<String> {
        self.add(Source::File(path.as_ref().to_path_buf()), options)
            .await
    }

    /// Ingest raw text.
    pub async fn add_text(&self, text: impl Into<String>, options: UpsertOptions) -> Result<String> {
        self.add(Source::Text(text.into()), options).await
    }

    /// Ingest the resource behind a URL.
    pub async fn add_url(&self, url: impl Into<String>, options: UpsertOptions) -> Result<String> {
        self.add(Source::Url(url.into()), options).await
    }

    /// Ingest an in-memory byte stream.
    pub async fn add_stream<R>(
        &self,
        mut reader: R,
        content_type: Option<String>,
        options: UpsertOptions,
    ) -> Result<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        self.add(Source::Stream { data, content_type }, options)
            .await
    }

    /// Ingest an opaque source. Returns the document id.
    pub async fn add(&self, source: Source, options: UpsertOptions) -> Result<String> {
        let (collection_id, doc_id) = resolve_document_identity(&options)?;
        let names = naming::names(&collection_id);
        let ctx = self.op_context(&doc_id, &options);

        let embedder = self.resolve_embedder(&options)?;
        let extractor = self.resolve_extractor(&options, true)?;

        // URL sources are materialized through the fetcher first.
        let source = match source {
            Source::Url(url) => {
                let fetcher = self.resolve_fetcher(&options);
                let fetched = fetcher
                    .fetch(&url, &ctx)
                    .await
                    .map_err(EngineError::adapter(ProgressStage::Fetcher))?;
                Source::Stream {
                    data: fetched.data,
                    content_type: fetched.content_type,
                }
            }
            source => source,
        };

        let source_file = source.describe();
        let converter = options
            .converter
            .clone()
            .or_else(|| detect_converter(&source))
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "no converter available for source {source_file}"
                ))
            })?;

        let converted = converter
            .convert(&source, &ctx)
            .await
            .map_err(EngineError::adapter(ProgressStage::Converter))?;

        self.ensure_backing(&names, embedder.dimension()).await?;

        // Origin text goes to the key/value store when one exists, and into
        // chunk payloads otherwise.
        let origin_in_payload = match &self.kv {
            Some(kv) => {
                kv.set(&naming::origin_key(&doc_id), &converted.text)
                    .await
                    .map_err(EngineError::store(Subsystem::KeyValue))?;
                None
            }
            None => Some(converted.text.clone()),
        };

        ctx.started(ProgressStage::Chunking);
        let chunker = self.resolve_chunker(&options);
        let mut chunks: Vec<Chunk> = Vec::new();
        chunker
            .chunk(&converted.text, &options.chunking, &mut |chunk| {
                chunks.push(chunk);
            })
            .map_err(EngineError::adapter(ProgressStage::Chunking))?;
        assign_document_ids(&doc_id, &mut chunks);
        ctx.emit(
            ProgressStage::Chunking,
            ProgressStatus::Progress,
            Some(1.0),
            Some(format!("{} chunks", chunks.len())),
        );
        ctx.completed(ProgressStage::Chunking);

        let batch = ChunkBatch {
            doc_id: doc_id.clone(),
            collection_id,
            names,
            chunks,
            source_file,
            user_metadata: options.user_metadata.clone(),
            convert_metadata: converted.metadata,
            origin_in_payload,
            replace_prior_chunks: true,
        };

        let outcome = self.persist_chunks(batch, embedder, extractor, &ctx).await?;
        info!(
            "ingested {doc_id}: {} chunks, {} entities, {} relationships",
            outcome.chunk_ids.len(),
            outcome.entities.len(),
            outcome.relationships.len()
        );
        Ok(doc_id)
    }

    /// Steps 6-11 of the pipeline: extract from root chunks, persist to the
    /// graph, embed everything in one aligned batch, upsert vector rows, and
    /// seed segment metadata.
    pub(crate) async fn persist_chunks(
        &self,
        batch: ChunkBatch,
        embedder: Arc<dyn Embedder>,
        extractor: Option<Arc<dyn Extractor>>,
        ctx: &OpContext,
    ) -> Result<IngestOutcome> {
        ctx.checkpoint()
            .map_err(|_| EngineError::Cancelled)?;
        let roots: Vec<Chunk> = batch.chunks.iter().filter(|c| c.root).cloned().collect();

        let mut saved = SavedExtraction::default();
        let mut chunk_extractions: HashMap<String, ChunkExtraction> = HashMap::new();

        if let (Some(graph), Some(extractor)) = (&self.graph, &extractor) {
            if !roots.is_empty() {
                let texts: Vec<String> = roots.iter().map(|c| c.text.clone()).collect();
                let results = extractor
                    .extract(&texts, ctx)
                    .await
                    .map_err(EngineError::adapter(ProgressStage::Extraction))?;
                if results.len() != roots.len() {
                    return Err(EngineError::Inconsistency(format!(
                        "extractor returned {} results for {} root chunks",
                        results.len(),
                        roots.len()
                    )));
                }

                // Stamp provenance on every node and relationship, then let
                // the graph store deduplicate identities.
                let mut nodes: Vec<GraphNode> = Vec::new();
                let mut relationships: Vec<GraphRelationship> = Vec::new();
                let mut node_fallback: HashMap<String, (String, String)> = HashMap::new();
                let mut rel_fallback: HashMap<String, (String, String, String)> = HashMap::new();
                let mut pending: Vec<(String, Vec<String>, Vec<String>, String)> = Vec::new();

                for (root, result) in roots.iter().zip(results.into_iter()) {
                    let mut node_inputs = Vec::new();
                    let mut rel_inputs = Vec::new();

                    for node in &result.nodes {
                        node_fallback
                            .insert(node.id.clone(), (node.name.clone(), node.node_type.clone()));
                        node_inputs.push(node.id.clone());
                        nodes.push(GraphNode {
                            id: node.id.clone(),
                            name: node.name.clone(),
                            node_type: node.node_type.clone(),
                            description: node.description.clone(),
                            confidence: node.confidence,
                            source_documents: vec![batch.doc_id.clone()],
                            source_chunks: vec![root.id.clone()],
                        });
                    }

                    for (i, rel) in result.relationships.iter().enumerate() {
                        let resolves = result.nodes.iter().any(|n| n.id == rel.start)
                            && result.nodes.iter().any(|n| n.id == rel.end);
                        if !resolves {
                            // Inconsistent extraction: the relationship is
                            // rejected, its entities are kept.
                            warn!(
                                "dropping relationship {}-[{}]->{}: endpoint missing from result",
                                rel.start, rel.rel_type, rel.end
                            );
                            continue;
                        }

                        let input_id = format!("{}#r{i}", root.id);
                        rel_fallback.insert(
                            input_id.clone(),
                            (rel.start.clone(), rel.rel_type.clone(), rel.end.clone()),
                        );
                        rel_inputs.push(input_id.clone());
                        relationships.push(GraphRelationship {
                            id: input_id,
                            start: rel.start.clone(),
                            end: rel.end.clone(),
                            rel_type: rel.rel_type.clone(),
                            description: rel.description.clone(),
                            confidence: rel.confidence,
                            weight: rel.weight,
                            source_documents: vec![batch.doc_id.clone()],
                            source_chunks: vec![root.id.clone()],
                        });
                    }

                    pending.push((root.id.clone(), node_inputs, rel_inputs, result.model));
                }

                saved = graph
                    .save_extraction_results(&batch.names.graph, nodes, relationships)
                    .await
                    .map_err(EngineError::store(Subsystem::Graph))?;

                // Rewrite every reference with the canonical ids the graph
                // store decided on. A missing mapping falls back to local
                // canonicalization of the same identity.
                for (chunk_id, node_inputs, rel_inputs, model) in pending {
                    let entities = dedup_preserving(
                        node_inputs
                            .iter()
                            .map(|input| canonical_node_id(&saved, &node_fallback, input))
                            .collect(),
                    );
                    let relationships = dedup_preserving(
                        rel_inputs
                            .iter()
                            .map(|input| {
                                canonical_rel_id(&saved, &node_fallback, &rel_fallback, input)
                            })
                            .collect(),
                    );
                    chunk_extractions.insert(
                        chunk_id,
                        ChunkExtraction {
                            entities,
                            relationships,
                            model,
                        },
                    );
                }
            }
        }

        // Unified embedding batch: [chunks | entities | relationships].
        let chunk_count = batch.chunks.len();
        let mut texts: Vec<String> = batch.chunks.iter().map(|c| c.text.clone()).collect();
        texts.extend(saved.entities.iter().map(payload::entity_text));
        texts.extend(saved.relationships.iter().map(payload::relationship_text));

        let vectors = embedder
            .embed(&texts, ctx)
            .await
            .map_err(EngineError::adapter(ProgressStage::Embedding))?;
        if vectors.len() != texts.len() {
            return Err(EngineError::Inconsistency(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        ctx.checkpoint()
            .map_err(|_| EngineError::Cancelled)?;

        // created_at must never regress across upserts.
        let mut row_ids: Vec<String> = batch.chunks.iter().map(|c| c.id.clone()).collect();
        row_ids.extend(saved.entities.iter().map(|n| payload::entity_row_id(&n.id)));
        row_ids.extend(
            saved
                .relationships
                .iter()
                .map(|r| payload::relationship_row_id(&r.id)),
        );
        let existing = self
            .vector
            .get_documents(&batch.names.vector, &row_ids, true)
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;
        let created_at: HashMap<String, String> = existing
            .iter()
            .map(|doc| {
                (
                    doc.id.clone(),
                    payload::preserved_created_at(Some(&doc.metadata)),
                )
            })
            .collect();

        if batch.replace_prior_chunks {
            let filter =
                DocumentFilter::by_doc_id(&batch.doc_id).with_document_type(DOC_TYPE_CHUNK);
            let removed = self
                .vector
                .delete_documents(&batch.names.vector, &filter)
                .await
                .map_err(EngineError::store(Subsystem::Vector))?;
            if removed > 0 {
                debug!("replaced {removed} prior chunk rows of {}", batch.doc_id);
            }
        }

        let mut documents: Vec<VectorDocument> = Vec::with_capacity(texts.len());
        for (i, chunk) in batch.chunks.iter().enumerate() {
            let mut details = ChunkDetails::from_chunk(chunk);
            if let Some(extraction) = chunk_extractions.get(&chunk.id) {
                details.entities = extraction.entities.clone();
                details.relationships = extraction.relationships.clone();
                details.extraction_model = Some(extraction.model.clone());
                details.extracted = true;
            }
            let payload = payload::chunk_payload(
                &batch.doc_id,
                &batch.collection_id,
                &batch.source_file,
                &details,
                &batch.user_metadata,
                &batch.convert_metadata,
                created_at
                    .get(&chunk.id)
                    .cloned()
                    .unwrap_or_else(payload::now),
                batch.origin_in_payload.as_deref(),
            );
            documents.push(VectorDocument::new(
                chunk.id.clone(),
                chunk.text.clone(),
                vectors[i].clone(),
                payload,
            ));
        }

        for (j, node) in saved.entities.iter().enumerate() {
            let row_id = payload::entity_row_id(&node.id);
            let slot = chunk_count + j;
            documents.push(VectorDocument::new(
                row_id.clone(),
                texts[slot].clone(),
                vectors[slot].clone(),
                payload::entity_payload(
                    node,
                    &batch.collection_id,
                    &batch.user_metadata,
                    created_at.get(&row_id).cloned().unwrap_or_else(payload::now),
                ),
            ));
        }

        let rel_base = chunk_count + saved.entities.len();
        for (j, relationship) in saved.relationships.iter().enumerate() {
            let row_id = payload::relationship_row_id(&relationship.id);
            let slot = rel_base + j;
            documents.push(VectorDocument::new(
                row_id.clone(),
                texts[slot].clone(),
                vectors[slot].clone(),
                payload::relationship_payload(
                    relationship,
                    &batch.collection_id,
                    &batch.user_metadata,
                    created_at.get(&row_id).cloned().unwrap_or_else(payload::now),
                ),
            ));
        }

        self.vector
            .add_documents(&batch.names.vector, documents, true, self.batch_size)
            .await
            .map_err(EngineError::store(Subsystem::Vector))?;

        // Seed per-segment metadata; never overwrite existing values.
        if let Some(kv) = &self.kv {
            for chunk in &batch.chunks {
                kv.set_if_absent(&naming::vote_key(&batch.doc_id, &chunk.id), "0")
                    .await
                    .map_err(EngineError::store(Subsystem::KeyValue))?;
                kv.set_if_absent(&naming::score_key(&batch.doc_id, &chunk.id), "0.0")
                    .await
                    .map_err(EngineError::store(Subsystem::KeyValue))?;
                kv.set_if_absent(&naming::weight_key(&batch.doc_id, &chunk.id), "0.0")
                    .await
                    .map_err(EngineError::store(Subsystem::KeyValue))?;
            }
        }

        Ok(IngestOutcome {
            chunk_ids: batch.chunks.into_iter().map(|c| c.id).collect(),
            entities: saved.entities,
            relationships: saved.relationships,
        })
    }
}

/// Canonical id for an input node id, with local fallback.
fn canonical_node_id(
    saved: &SavedExtraction,
    fallback: &HashMap<String, (String, String)>,
    input: &str,
) -> String {
    if let Some(canonical) = saved.entity_id(input) {
        return canonical.to_string();
    }
    match fallback.get(input) {
        Some((name, node_type)) => canonical_entity_id(name, node_type),
        None => input.to_string(),
    }
}

/// Canonical id for an input relationship id, with local fallback.
fn canonical_rel_id(
    saved: &SavedExtraction,
    node_fallback: &HashMap<String, (String, String)>,
    rel_fallback: &HashMap<String, (String, String, String)>,
    input: &str,
) -> String {
    if let Some(canonical) = saved.relationship_id(input) {
        return canonical.to_string();
    }
    match rel_fallback.get(input) {
        Some((start, rel_type, end)) => {
            let start = canonical_node_id(saved, node_fallback, start);
            let end = canonical_node_id(saved, node_fallback, end);
            canonical_relationship_id(&start, rel_type, &end)
        }
        None => input.to_string(),
    }
}

/// Resolve the collection and document id from the options.
///
/// A given doc id is authoritative: its prefix selects the collection and
/// must agree with an explicitly selected one.
fn resolve_document_identity(options: &UpsertOptions) -> Result<(String, String)> {
    match &options.doc_id {
        Some(doc_id) => {
            if doc_id.is_empty() {
                return Err(EngineError::Validation("empty doc id".to_string()));
            }
            let derived = naming::extract_collection_id(doc_id).to_string();
            if options.collection_id != naming::DEFAULT_COLLECTION
                && options.collection_id != derived
            {
                return Err(EngineError::Validation(format!(
                    "doc id {doc_id:?} does not belong to collection {:?}",
                    options.collection_id
                )));
            }
            naming::validate_collection_id(&derived)?;
            Ok((derived, doc_id.clone()))
        }
        None => {
            naming::validate_collection_id(&options.collection_id)?;
            Ok((
                options.collection_id.clone(),
                naming::gen_doc_id(&options.collection_id),
            ))
        }
    }
}

/// Replace chunker-assigned ids with stable document-derived ids, keeping
/// parent references intact.
fn assign_document_ids(doc_id: &str, chunks: &mut [Chunk]) {
    let mapping: HashMap<String, String> = chunks
        .iter()
        .map(|chunk| (chunk.id.clone(), format!("{doc_id}_c{}", chunk.index)))
        .collect();

    for chunk in chunks.iter_mut() {
        if let Some(new_id) = mapping.get(&chunk.id) {
            chunk.id = new_id.clone();
        }
        if let Some(parent) = chunk.parent_id.take() {
            chunk.parent_id = mapping.get(&parent).cloned();
        }
    }
}

/// Order-preserving dedup.
fn dedup_preserving(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
