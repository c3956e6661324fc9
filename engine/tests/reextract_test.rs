//! Per-segment re-extraction.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{ScriptedExtractor, harness, options};
use trellis_adapters::{ExtractedNode, ExtractedRelationship, ExtractionResult};
use trellis_engine::EngineError;
use trellis_stores::{GraphStore, canonical_entity_id};

fn scripted_result() -> ExtractionResult {
    ExtractionResult {
        nodes: vec![
            ExtractedNode {
                id: "n1".to_string(),
                name: "John".to_string(),
                node_type: "Person".to_string(),
                description: "subject".to_string(),
                confidence: 0.9,
            },
            ExtractedNode {
                id: "n2".to_string(),
                name: "Chess".to_string(),
                node_type: "Hobby".to_string(),
                description: String::new(),
                confidence: 0.7,
            },
        ],
        relationships: vec![ExtractedRelationship {
            start: "n1".to_string(),
            end: "n2".to_string(),
            rel_type: "PLAYS".to_string(),
            description: String::new(),
            confidence: 0.7,
            weight: None,
        }],
        model: "scripted/v2".to_string(),
    }
}

#[tokio::test]
async fn test_reextract_merges_into_graph() {
    let h = harness();
    h.engine
        .add_segments(
            "c1_d1",
            &[trellis_engine::SegmentText::with_id("s1", "John works at Acme.")],
            options("c1"),
        )
        .await
        .unwrap();

    let graph = h
        .engine
        .extract_segment_graph(
            "c1_d1",
            "s1",
            options("c1").with_extractor(Arc::new(ScriptedExtractor::new(vec![
                scripted_result(),
            ]))),
        )
        .await
        .unwrap();

    assert_eq!(graph.entities.len(), 2);
    assert_eq!(graph.relationships.len(), 1);

    // The new extraction merged by identity; prior contributions remain.
    let john = canonical_entity_id("John", "Person");
    let nodes = h.graph.get_nodes("c1", &[john]).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].source_chunks, vec!["s1"]);

    let acme = canonical_entity_id("Acme", "Organization");
    assert_eq!(h.graph.get_nodes("c1", &[acme]).await.unwrap().len(), 1);

    let chess = canonical_entity_id("Chess", "Hobby");
    assert_eq!(h.graph.get_nodes("c1", &[chess]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reextract_patches_segment_payload() {
    let h = harness();
    h.engine
        .add_segments(
            "c1_d1",
            &[trellis_engine::SegmentText::with_id("s1", "Nothing to see here")],
            options("c1"),
        )
        .await
        .unwrap();

    h.engine
        .extract_segment_graph(
            "c1_d1",
            "s1",
            options("c1").with_extractor(Arc::new(ScriptedExtractor::new(vec![
                scripted_result(),
            ]))),
        )
        .await
        .unwrap();

    let segment = h.engine.get_segment("c1", "s1").await.unwrap();
    let details = &segment.metadata["chunk_details"];
    assert_eq!(details["extraction_model"], "scripted/v2");
    assert_eq!(details["extracted"], true);

    let entities = details["entities"].as_array().unwrap();
    assert_eq!(entities.len(), 2);

    // The embedding was untouched: search still finds the original text.
    let found = h.engine.get_segment("c1", "s1").await.unwrap();
    assert_eq!(found.text, "Nothing to see here");

    // The graph view resolves the recorded canonical ids.
    let attached = h.engine.get_segment_graph("c1_d1", "s1").await.unwrap();
    assert_eq!(attached.entities.len(), 2);
    assert_eq!(attached.relationships.len(), 1);
}

#[tokio::test]
async fn test_reextract_requires_graph() {
    let vector = Arc::new(trellis_stores::MemoryVectorStore::new());
    let engine = trellis_engine::Engine::builder(vector)
        .with_embedder(Arc::new(trellis_adapters::HashEmbedder::new(8)))
        .build();

    let result = engine
        .extract_segment_graph("c1_d1", "s1", options("c1"))
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn test_reextract_unknown_segment() {
    let h = harness();
    h.engine
        .add_segments(
            "c1_d1",
            &[trellis_engine::SegmentText::with_id("s1", "text")],
            options("c1"),
        )
        .await
        .unwrap();

    let result = h
        .engine
        .extract_segment_graph("c1_d1", "missing", options("c1"))
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));

    // A segment of another document is not reachable through this doc id.
    let result = h
        .engine
        .extract_segment_graph("c1_other", "s1", options("c1"))
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_inconsistent_relationship_rejected_entities_kept() {
    let h = harness();
    h.engine
        .add_segments(
            "c1_d1",
            &[trellis_engine::SegmentText::with_id("s1", "text")],
            options("c1"),
        )
        .await
        .unwrap();

    let broken = ExtractionResult {
        nodes: vec![ExtractedNode {
            id: "n1".to_string(),
            name: "Solo".to_string(),
            node_type: String::new(),
            description: String::new(),
            confidence: 0.9,
        }],
        relationships: vec![ExtractedRelationship {
            start: "n1".to_string(),
            end: "ghost".to_string(),
            rel_type: "KNOWS".to_string(),
            description: String::new(),
            confidence: 0.9,
            weight: None,
        }],
        model: "scripted/v2".to_string(),
    };

    let graph = h
        .engine
        .extract_segment_graph(
            "c1_d1",
            "s1",
            options("c1").with_extractor(Arc::new(ScriptedExtractor::new(vec![broken]))),
        )
        .await
        .unwrap();

    assert_eq!(graph.entities.len(), 1);
    assert!(graph.relationships.is_empty());
    assert_eq!(
        h.graph
            .get_nodes("c1", &["solo".to_string()])
            .await
            .unwrap()
            .len(),
        1
    );
}
