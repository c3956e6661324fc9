//! Segment add / update / remove and per-segment scoring.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{harness, options};
use trellis_engine::{EngineError, SegmentText};
use trellis_stores::{
    GraphStore, KvStore, VectorStore, canonical_entity_id, canonical_relationship_id,
};

#[tokio::test]
async fn test_add_segments_empty() {
    let h = harness();
    let ids = h
        .engine
        .add_segments("c1_d1", &[], options("c1"))
        .await
        .unwrap();
    assert!(ids.is_empty());
}

#[tokio::test]
async fn test_add_segments_roundtrip() {
    let h = harness();

    let ids = h
        .engine
        .add_segments(
            "c1_d1",
            &[
                SegmentText::with_id("s1", "John works at Acme."),
                SegmentText::new("Mary lives in Paris."),
            ],
            options("c1"),
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], "s1");

    let segment = h.engine.get_segment("c1", "s1").await.unwrap();
    assert_eq!(segment.doc_id, "c1_d1");
    assert_eq!(segment.text, "John works at Acme.");

    // Segments are zero-conversion ingests: extraction ran on each.
    let john = canonical_entity_id("John", "Person");
    let nodes = h.graph.get_nodes("c1", &[john]).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].source_chunks, vec!["s1"]);

    // Scoring defaults were seeded.
    assert_eq!(
        h.kv.get("segment_vote_c1_d1_s1").await.unwrap().as_deref(),
        Some("0")
    );
}

#[tokio::test]
async fn test_segment_listing_and_paging() {
    let h = harness();
    h.engine
        .add_segments(
            "c1_d1",
            &[
                SegmentText::with_id("s1", "first segment"),
                SegmentText::with_id("s2", "second segment"),
                SegmentText::with_id("s3", "third segment"),
            ],
            options("c1"),
        )
        .await
        .unwrap();

    let all = h.engine.get_segments("c1_d1").await.unwrap();
    assert_eq!(
        all.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["s1", "s2", "s3"]
    );

    let page = h
        .engine
        .list_segments("c1_d1", Some(1), 1)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "s2");
}

#[tokio::test]
async fn test_update_segments_requires_ids() {
    let h = harness();

    let result = h
        .engine
        .update_segments(&[SegmentText::new("no id")], options("c1"))
        .await;

    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn test_update_segments_missing_id_fails_without_writes() {
    let h = harness();
    h.engine
        .add_segments(
            "c1_d1",
            &[SegmentText::with_id("s1", "John works at Acme.")],
            options("c1"),
        )
        .await
        .unwrap();

    let result = h
        .engine
        .update_segments(
            &[
                SegmentText::with_id("s1", "changed"),
                SegmentText::with_id("missing", "changed"),
            ],
            options("c1"),
        )
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));

    // Nothing was touched: the original extraction is intact.
    let john = canonical_entity_id("John", "Person");
    let nodes = h.graph.get_nodes("c1", &[john]).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(h.engine.get_segment("c1", "s1").await.unwrap().text, "John works at Acme.");
}

#[tokio::test]
async fn test_update_segment_replaces_graph_contributions() {
    let h = harness();

    // Two documents mention John; only d1 mentions Acme.
    h.engine
        .add_segments(
            "c1_d1",
            &[SegmentText::with_id("s1", "John works at Acme.")],
            options("c1"),
        )
        .await
        .unwrap();
    h.engine
        .add_segments(
            "c1_d2",
            &[SegmentText::with_id("s2", "John lives in Paris.")],
            options("c1"),
        )
        .await
        .unwrap();

    let updated = h
        .engine
        .update_segments(
            &[SegmentText::with_id("s1", "John lives in Berlin.")],
            options("c1"),
        )
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let john = canonical_entity_id("John", "Person");
    let acme = canonical_entity_id("Acme", "Organization");
    let berlin = canonical_entity_id("Berlin", "Location");

    // Acme had no chunks left and is gone, from both stores.
    assert!(h.graph.get_nodes("c1", &[acme.clone()]).await.unwrap().is_empty());
    assert!(h
        .vector
        .get_documents("c1", &[format!("entity:{acme}")], false)
        .await
        .unwrap()
        .is_empty());

    // Berlin was created with the segment as provenance.
    let nodes = h.graph.get_nodes("c1", &[berlin.clone()]).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].source_chunks, vec!["s1"]);

    let lives_in = canonical_relationship_id(&john, "LIVES_IN", &berlin);
    let rels = h.graph.get_relationships("c1", &[lives_in]).await.unwrap();
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].source_chunks, vec!["s1"]);

    // John keeps s2 and regains s1 from the re-ingest.
    let john_node = &h.graph.get_nodes("c1", &[john]).await.unwrap()[0];
    assert!(john_node.source_chunks.contains(&"s1".to_string()));
    assert!(john_node.source_chunks.contains(&"s2".to_string()));

    // The segment row was rewritten.
    let segment = h.engine.get_segment("c1", "s1").await.unwrap();
    assert_eq!(segment.text, "John lives in Berlin.");
}

#[tokio::test]
async fn test_update_equals_remove_then_add() {
    // P7: update_segments must leave provenance identical to
    // remove_segments + add_segments with the same inputs.
    let setup = |text: &'static str| async move {
        let h = harness();
        h.engine
            .add_segments(
                "c1_d1",
                &[SegmentText::with_id("s1", text)],
                options("c1"),
            )
            .await
            .unwrap();
        h.engine
            .add_segments(
                "c1_d2",
                &[SegmentText::with_id("s2", "John lives in Paris.")],
                options("c1"),
            )
            .await
            .unwrap();
        h
    };

    let updated = setup("John works at Acme.").await;
    updated
        .engine
        .update_segments(
            &[SegmentText::with_id("s1", "John lives in Berlin.")],
            options("c1"),
        )
        .await
        .unwrap();

    let replaced = setup("John works at Acme.").await;
    replaced
        .engine
        .remove_segments("c1", &["s1".to_string()])
        .await
        .unwrap();
    replaced
        .engine
        .add_segments(
            "c1_d1",
            &[SegmentText::with_id("s1", "John lives in Berlin.")],
            options("c1"),
        )
        .await
        .unwrap();

    for id in [
        canonical_entity_id("John", "Person"),
        canonical_entity_id("Berlin", "Location"),
        canonical_entity_id("Paris", "Location"),
    ] {
        let a = updated.graph.get_nodes("c1", &[id.clone()]).await.unwrap();
        let b = replaced.graph.get_nodes("c1", &[id.clone()]).await.unwrap();
        assert_eq!(a.len(), b.len(), "presence of {id} differs");
        if let (Some(a), Some(b)) = (a.first(), b.first()) {
            let sorted = |mut v: Vec<String>| {
                v.sort();
                v
            };
            assert_eq!(
                sorted(a.source_documents.clone()),
                sorted(b.source_documents.clone()),
                "source_documents of {id} differ"
            );
            assert_eq!(
                sorted(a.source_chunks.clone()),
                sorted(b.source_chunks.clone()),
                "source_chunks of {id} differ"
            );
        }
    }
}

#[tokio::test]
async fn test_remove_segments() {
    let h = harness();
    h.engine
        .add_segments(
            "c1_d1",
            &[
                SegmentText::with_id("s1", "John works at Acme."),
                SegmentText::with_id("s2", "Keep this one."),
            ],
            options("c1"),
        )
        .await
        .unwrap();

    let removed = h
        .engine
        .remove_segments("c1", &["s1".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 1);

    assert!(h.engine.get_segment("c1", "s1").await.is_err());
    assert!(h.engine.get_segment("c1", "s2").await.is_ok());

    // Graph contributions of s1 are gone.
    let john = canonical_entity_id("John", "Person");
    assert!(h.graph.get_nodes("c1", &[john]).await.unwrap().is_empty());

    // Its scoring keys too.
    assert!(h.kv.get("segment_vote_c1_d1_s1").await.unwrap().is_none());
    assert!(h.kv.get("segment_vote_c1_d1_s2").await.unwrap().is_some());
}

#[tokio::test]
async fn test_remove_segments_by_doc() {
    let h = harness();
    h.engine
        .add_segments(
            "c1_d1",
            &[
                SegmentText::with_id("s1", "one"),
                SegmentText::with_id("s2", "two"),
            ],
            options("c1"),
        )
        .await
        .unwrap();

    let removed = h.engine.remove_segments_by_doc("c1_d1").await.unwrap();
    assert_eq!(removed, 2);
    assert!(h.engine.get_segments("c1_d1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_segment_operations_reject_missing_adapters() {
    // Segment paths never auto-detect a graph extractor.
    let vector = Arc::new(trellis_stores::MemoryVectorStore::new());
    let graph = Arc::new(trellis_stores::MemoryGraphStore::new());
    let engine = trellis_engine::Engine::builder(vector)
        .with_graph_store(graph)
        .with_embedder(Arc::new(trellis_adapters::HashEmbedder::new(8)))
        .build();

    let result = engine
        .add_segments(
            "c1_d1",
            &[SegmentText::new("text")],
            options("c1"),
        )
        .await;

    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn test_vote_score_weight_updates() {
    let h = harness();
    h.engine
        .add_segments(
            "c1_d1",
            &[SegmentText::with_id("s1", "text")],
            options("c1"),
        )
        .await
        .unwrap();

    h.engine
        .update_vote("c1", &[("s1".to_string(), 3)])
        .await
        .unwrap();
    h.engine
        .update_score("c1", &[("s1".to_string(), 0.75)])
        .await
        .unwrap();
    h.engine
        .update_weight("c1", &[("s1".to_string(), 1.5)])
        .await
        .unwrap();

    assert_eq!(
        h.kv.get("segment_vote_c1_d1_s1").await.unwrap().as_deref(),
        Some("3")
    );
    assert_eq!(
        h.kv.get("segment_score_c1_d1_s1").await.unwrap().as_deref(),
        Some("0.75")
    );
    assert_eq!(
        h.kv.get("segment_weight_c1_d1_s1").await.unwrap().as_deref(),
        Some("1.5")
    );
}

#[tokio::test]
async fn test_vote_update_unknown_segment() {
    let h = harness();
    let result = h
        .engine
        .update_vote("c1", &[("missing".to_string(), 1)])
        .await;
    assert!(matches!(result, Err(_)));
}
