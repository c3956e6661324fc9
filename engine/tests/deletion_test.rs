//! Document removal and provenance reclamation.

mod common;

use pretty_assertions::assert_eq;

use common::{harness, options, vector_only_harness};
use trellis_stores::{
    DocumentFilter, GraphStore, KvStore, VectorStore, canonical_entity_id,
    canonical_relationship_id,
};

#[tokio::test]
async fn test_remove_empty_list() {
    let h = harness();
    assert_eq!(h.engine.remove_docs(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_shared_entity_survives_removal() {
    let h = harness();
    h.engine
        .add_text("John works at Acme.", options("c1").with_doc_id("c1_d1"))
        .await
        .unwrap();
    h.engine
        .add_text("John lives in Paris.", options("c1").with_doc_id("c1_d2"))
        .await
        .unwrap();

    let processed = h
        .engine
        .remove_docs(&["c1_d1".to_string()])
        .await
        .unwrap();
    assert_eq!(processed, 1);

    let john = canonical_entity_id("John", "Person");
    let acme = canonical_entity_id("Acme", "Organization");
    let works_at = canonical_relationship_id(&john, "WORKS_AT", &acme);

    // John survives on d2's contribution alone.
    let nodes = h.graph.get_nodes("c1", &[john.clone()]).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].source_documents, vec!["c1_d2"]);

    // Acme and the relationship lost their last document.
    assert!(h.graph.get_nodes("c1", &[acme.clone()]).await.unwrap().is_empty());
    assert!(h
        .graph
        .get_relationships("c1", &[works_at.clone()])
        .await
        .unwrap()
        .is_empty());

    // Vector rows follow: John's row is trimmed, the others are gone.
    let john_rows = h
        .vector
        .get_documents("c1", &[format!("entity:{john}")], true)
        .await
        .unwrap();
    assert_eq!(john_rows[0].metadata["doc_ids"], serde_json::json!(["c1_d2"]));
    assert!(h
        .vector
        .get_documents(
            "c1",
            &[format!("entity:{acme}"), format!("relationship:{works_at}")],
            false,
        )
        .await
        .unwrap()
        .is_empty());

    // All chunk rows and key/value state of d1 are gone.
    let chunks = h
        .vector
        .list_documents(
            "c1",
            &DocumentFilter::by_doc_id("c1_d1").with_document_type("chunk"),
            false,
            None,
        )
        .await
        .unwrap();
    assert!(chunks.is_empty());
    assert!(h.kv.get("origin:c1_d1").await.unwrap().is_none());
    assert!(h.kv.keys("segment_vote_c1_d1_").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_remove_returns_to_initial_state() {
    let h = harness();

    h.engine
        .add_text("John works at Acme.", options("c1").with_doc_id("c1_d1"))
        .await
        .unwrap();
    h.engine.remove_docs(&["c1_d1".to_string()]).await.unwrap();

    let rows = h
        .vector
        .list_documents("c1", &DocumentFilter::default(), false, None)
        .await
        .unwrap();
    assert!(rows.is_empty(), "leftover rows: {rows:?}");

    assert!(h
        .graph
        .nodes_by_document("c1", "c1_d1")
        .await
        .unwrap()
        .is_empty());
    assert!(h.kv.keys("origin:c1_").await.unwrap().is_empty());
    assert!(h.kv.keys("segment_").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_then_add_matches_fresh_add() {
    let h = harness();
    let opts = || options("c1").with_doc_id("c1_d1");

    h.engine.add_text("John works at Acme.", opts()).await.unwrap();
    h.engine.remove_docs(&["c1_d1".to_string()]).await.unwrap();
    h.engine.add_text("John works at Acme.", opts()).await.unwrap();

    let john = canonical_entity_id("John", "Person");
    let nodes = h.graph.get_nodes("c1", &[john]).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].source_documents, vec!["c1_d1"]);

    let segments = h.engine.get_segments("c1_d1").await.unwrap();
    assert_eq!(segments.len(), 1);
}

#[tokio::test]
async fn test_removal_groups_by_collection() {
    let h = harness();

    h.engine
        .add_text("A dog.", options("c1").with_doc_id("c1_d1"))
        .await
        .unwrap();
    h.engine
        .add_text("A cat.", options("c2").with_doc_id("c2_d1"))
        .await
        .unwrap();

    let processed = h
        .engine
        .remove_docs(&["c1_d1".to_string(), "c2_d1".to_string()])
        .await
        .unwrap();
    assert_eq!(processed, 2);

    for collection in ["c1", "c2"] {
        let rows = h
            .vector
            .list_documents(collection, &DocumentFilter::default(), false, None)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}

#[tokio::test]
async fn test_removal_without_graph_trims_rows() {
    let h = vector_only_harness();

    h.engine
        .add_text("A dog.", options("c1").with_doc_id("c1_d1"))
        .await
        .unwrap();
    h.engine.remove_docs(&["c1_d1".to_string()]).await.unwrap();

    let rows = h
        .vector
        .list_documents("c1", &DocumentFilter::default(), false, None)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_removal_of_unknown_document_counts_processed() {
    let h = harness();
    h.engine
        .add_text("A dog.", options("c1").with_doc_id("c1_d1"))
        .await
        .unwrap();

    // Unknown ids are processed best-effort without failing the call.
    let processed = h
        .engine
        .remove_docs(&["c1_unknown".to_string()])
        .await
        .unwrap();
    assert_eq!(processed, 1);

    // The known document is untouched.
    assert_eq!(h.engine.get_segments("c1_d1").await.unwrap().len(), 1);
}
