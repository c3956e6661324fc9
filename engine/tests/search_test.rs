//! Search delegation.

mod common;

use pretty_assertions::assert_eq;

use common::{harness, options};
use trellis_engine::{EngineError, SearchRequest};

#[tokio::test]
async fn test_vector_search_filters_by_type() {
    let h = harness();
    h.engine
        .add_text("John works at Acme.", options("c1").with_doc_id("c1_d1"))
        .await
        .unwrap();

    let chunks = h
        .engine
        .search_vector(
            SearchRequest::new("c1", "John").with_document_type("chunk"),
        )
        .await
        .unwrap();
    assert!(!chunks.is_empty());
    assert!(chunks
        .iter()
        .all(|hit| hit.metadata["document_type"] == "chunk"));

    let entities = h
        .engine
        .search_vector(
            SearchRequest::new("c1", "John").with_document_type("entity"),
        )
        .await
        .unwrap();
    assert!(!entities.is_empty());
    assert!(entities.iter().all(|hit| hit.id.starts_with("entity:")));
}

#[tokio::test]
async fn test_vector_search_respects_limit_and_order() {
    let h = harness();
    h.engine
        .add_text(
            "A dog barks.\n\nA cat sleeps.",
            options("c1").with_doc_id("c1_d1"),
        )
        .await
        .unwrap();

    let hits = h
        .engine
        .search_vector(SearchRequest::new("c1", "dog").with_limit(1))
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("dog"));
}

#[tokio::test]
async fn test_multi_search_preserves_request_order() {
    let h = harness();
    h.engine
        .add_text("A dog barks.", options("c1").with_doc_id("c1_d1"))
        .await
        .unwrap();
    h.engine
        .add_text("A cat sleeps.", options("c2").with_doc_id("c2_d1"))
        .await
        .unwrap();

    let results = h
        .engine
        .multi_search(vec![
            SearchRequest::new("c1", "dog"),
            SearchRequest::new("c2", "cat"),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0][0].content.contains("dog"));
    assert!(results[1][0].content.contains("cat"));
}

#[tokio::test]
async fn test_graph_search() {
    let h = harness();
    h.engine
        .add_text("John works at Acme.", options("c1").with_doc_id("c1_d1"))
        .await
        .unwrap();

    let nodes = h.engine.search_graph("c1", "acme", 10).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].name, "Acme");
}

#[tokio::test]
async fn test_graph_search_requires_graph_store() {
    let h = common::vector_only_harness();
    let result = h.engine.search_graph("c1", "x", 10).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}
