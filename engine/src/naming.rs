//! Identity and naming.
//!
//! A single `collection_id` deterministically derives the names of all three
//! backing stores, and is encoded as a prefix of every `doc_id`. This
//! derivation is the sole synchronization between layers: every component
//! that decides where to read or write goes through it.

use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Delimiter between the collection prefix and the document token.
///
/// Collection ids must not contain it, which keeps extraction unambiguous
/// for every id accepted by the three stores.
pub const COLLECTION_DELIMITER: char = '_';

/// Collection used when a doc id carries no prefix.
pub const DEFAULT_COLLECTION: &str = "default";

/// Names of the three backing stores of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNames {
    /// Vector collection name.
    pub vector: String,

    /// Graph name.
    pub graph: String,

    /// Key prefix for the key/value store.
    pub store_prefix: String,
}

/// Derive the backing names for a collection. Pure and total.
pub fn names(collection_id: &str) -> CollectionNames {
    CollectionNames {
        vector: collection_id.to_string(),
        graph: collection_id.to_string(),
        store_prefix: collection_id.to_string(),
    }
}

/// Extract the collection id encoded in a doc id.
///
/// The prefix is everything before the first delimiter; an absent or empty
/// prefix means [`DEFAULT_COLLECTION`].
pub fn extract_collection_id(doc_id: &str) -> &str {
    match doc_id.split_once(COLLECTION_DELIMITER) {
        Some((prefix, _)) if !prefix.is_empty() => prefix,
        _ => DEFAULT_COLLECTION,
    }
}

/// Generate a fresh doc id under a collection.
pub fn gen_doc_id(collection_id: &str) -> String {
    format!(
        "{collection_id}{COLLECTION_DELIMITER}{}",
        Uuid::new_v4().simple()
    )
}

/// Validate a collection id: non-empty, free of the delimiter, and limited
/// to characters accepted by all three stores.
pub fn validate_collection_id(collection_id: &str) -> Result<()> {
    if collection_id.is_empty() {
        return Err(EngineError::Validation("empty collection id".to_string()));
    }
    if !collection_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(EngineError::Validation(format!(
            "invalid collection id {collection_id:?}: only ASCII alphanumerics and '-' are allowed"
        )));
    }
    Ok(())
}

/// Key of a document's origin text.
pub fn origin_key(doc_id: &str) -> String {
    format!("origin:{doc_id}")
}

/// Key of a segment's vote.
pub fn vote_key(doc_id: &str, segment_id: &str) -> String {
    format!("segment_vote_{doc_id}_{segment_id}")
}

/// Key of a segment's score.
pub fn score_key(doc_id: &str, segment_id: &str) -> String {
    format!("segment_score_{doc_id}_{segment_id}")
}

/// Key of a segment's weight.
pub fn weight_key(doc_id: &str, segment_id: &str) -> String {
    format!("segment_weight_{doc_id}_{segment_id}")
}

/// Key of a collection's metadata record.
pub fn collection_key(collection_id: &str) -> String {
    format!("collection:{collection_id}")
}

/// Key prefixes owned by a collection, used for bulk cleanup and backup.
///
/// Each prefix ends in the delimiter so `c1` never shadows `c10`. The exact
/// [`collection_key`] is handled separately by callers for the same reason.
pub fn collection_prefixes(collection_id: &str) -> Vec<String> {
    vec![
        format!("origin:{collection_id}{COLLECTION_DELIMITER}"),
        format!("segment_vote_{collection_id}{COLLECTION_DELIMITER}"),
        format!("segment_score_{collection_id}{COLLECTION_DELIMITER}"),
        format!("segment_weight_{collection_id}{COLLECTION_DELIMITER}"),
    ]
}

/// Segment-metadata key prefixes owned by one document. The origin key is
/// exact and handled separately; a bare doc id would shadow longer ids.
pub fn document_segment_prefixes(doc_id: &str) -> Vec<String> {
    vec![
        format!("segment_vote_{doc_id}{COLLECTION_DELIMITER}"),
        format!("segment_score_{doc_id}{COLLECTION_DELIMITER}"),
        format!("segment_weight_{doc_id}{COLLECTION_DELIMITER}"),
    ]
}
