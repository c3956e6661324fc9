//! Vector payload construction.
//!
//! Every vector row carries a JSON payload identifying its document type and
//! provenance. User metadata has the lowest precedence, conversion metadata
//! sits above it, and the system fields always win.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use trellis_adapters::{Chunk, MediaPosition, TextPosition};
use trellis_stores::{GraphNode, GraphRelationship};

/// `document_type` of chunk rows.
pub const DOC_TYPE_CHUNK: &str = "chunk";

/// `document_type` of entity rows.
pub const DOC_TYPE_ENTITY: &str = "entity";

/// `document_type` of relationship rows.
pub const DOC_TYPE_RELATIONSHIP: &str = "relationship";

/// Vector row id prefix for entities.
pub const ENTITY_ID_PREFIX: &str = "entity:";

/// Vector row id prefix for relationships.
pub const RELATIONSHIP_ID_PREFIX: &str = "relationship:";

/// Vector row id of an entity.
pub fn entity_row_id(canonical_id: &str) -> String {
    format!("{ENTITY_ID_PREFIX}{canonical_id}")
}

/// Vector row id of a relationship.
pub fn relationship_row_id(canonical_id: &str) -> String {
    format!("{RELATIONSHIP_ID_PREFIX}{canonical_id}")
}

/// Embedding text of an entity: `"Name (Type): Description"`, with empty
/// parts omitted.
pub fn entity_text(node: &GraphNode) -> String {
    let mut text = node.name.clone();
    if !node.node_type.is_empty() {
        text.push_str(&format!(" ({})", node.node_type));
    }
    if !node.description.is_empty() {
        text.push_str(&format!(": {}", node.description));
    }
    text
}

/// Embedding text of a relationship: `"Start TYPE End: Description"`, with
/// the description omitted when empty.
pub fn relationship_text(relationship: &GraphRelationship) -> String {
    let mut text = format!(
        "{} {} {}",
        relationship.start, relationship.rel_type, relationship.end
    );
    if !relationship.description.is_empty() {
        text.push_str(&format!(": {}", relationship.description));
    }
    text
}

/// Chunk description embedded in chunk payloads under `chunk_details`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDetails {
    /// Chunk id.
    pub id: String,

    /// Chunk content type.
    #[serde(rename = "type")]
    pub chunk_type: String,

    /// Depth in the chunk tree.
    pub depth: u32,

    /// Emission index within the document.
    pub index: usize,

    /// Whether the chunk has no children.
    pub is_leaf: bool,

    /// Whether the chunk is a root.
    pub is_root: bool,

    /// Parent chunk id, absent for roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Byte span in the origin text.
    pub text_position: TextPosition,

    /// Time span in the origin media, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_position: Option<MediaPosition>,

    /// Canonical ids of entities extracted from this chunk.
    pub entities: Vec<String>,

    /// Canonical ids of relationships extracted from this chunk.
    pub relationships: Vec<String>,

    /// Model that produced the extraction, when one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_model: Option<String>,

    /// Whether extraction ran for this chunk.
    pub extracted: bool,
}

impl ChunkDetails {
    /// Build details for a chunk with no extraction attached.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id.clone(),
            chunk_type: chunk_type_name(chunk),
            depth: chunk.depth,
            index: chunk.index,
            is_leaf: chunk.leaf,
            is_root: chunk.root,
            parent_id: chunk.parent_id.clone(),
            text_position: chunk.text_pos,
            media_position: chunk.media_pos,
            entities: Vec::new(),
            relationships: Vec::new(),
            extraction_model: None,
            extracted: false,
        }
    }
}

fn chunk_type_name(chunk: &Chunk) -> String {
    serde_json::to_value(chunk.chunk_type)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| "text".to_string())
}

/// Current timestamp in RFC 3339.
pub fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Merge base maps: user metadata first, conversion metadata above it.
fn base_metadata(user: &Map<String, Value>, convert: &Map<String, Value>) -> Map<String, Value> {
    let mut payload = user.clone();
    for (key, value) in convert {
        payload.insert(key.clone(), value.clone());
    }
    payload
}

/// Payload of a chunk row.
#[allow(clippy::too_many_arguments)]
pub fn chunk_payload(
    doc_id: &str,
    collection_id: &str,
    source_file: &str,
    details: &ChunkDetails,
    user_metadata: &Map<String, Value>,
    convert_metadata: &Map<String, Value>,
    created_at: String,
    origin: Option<&str>,
) -> Value {
    let mut payload = base_metadata(user_metadata, convert_metadata);
    payload.insert("doc_id".to_string(), json!(doc_id));
    payload.insert("collection_id".to_string(), json!(collection_id));
    payload.insert("document_type".to_string(), json!(DOC_TYPE_CHUNK));
    payload.insert("source_file".to_string(), json!(source_file));
    payload.insert("created_at".to_string(), json!(created_at));
    payload.insert(
        "chunk_details".to_string(),
        serde_json::to_value(details).unwrap_or(Value::Null),
    );
    if let Some(origin) = origin {
        payload.insert("origin".to_string(), json!(origin));
    }
    Value::Object(payload)
}

/// Payload of an entity row.
pub fn entity_payload(
    node: &GraphNode,
    collection_id: &str,
    user_metadata: &Map<String, Value>,
    created_at: String,
) -> Value {
    let mut payload = user_metadata.clone();
    payload.insert("collection_id".to_string(), json!(collection_id));
    payload.insert("document_type".to_string(), json!(DOC_TYPE_ENTITY));
    payload.insert(
        "entity_details".to_string(),
        json!({
            "id": node.id,
            "name": node.name,
            "type": node.node_type,
            "description": node.description,
            "confidence": node.confidence,
            "source_chunks": node.source_chunks,
        }),
    );
    payload.insert("doc_ids".to_string(), json!(node.source_documents));
    payload.insert("created_at".to_string(), json!(created_at));
    payload.insert("updated_at".to_string(), json!(now()));
    Value::Object(payload)
}

/// Payload of a relationship row.
pub fn relationship_payload(
    relationship: &GraphRelationship,
    collection_id: &str,
    user_metadata: &Map<String, Value>,
    created_at: String,
) -> Value {
    let mut payload = user_metadata.clone();
    payload.insert("collection_id".to_string(), json!(collection_id));
    payload.insert("document_type".to_string(), json!(DOC_TYPE_RELATIONSHIP));
    payload.insert(
        "relationship_details".to_string(),
        json!({
            "id": relationship.id,
            "start": relationship.start,
            "end": relationship.end,
            "type": relationship.rel_type,
            "description": relationship.description,
            "confidence": relationship.confidence,
            "weight": relationship.weight,
            "source_chunks": relationship.source_chunks,
        }),
    );
    payload.insert("doc_ids".to_string(), json!(relationship.source_documents));
    payload.insert("created_at".to_string(), json!(created_at));
    payload.insert("updated_at".to_string(), json!(now()));
    Value::Object(payload)
}

/// Patch an entity row payload in place with trimmed provenance arrays.
pub fn patch_entity_row(metadata: &mut Value, node: &GraphNode) {
    if let Some(payload) = metadata.as_object_mut() {
        payload.insert("doc_ids".to_string(), json!(node.source_documents));
        payload.insert("updated_at".to_string(), json!(now()));
        if let Some(details) = payload
            .get_mut("entity_details")
            .and_then(Value::as_object_mut)
        {
            details.insert("source_chunks".to_string(), json!(node.source_chunks));
        }
    }
}

/// Patch a relationship row payload in place with trimmed provenance arrays.
pub fn patch_relationship_row(metadata: &mut Value, relationship: &GraphRelationship) {
    if let Some(payload) = metadata.as_object_mut() {
        payload.insert("doc_ids".to_string(), json!(relationship.source_documents));
        payload.insert("updated_at".to_string(), json!(now()));
        if let Some(details) = payload
            .get_mut("relationship_details")
            .and_then(Value::as_object_mut)
        {
            details.insert(
                "source_chunks".to_string(),
                json!(relationship.source_chunks),
            );
        }
    }
}

/// Stamp `updated_at` on a payload.
pub fn touch_updated_at(metadata: &mut Value) {
    if let Some(payload) = metadata.as_object_mut() {
        payload.insert("updated_at".to_string(), json!(now()));
    }
}

/// Read the `doc_ids` array of a payload.
pub fn payload_doc_ids(metadata: &Value) -> Vec<String> {
    metadata
        .get("doc_ids")
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

/// Overwrite the `doc_ids` array of a payload.
pub fn set_payload_doc_ids(metadata: &mut Value, doc_ids: &[String]) {
    if let Some(payload) = metadata.as_object_mut() {
        payload.insert("doc_ids".to_string(), json!(doc_ids));
        payload.insert("updated_at".to_string(), json!(now()));
    }
}

/// Read `created_at` from an existing payload so upserts never regress it.
pub fn preserved_created_at(existing: Option<&Value>) -> String {
    existing
        .and_then(|payload| payload.get("created_at"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_node() -> GraphNode {
        GraphNode {
            id: "john_person".to_string(),
            name: "John".to_string(),
            node_type: "Person".to_string(),
            description: "An engineer".to_string(),
            confidence: 0.9,
            source_documents: vec!["c1_d1".to_string()],
            source_chunks: vec!["c1_d1_c0".to_string()],
        }
    }

    #[test]
    fn test_entity_text_formats() {
        let mut node = sample_node();
        assert_eq!(entity_text(&node), "John (Person): An engineer");

        node.node_type.clear();
        assert_eq!(entity_text(&node), "John: An engineer");

        node.description.clear();
        assert_eq!(entity_text(&node), "John");
    }

    #[test]
    fn test_relationship_text_formats() {
        let relationship = GraphRelationship {
            id: "john_WORKS_AT_acme".to_string(),
            start: "john".to_string(),
            end: "acme".to_string(),
            rel_type: "WORKS_AT".to_string(),
            description: String::new(),
            confidence: 0.8,
            weight: None,
            source_documents: vec![],
            source_chunks: vec![],
        };
        assert_eq!(relationship_text(&relationship), "john WORKS_AT acme");
    }

    #[test]
    fn test_system_fields_win_over_user_metadata() {
        let mut user = Map::new();
        user.insert("document_type".to_string(), json!("spoofed"));
        user.insert("topic".to_string(), json!("dogs"));

        let payload = entity_payload(&sample_node(), "c1", &user, now());

        assert_eq!(payload["document_type"], "entity");
        assert_eq!(payload["topic"], "dogs");
        assert_eq!(payload["doc_ids"], json!(["c1_d1"]));
    }

    #[test]
    fn test_preserved_created_at() {
        let existing = json!({"created_at": "2024-01-01T00:00:00+00:00"});
        assert_eq!(
            preserved_created_at(Some(&existing)),
            "2024-01-01T00:00:00+00:00"
        );

        // Fresh rows get a fresh timestamp.
        assert!(!preserved_created_at(None).is_empty());
    }
}
