//! Canonical identities for entities and relationships.
//!
//! Identity is content-derived and shared across documents: entities are
//! keyed by `(name, type)`, relationships by `(start, type, end)`. The graph
//! store is the authority that assigns these ids; the same derivation is
//! exposed here so callers can fall back to it when a save result carries no
//! mapping for an input.

/// Normalize a name or type for use in a canonical id: lowercase, trimmed,
/// whitespace and hyphens collapsed to underscores.
fn normalize(part: &str) -> String {
    part.trim()
        .to_lowercase()
        .replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Canonical entity id: `name[_type]`, the type suffix present iff the
/// entity carries a non-empty type.
pub fn canonical_entity_id(name: &str, node_type: &str) -> String {
    let name = normalize(name);
    let node_type = normalize(node_type);
    if node_type.is_empty() {
        name
    } else {
        format!("{name}_{node_type}")
    }
}

/// Canonical relationship id: `start_TYPE_end`, with the type uppercased and
/// inner whitespace collapsed to underscores.
pub fn canonical_relationship_id(start: &str, rel_type: &str, end: &str) -> String {
    let rel_type = rel_type
        .trim()
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    format!("{start}_{rel_type}_{end}")
}

/// Order-preserving set union: appends each incoming value that is not
/// already present. Used for every provenance array.
pub fn merge_unique(existing: &mut Vec<String>, incoming: &[String]) {
    for value in incoming {
        if !existing.iter().any(|present| present == value) {
            existing.push(value.clone());
        }
    }
}

/// Remove values from an array, preserving order. Returns whether the array
/// is empty afterwards.
pub fn remove_values(existing: &mut Vec<String>, removed: &[String]) -> bool {
    existing.retain(|value| !removed.iter().any(|r| r == value));
    existing.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_canonical_entity_id() {
        assert_eq!(canonical_entity_id("John", ""), "john");
        assert_eq!(canonical_entity_id("Mary Jane", "Person"), "mary_jane_person");
        assert_eq!(canonical_entity_id("  Acme-Corp ", ""), "acme_corp");
    }

    #[test]
    fn test_canonical_relationship_id() {
        assert_eq!(
            canonical_relationship_id("john", "works at", "acme"),
            "john_WORKS_AT_acme"
        );
        assert_eq!(
            canonical_relationship_id("a", "USES", "b"),
            "a_USES_b"
        );
    }

    #[test]
    fn test_merge_unique_keeps_order_and_dedups() {
        let mut array = vec!["d1".to_string()];
        merge_unique(&mut array, &["d2".to_string(), "d1".to_string()]);
        assert_eq!(array, vec!["d1", "d2"]);

        merge_unique(&mut array, &["d2".to_string()]);
        assert_eq!(array, vec!["d1", "d2"]);
    }

    #[test]
    fn test_remove_values() {
        let mut array = vec!["d1".to_string(), "d2".to_string()];
        assert!(!remove_values(&mut array, &["d1".to_string()]));
        assert_eq!(array, vec!["d2"]);
        assert!(remove_values(&mut array, &["d2".to_string()]));
    }
}
