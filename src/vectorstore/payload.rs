//! Translate chunk metadata into the vector store's primitive-only payload contract.
//!
//! The backing store accepts only numbers, booleans, and strings in point payloads. Lists are
//! serialized to delimited strings preserving order, enums to their symbolic name, timestamps to
//! RFC-3339 (already the case for every timestamp in this crate), and null fields are omitted
//! entirely rather than serialized as JSON `null`.

use serde_json::{Map, Value, json};

use super::types::{ChunkMetadata, RelatedChunkIds, VectorStoreError};

const RELATED_ID_SEPARATOR: &str = ",";

/// Build a primitive-only JSON payload for a chunk's metadata and relationships.
pub fn build_payload(
    metadata: &ChunkMetadata,
    related: &RelatedChunkIds,
    fingerprint_key: &str,
) -> Result<Value, VectorStoreError> {
    let mut map = Map::new();

    map.insert("collection_id".into(), json!(metadata.collection_id.0));
    map.insert("file_id".into(), json!(metadata.file_id.0));
    map.insert("position".into(), json!(metadata.position));
    map.insert("text".into(), json!(metadata.text));
    map.insert("length".into(), json!(metadata.length));
    map.insert("contains_code".into(), json!(metadata.contains_code));
    map.insert("header_hierarchy".into(), json!(metadata.header_hierarchy));
    map.insert("chunk_type".into(), json!(metadata.chunk_type));
    map.insert("content_hash".into(), json!(metadata.content_hash));
    map.insert("created_at".into(), json!(metadata.created_at));
    map.insert("model_fingerprint".into(), json!(fingerprint_key));

    if let Some(language) = &metadata.language {
        map.insert("language".into(), json!(language));
    }
    if let Some(previous) = &related.previous {
        map.insert("related_previous".into(), json!(previous.0));
    }
    if let Some(next) = &related.next {
        map.insert("related_next".into(), json!(next.0));
    }
    if let Some(parent) = &related.parent_section {
        map.insert("related_parent_section".into(), json!(parent.0));
    }
    if !related.overlap_partners.is_empty() {
        let joined = related
            .overlap_partners
            .iter()
            .map(|id| id.0.as_str())
            .collect::<Vec<_>>()
            .join(RELATED_ID_SEPARATOR);
        map.insert("related_overlap_partners".into(), json!(joined));
    }

    for (key, value) in map.iter() {
        if !matches!(value, Value::Null) && !value.is_string() && !value.is_number() && !value.is_boolean() {
            return Err(VectorStoreError::ChunkMetadata(format!(
                "field '{key}' normalized to a non-primitive value"
            )));
        }
    }

    Ok(Value::Object(map))
}

/// Split a delimited `related_overlap_partners` payload field back into chunk id strings.
pub fn split_overlap_partners(raw: &str) -> Vec<String> {
    raw.split(RELATED_ID_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ChunkId, CollectionId, FileId};

    fn sample_metadata() -> ChunkMetadata {
        ChunkMetadata {
            collection_id: CollectionId("docs".into()),
            file_id: FileId("file-1".into()),
            position: 0,
            text: "hello world".into(),
            length: 11,
            contains_code: false,
            language: None,
            header_hierarchy: "Title > Section".into(),
            chunk_type: "paragraph".into(),
            content_hash: "abc123".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn build_payload_omits_absent_optional_fields() {
        let payload = build_payload(&sample_metadata(), &RelatedChunkIds::default(), "model#8").unwrap();
        let obj = payload.as_object().unwrap();
        assert!(!obj.contains_key("language"));
        assert!(!obj.contains_key("related_previous"));
        assert_eq!(obj.get("model_fingerprint").unwrap(), "model#8");
    }

    #[test]
    fn build_payload_joins_overlap_partners() {
        let related = RelatedChunkIds {
            overlap_partners: vec![ChunkId("a".into()), ChunkId("b".into())],
            ..Default::default()
        };
        let payload = build_payload(&sample_metadata(), &related, "model#8").unwrap();
        assert_eq!(payload["related_overlap_partners"], "a,b");
    }

    #[test]
    fn split_overlap_partners_round_trips() {
        let ids = split_overlap_partners("a,b,c");
        assert_eq!(ids, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }
}
