//! Build Qdrant-style filter JSON from a [`SearchFilter`].

use serde_json::{Value, json};

use super::types::SearchFilter;

/// Build a Qdrant `{must: [...]}` filter clause, or `None` when the filter is empty.
pub fn build_filter(filter: &SearchFilter) -> Option<Value> {
    let mut must = Vec::new();

    if let Some(collection_id) = &filter.collection_id {
        must.push(json!({
            "key": "collection_id",
            "match": {"value": collection_id.0},
        }));
    }
    if let Some(file_id) = &filter.file_id {
        must.push(json!({
            "key": "file_id",
            "match": {"value": file_id.0},
        }));
    }
    if let Some(chunk_type) = &filter.chunk_type {
        must.push(json!({
            "key": "chunk_type",
            "match": {"value": chunk_type},
        }));
    }

    if must.is_empty() {
        None
    } else {
        Some(json!({"must": must}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::CollectionId;

    #[test]
    fn empty_filter_yields_none() {
        assert!(build_filter(&SearchFilter::default()).is_none());
    }

    #[test]
    fn collection_filter_builds_match_clause() {
        let filter = SearchFilter {
            collection_id: Some(CollectionId("docs".into())),
            ..Default::default()
        };
        let built = build_filter(&filter).unwrap();
        assert_eq!(built["must"][0]["key"], "collection_id");
        assert_eq!(built["must"][0]["match"]["value"], "docs");
    }

    #[test]
    fn combines_multiple_conditions() {
        let filter = SearchFilter {
            collection_id: Some(CollectionId("docs".into())),
            chunk_type: Some("code_block".into()),
            ..Default::default()
        };
        let built = build_filter(&filter).unwrap();
        assert_eq!(built["must"].as_array().unwrap().len(), 2);
    }
}
