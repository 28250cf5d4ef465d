//! Paged `scroll` helper for listing chunk ids that match a filter, used when deleting a subset
//! of a collection's vectors (e.g. all chunks belonging to one deleted file) rather than the
//! whole collection.

use reqwest::Client;
use serde_json::{Value, json};

use crate::ids::ChunkId;

use super::filters::build_filter;
use super::types::{SearchFilter, VectorStoreError};

const PAGE_SIZE: u64 = 256;

/// Page through `scroll` until exhausted, returning every matching chunk id.
pub async fn scroll_chunk_ids(
    http: &Client,
    endpoint: impl Fn(&str) -> String,
    collection: &str,
    filter: &SearchFilter,
) -> Result<Vec<ChunkId>, VectorStoreError> {
    let qdrant_filter = build_filter(filter);
    let mut ids = Vec::new();
    let mut offset: Option<Value> = None;

    loop {
        let mut body = json!({"limit": PAGE_SIZE, "with_payload": false, "with_vector": false});
        if let Some(f) = &qdrant_filter {
            body["filter"] = f.clone();
        }
        if let Some(o) = &offset {
            body["offset"] = o.clone();
        }

        let response = http
            .post(endpoint(&format!("collections/{collection}/points/scroll")))
            .json(&body)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(ids);
        }
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::UnexpectedStatus { status: status.as_u16(), body: body_text });
        }
        let parsed: Value = response.json().await?;

        let points = parsed["result"]["points"].as_array().cloned().unwrap_or_default();
        let page_len = points.len();
        for point in points {
            if let Some(id) = point["id"].as_str() {
                ids.push(ChunkId(id.to_string()));
            }
        }

        let next = parsed["result"]["next_page_offset"].clone();
        if next.is_null() || page_len < PAGE_SIZE as usize {
            break;
        }
        offset = Some(next);
    }

    Ok(ids)
}
