//! HTTP-based vector store adapter targeting a Qdrant-compatible REST API.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::ids::{ChunkId, CollectionId, FileId};

use super::filters::build_filter;
use super::payload::{build_payload, split_overlap_partners};
use super::types::{
    ChunkMetadata, EmbeddingRecord, RelatedChunkIds, ScoredChunk, SearchFilter, VectorStoreError,
};
use super::VectorStore;

/// `reqwest`-based client for a Qdrant-compatible vector store.
pub struct QdrantVectorStore {
    http: Client,
    base_url: String,
}

impl QdrantVectorStore {
    /// Construct a client targeting `base_url`, optionally authenticating with `api_key`.
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, VectorStoreError> {
        let base_url = normalize_base_url(base_url)?;
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = api_key {
            let value = reqwest::header::HeaderValue::from_str(key)
                .map_err(|_| VectorStoreError::InvalidUrl("invalid API key header value".into()))?;
            headers.insert("api-key", value);
        }
        let http = Client::builder()
            .default_headers(headers)
            .user_agent("knowledgebase/vectorstore")
            .build()?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn ensure_success(response: reqwest::Response) -> Result<Value, VectorStoreError> {
        let status = response.status();
        if status.is_success() {
            response.json::<Value>().await.map_err(VectorStoreError::from)
        } else {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(VectorStoreError::UnexpectedStatus { status: status_code, body })
        }
    }

    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<(), VectorStoreError> {
        let check = self.http.get(self.endpoint(&format!("collections/{name}"))).send().await?;
        if check.status() == StatusCode::OK {
            return Ok(());
        }

        let response = self
            .http
            .put(self.endpoint(&format!("collections/{name}")))
            .json(&json!({
                "vectors": {"size": dimension, "distance": "Cosine"}
            }))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn existing_fingerprint(&self, collection: &str) -> Result<Option<String>, VectorStoreError> {
        let response = self
            .http
            .post(self.endpoint(&format!("collections/{collection}/points/scroll")))
            .json(&json!({"limit": 1, "with_payload": true, "with_vector": false}))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = Self::ensure_success(response).await?;
        Ok(body["result"]["points"]
            .as_array()
            .and_then(|points| points.first())
            .and_then(|point| point["payload"]["model_fingerprint"].as_str())
            .map(str::to_string))
    }
}

fn normalize_base_url(raw: &str) -> Result<String, VectorStoreError> {
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(VectorStoreError::InvalidUrl("vector store URL must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

fn metadata_from_payload(payload: &Value) -> Option<ChunkMetadata> {
    Some(ChunkMetadata {
        collection_id: CollectionId(payload["collection_id"].as_str()?.to_string()),
        file_id: FileId(payload["file_id"].as_str()?.to_string()),
        position: payload["position"].as_u64().unwrap_or(0) as u32,
        text: payload["text"].as_str().unwrap_or_default().to_string(),
        length: payload["length"].as_u64().unwrap_or(0) as u32,
        contains_code: payload["contains_code"].as_bool().unwrap_or(false),
        language: payload["language"].as_str().map(str::to_string),
        header_hierarchy: payload["header_hierarchy"].as_str().unwrap_or_default().to_string(),
        chunk_type: payload["chunk_type"].as_str().unwrap_or("paragraph").to_string(),
        content_hash: payload["content_hash"].as_str().unwrap_or_default().to_string(),
        created_at: payload["created_at"].as_str().unwrap_or_default().to_string(),
    })
}

fn related_from_payload(payload: &Value) -> RelatedChunkIds {
    RelatedChunkIds {
        previous: payload["related_previous"].as_str().map(|s| ChunkId(s.to_string())),
        next: payload["related_next"].as_str().map(|s| ChunkId(s.to_string())),
        overlap_partners: payload["related_overlap_partners"]
            .as_str()
            .map(|s| split_overlap_partners(s).into_iter().map(ChunkId).collect())
            .unwrap_or_default(),
        parent_section: payload["related_parent_section"].as_str().map(|s| ChunkId(s.to_string())),
    }
}

#[derive(Deserialize)]
struct ScrollPoint {
    id: Value,
    payload: Value,
}

#[async_trait::async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(
        &self,
        collection: &CollectionId,
        fingerprint_key: &str,
        records: Vec<EmbeddingRecord>,
    ) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        if let Some(existing) = self.existing_fingerprint(&collection.0).await? {
            if existing != fingerprint_key {
                return Err(VectorStoreError::ModelFingerprintMismatch {
                    existing,
                    requested: fingerprint_key.to_string(),
                });
            }
        }

        let dimension = records[0].vector.len();
        self.ensure_collection(&collection.0, dimension).await?;

        let mut points = Vec::with_capacity(records.len());
        for record in &records {
            let payload = build_payload(&record.metadata, &record.related, fingerprint_key)?;
            points.push(json!({
                "id": record.chunk_id.0,
                "vector": record.vector,
                "payload": payload,
            }));
        }

        let response = self
            .http
            .put(self.endpoint(&format!("collections/{}/points?wait=true", collection.0)))
            .json(&json!({"points": points}))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &CollectionId,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        let mut merged_filter = filter.clone();
        merged_filter.collection_id = Some(collection.clone());
        let qdrant_filter = build_filter(&merged_filter);

        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = score_threshold {
            body["score_threshold"] = json!(threshold);
        }
        if let Some(f) = qdrant_filter {
            body["filter"] = f;
        }

        let response = self
            .http
            .post(self.endpoint(&format!("collections/{}/points/search", collection.0)))
            .json(&body)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let result = Self::ensure_success(response).await?;

        let mut hits = Vec::new();
        if let Some(array) = result["result"].as_array() {
            for entry in array {
                let Some(metadata) = metadata_from_payload(&entry["payload"]) else { continue };
                let related = related_from_payload(&entry["payload"]);
                let chunk_id = entry["id"].as_str().map(str::to_string).unwrap_or_default();
                hits.push(ScoredChunk {
                    chunk_id: ChunkId(chunk_id),
                    score: entry["score"].as_f64().unwrap_or(0.0) as f32,
                    metadata,
                    related,
                });
            }
        }
        Ok(hits)
    }

    async fn fetch_by_ids(
        &self,
        collection: &CollectionId,
        ids: &[ChunkId],
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .http
            .post(self.endpoint(&format!("collections/{}/points", collection.0)))
            .json(&json!({
                "ids": ids.iter().map(|id| id.0.clone()).collect::<Vec<_>>(),
                "with_payload": true,
            }))
            .send()
            .await?;
        let result = Self::ensure_success(response).await?;

        let mut out = Vec::new();
        if let Some(array) = result["result"].as_array() {
            for entry in array {
                let point: ScrollPoint = serde_json::from_value(entry.clone())
                    .map_err(|e| VectorStoreError::ChunkMetadata(e.to_string()))?;
                let Some(metadata) = metadata_from_payload(&point.payload) else { continue };
                let related = related_from_payload(&point.payload);
                out.push(ScoredChunk {
                    chunk_id: ChunkId(point.id.as_str().unwrap_or_default().to_string()),
                    score: 1.0,
                    metadata,
                    related,
                });
            }
        }
        Ok(out)
    }

    async fn delete_by_ids(&self, collection: &CollectionId, ids: &[ChunkId]) -> Result<(), VectorStoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let response = self
            .http
            .post(self.endpoint(&format!("collections/{}/points/delete?wait=true", collection.0)))
            .json(&json!({"points": ids.iter().map(|id| id.0.clone()).collect::<Vec<_>>()}))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn delete_by_file(&self, collection: &CollectionId, file_id: &FileId) -> Result<(), VectorStoreError> {
        let filter = SearchFilter {
            collection_id: Some(collection.clone()),
            file_id: Some(file_id.clone()),
            chunk_type: None,
        };
        let ids = super::scroller::scroll_chunk_ids(
            &self.http,
            |path| self.endpoint(path),
            &collection.0,
            &filter,
        )
        .await?;
        self.delete_by_ids(collection, &ids).await
    }

    async fn delete_collection(&self, collection: &CollectionId) -> Result<(), VectorStoreError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("collections/{}", collection.0)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;

    #[tokio::test]
    async fn search_emits_expected_request_and_parses_hits() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/collections/docs/points/search");
            then.status(200).json_body(json!({
                "result": [
                    {
                        "id": "chunk-1",
                        "score": 0.91,
                        "payload": {
                            "collection_id": "docs",
                            "file_id": "file-1",
                            "position": 0,
                            "text": "hello",
                            "length": 5,
                            "contains_code": false,
                            "header_hierarchy": "",
                            "chunk_type": "paragraph",
                            "content_hash": "abc",
                            "created_at": "2026-01-01T00:00:00Z",
                            "model_fingerprint": "m#8"
                        }
                    }
                ]
            }));
        });

        let client = QdrantVectorStore::new(&server.base_url(), None).unwrap();
        let hits = client
            .search(&CollectionId("docs".into()), &[0.1, 0.2], 5, None, &SearchFilter::default())
            .await
            .unwrap();

        mock.assert();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id.0, "chunk-1");
        assert!((hits[0].score - 0.91).abs() < 1e-6);
    }

    #[tokio::test]
    async fn search_against_missing_collection_returns_empty() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/collections/missing/points/search");
            then.status(404);
        });

        let client = QdrantVectorStore::new(&server.base_url(), None).unwrap();
        let hits = client
            .search(&CollectionId("missing".into()), &[0.1], 5, None, &SearchFilter::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
