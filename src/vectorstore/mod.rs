//! Vector store adapter: stores embedding records keyed by chunk id, queries top-k by cosine
//! similarity with optional metadata filter and threshold, and supports deletion by id, by file,
//! or by whole collection.

pub mod client;
pub mod filters;
pub mod payload;
pub mod scroller;
pub mod types;

use async_trait::async_trait;

pub use types::{
    ChunkMetadata, EmbeddingRecord, ModelFingerprint, RelatedChunkIds, ScoredChunk, SearchFilter,
    VectorStoreError,
};

use crate::ids::{ChunkId, CollectionId, FileId};

/// Interface implemented by vector store backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite embedding records. All records in one call must share a vector
    /// dimension; the store enforces that every record in a collection shares one model
    /// fingerprint, rejecting mixed-fingerprint writes with
    /// [`VectorStoreError::ModelFingerprintMismatch`].
    async fn upsert(
        &self,
        collection: &CollectionId,
        fingerprint_key: &str,
        records: Vec<EmbeddingRecord>,
    ) -> Result<(), VectorStoreError>;

    /// Return the top `limit` chunks by cosine similarity to `vector`, optionally filtered and
    /// thresholded.
    async fn search(
        &self,
        collection: &CollectionId,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError>;

    /// Fetch specific chunks by id, used to materialize related chunks for context expansion.
    async fn fetch_by_ids(
        &self,
        collection: &CollectionId,
        ids: &[ChunkId],
    ) -> Result<Vec<ScoredChunk>, VectorStoreError>;

    /// Delete specific chunk records by id.
    async fn delete_by_ids(&self, collection: &CollectionId, ids: &[ChunkId]) -> Result<(), VectorStoreError>;

    /// Delete every record belonging to `collection`.
    async fn delete_collection(&self, collection: &CollectionId) -> Result<(), VectorStoreError>;

    /// Delete every record belonging to one file within a collection (e.g. on file delete or
    /// re-sync of a changed file). Implemented via a filtered `scroll` to collect matching ids,
    /// then a batch delete by id.
    async fn delete_by_file(&self, collection: &CollectionId, file_id: &FileId) -> Result<(), VectorStoreError>;
}

/// Build the configured vector store client.
pub fn build_vector_store(
    config: &crate::config::Config,
) -> Result<std::sync::Arc<dyn VectorStore>, VectorStoreError> {
    Ok(std::sync::Arc::new(client::QdrantVectorStore::new(
        &config.vector_store_url,
        config.vector_store_api_key.as_deref(),
    )?))
}
