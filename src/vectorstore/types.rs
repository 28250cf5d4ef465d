//! Wire types for the vector store adapter.

use serde::{Deserialize, Serialize};

use crate::ids::{ChunkId, CollectionId, FileId};

/// Errors raised by a vector store adapter.
#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    /// The vector store's base URL was malformed.
    #[error("invalid vector store URL: {0}")]
    InvalidUrl(String),
    /// The HTTP transport failed.
    #[error("vector store request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The vector store returned a non-success status.
    #[error("vector store returned unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// The HTTP status code returned.
        status: u16,
        /// The response body, for diagnostics.
        body: String,
    },
    /// A chunk's metadata could not be normalized into primitive types.
    #[error("chunk metadata normalization failed: {0}")]
    ChunkMetadata(String),
    /// The collection already holds records from a different embedding model.
    #[error("model fingerprint mismatch: collection uses '{existing}', request used '{requested}'")]
    ModelFingerprintMismatch {
        /// The fingerprint already stored for this collection.
        existing: String,
        /// The fingerprint of the request that was rejected.
        requested: String,
    },
}

/// Identifies the embedding model (and therefore vector space) that produced a set of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFingerprint {
    /// Model identifier, e.g. `ollama:nomic-embed-text`.
    pub name: String,
    /// Vector dimensionality.
    pub dimension: usize,
}

impl ModelFingerprint {
    /// Render as a single stable string, e.g. `ollama:nomic-embed-text#768`.
    pub fn as_key(&self) -> String {
        format!("{}#{}", self.name, self.dimension)
    }
}

/// A chunk's full primitive-typed metadata mirror, ready for vector-store storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Owning collection id.
    pub collection_id: CollectionId,
    /// Owning file id.
    pub file_id: FileId,
    /// Position of this chunk within its file.
    pub position: u32,
    /// Chunk text (stored for retrieval without a second store round-trip).
    pub text: String,
    /// Character length of `text`.
    pub length: u32,
    /// Whether the chunk contains code.
    pub contains_code: bool,
    /// Best-effort detected programming language, when `contains_code` is true.
    pub language: Option<String>,
    /// Heading titles enclosing the chunk, outermost first, joined with `" > "`.
    pub header_hierarchy: String,
    /// Structural chunk type: `header_section | code_block | list | paragraph | table`.
    pub chunk_type: String,
    /// Content hash (SHA-256 hex) of `text`.
    pub content_hash: String,
    /// RFC-3339 creation timestamp.
    pub created_at: String,
}

/// A single record in the vector index: one vector tied to exactly one chunk.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    /// The chunk this vector represents.
    pub chunk_id: ChunkId,
    /// The embedding vector itself.
    pub vector: Vec<f32>,
    /// Primitive-typed metadata mirror of the chunk.
    pub metadata: ChunkMetadata,
    /// Related chunk ids: previous, next, overlap partners, parent section.
    pub related: RelatedChunkIds,
}

/// Declared relationships from one chunk to its neighbors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelatedChunkIds {
    /// The immediately preceding chunk in the same file, if any.
    pub previous: Option<ChunkId>,
    /// The immediately following chunk in the same file, if any.
    pub next: Option<ChunkId>,
    /// Chunks whose text overlaps with this chunk's boundary text.
    pub overlap_partners: Vec<ChunkId>,
    /// The nearest enclosing header-section chunk, if any.
    pub parent_section: Option<ChunkId>,
}

/// A single top-k match returned from a similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    /// The matched chunk id.
    pub chunk_id: ChunkId,
    /// Cosine similarity score.
    pub score: f32,
    /// The chunk's stored metadata.
    pub metadata: ChunkMetadata,
    /// The matched chunk's declared relationships.
    pub related: RelatedChunkIds,
}

/// Filter applied to a similarity search or a metadata scroll.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Restrict to a single collection.
    pub collection_id: Option<CollectionId>,
    /// Restrict to a single owning file.
    pub file_id: Option<FileId>,
    /// Restrict to chunks whose `chunk_type` matches.
    pub chunk_type: Option<String>,
}
