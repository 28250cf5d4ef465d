//! Search and RAG query pipeline.
//!
//! `vector_search` runs the seven-stage pipeline described in the service container's search
//! use-case: validation, optional LLM query expansion (cached, TTL-bounded), multi-query
//! retrieval, reciprocal-rank fusion, optional LLM re-ranking, optional context expansion, and
//! threshold filtering. `rag_query` composes search with token-budgeted context assembly and
//! LLM answer synthesis, degrading to retrieval-only when no LLM provider is configured.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::embedding::EmbeddingClient;
use crate::ids::CollectionId;
use crate::llm::{self, LlmClient};
use crate::vectorstore::{ScoredChunk, SearchFilter, VectorStore};

const EXPANSION_CACHE_TTL: Duration = Duration::from_secs(600);

/// Errors raised while validating or executing a search/RAG query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Caller input failed validation; carries a stable sub-code.
    #[error("{1}")]
    Validation(&'static str, String),
    /// The referenced collection does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A required dependency (vector store, embedding provider) is unavailable.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
}

/// Inputs for a vector-search use-case invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// The user's search text; must be non-empty.
    pub query: String,
    /// Restrict the search to one collection.
    pub collection: CollectionId,
    /// Maximum number of results to return.
    pub limit: usize,
    /// Minimum similarity score a result must meet.
    pub similarity_threshold: f32,
    /// Optional metadata filter applied to every underlying vector-store query.
    pub filter: SearchFilter,
    /// Whether to materialize each result's related chunks as expanded context.
    pub expand_context: bool,
}

/// One ranked search result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResult {
    /// The matched chunk and its metadata.
    pub chunk: ScoredChunk,
    /// Fused similarity score after multi-query retrieval and optional re-ranking.
    pub score: f32,
    /// Related chunks materialized when `expand_context` was requested.
    pub expanded_context: Vec<ScoredChunk>,
}

/// The full response of a vector-search use-case invocation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResponse {
    /// Ranked results, most relevant first.
    pub results: Vec<SearchResult>,
    /// Whether query expansion actually ran (vs. degrading to a single query).
    pub expansion_used: bool,
    /// Whether LLM re-ranking actually ran.
    pub reranking_used: bool,
}

/// The response of a RAG query use-case invocation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RagResponse {
    /// The synthesized answer, or `None` when degraded.
    pub answer: Option<String>,
    /// The chunks used to produce the answer (or, when degraded, the raw search results).
    pub sources: Vec<SearchResult>,
    /// Whether the pipeline degraded to retrieval-only because no LLM provider was configured.
    pub degraded: bool,
}

struct ExpansionCacheEntry {
    variants: Vec<String>,
    inserted_at: Instant,
}

/// Stateful query pipeline: owns the vector store, embedding client, optional LLM client, and
/// the in-process query-expansion cache.
pub struct QueryPipeline {
    vector_store: std::sync::Arc<dyn VectorStore>,
    embedding: std::sync::Arc<dyn EmbeddingClient + Send + Sync>,
    llm: Option<Box<dyn LlmClient + Send + Sync>>,
    query_expansion_enabled: bool,
    max_query_variants: usize,
    auto_reranking_enabled: bool,
    reranking_threshold: usize,
    expansion_cache: Mutex<HashMap<String, ExpansionCacheEntry>>,
}

impl QueryPipeline {
    /// Construct a pipeline from the process-wide singletons and configuration.
    pub fn new(
        vector_store: std::sync::Arc<dyn VectorStore>,
        embedding: std::sync::Arc<dyn EmbeddingClient + Send + Sync>,
        llm: Option<Box<dyn LlmClient + Send + Sync>>,
        config: &crate::config::Config,
    ) -> Self {
        Self {
            vector_store,
            embedding,
            llm,
            query_expansion_enabled: config.query_expansion_enabled,
            max_query_variants: config.max_query_variants,
            auto_reranking_enabled: config.auto_reranking_enabled,
            reranking_threshold: config.reranking_threshold,
            expansion_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Run the seven-stage search pipeline.
    pub async fn vector_search(
        &self,
        request: SearchRequest,
        cancellation: CancellationToken,
    ) -> Result<SearchResponse, QueryError> {
        validate_request(&request)?;

        let (queries, expansion_used) = self.expand_query(&request.query).await;
        if cancellation.is_cancelled() {
            return Err(QueryError::DependencyUnavailable("operation cancelled".into()));
        }

        let candidate_limit = (request.limit * 2).max(request.limit);
        let mut fused: HashMap<String, (ScoredChunk, f32, usize)> = HashMap::new();
        for query_text in &queries {
            let vectors = self
                .embedding
                .generate_embeddings(vec![query_text.clone()])
                .await
                .map_err(|e| QueryError::DependencyUnavailable(e.to_string()))?;
            let vector = vectors.into_iter().next().unwrap_or_default();

            let hits = self
                .vector_store
                .search(&request.collection, &vector, candidate_limit, None, &request.filter)
                .await
                .map_err(|e| QueryError::DependencyUnavailable(e.to_string()))?;

            for (rank, hit) in hits.into_iter().enumerate() {
                let key = hit.chunk_id.0.clone();
                let rrf_score = 1.0 / (60.0 + rank as f32 + 1.0);
                fused
                    .entry(key)
                    .and_modify(|(existing, score, best_rank)| {
                        *score += rrf_score;
                        if rank < *best_rank {
                            *best_rank = rank;
                            *existing = hit.clone();
                        }
                    })
                    .or_insert((hit, rrf_score, rank));
            }
        }

        let mut ranked: Vec<(ScoredChunk, f32)> = fused
            .into_values()
            .map(|(chunk, score, _)| (chunk, score))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let reranking_used = self.rerank(&request.query, &mut ranked).await;

        let mut results = Vec::new();
        for (chunk, score) in ranked {
            if score < request.similarity_threshold && chunk.score < request.similarity_threshold {
                continue;
            }
            if results.len() >= request.limit {
                break;
            }
            let expanded_context = if request.expand_context {
                self.expand_related(&request.collection, &chunk).await
            } else {
                Vec::new()
            };
            results.push(SearchResult { chunk, score, expanded_context });
        }

        Ok(SearchResponse { results, expansion_used, reranking_used })
    }

    /// Compose search with token-budgeted context assembly and LLM synthesis.
    pub async fn rag_query(
        &self,
        request: SearchRequest,
        cancellation: CancellationToken,
    ) -> Result<RagResponse, QueryError> {
        let search = self.vector_search(request.clone(), cancellation).await?;

        let Some(llm) = self.llm.as_ref() else {
            return Ok(RagResponse { answer: None, sources: search.results, degraded: true });
        };

        let context = assemble_context(&search.results, 3000);
        match llm.generate(&llm::build_synthesis_prompt(&request.query, &context)).await {
            Ok(answer) => Ok(RagResponse { answer: Some(answer), sources: search.results, degraded: false }),
            Err(_) => Ok(RagResponse { answer: None, sources: search.results, degraded: true }),
        }
    }

    async fn expand_query(&self, query: &str) -> (Vec<String>, bool) {
        if !self.query_expansion_enabled {
            return (vec![query.to_string()], false);
        }
        let Some(llm) = self.llm.as_ref() else {
            return (vec![query.to_string()], false);
        };

        if let Some(cached) = self.cached_variants(query) {
            let mut queries = vec![query.to_string()];
            queries.extend(cached);
            return (queries, true);
        }

        let prompt = llm::build_expansion_prompt(query, self.max_query_variants);
        match llm.generate(&prompt).await {
            Ok(raw) => {
                let variants: Vec<String> = raw
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .take(self.max_query_variants)
                    .map(str::to_string)
                    .collect();
                self.store_variants(query, variants.clone());
                let mut queries = vec![query.to_string()];
                queries.extend(variants);
                (queries, true)
            }
            Err(_) => (vec![query.to_string()], false),
        }
    }

    fn cached_variants(&self, query: &str) -> Option<Vec<String>> {
        let cache = self.expansion_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(query).and_then(|entry| {
            if entry.inserted_at.elapsed() < EXPANSION_CACHE_TTL {
                Some(entry.variants.clone())
            } else {
                None
            }
        })
    }

    fn store_variants(&self, query: &str, variants: Vec<String>) {
        let mut cache = self.expansion_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(query.to_string(), ExpansionCacheEntry { variants, inserted_at: Instant::now() });
    }

    async fn rerank(&self, query: &str, ranked: &mut [(ScoredChunk, f32)]) -> bool {
        if !self.auto_reranking_enabled || ranked.len() <= self.reranking_threshold {
            return false;
        }
        let Some(llm) = self.llm.as_ref() else {
            return false;
        };

        let mut blended = Vec::with_capacity(ranked.len());
        for (chunk, _fused_score) in ranked.iter() {
            let prompt = llm::build_rerank_prompt(query, &chunk.metadata.text);
            let llm_score = match llm.generate(&prompt).await {
                Ok(raw) => llm::parse_rerank_score(&raw),
                Err(_) => None,
            };
            match llm_score {
                Some(score) => blended.push(0.3 * score + 0.7 * chunk.score),
                None => return false,
            }
        }

        for (slot, new_score) in ranked.iter_mut().zip(blended) {
            slot.1 = new_score;
        }
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        true
    }

    async fn expand_related(&self, collection: &CollectionId, chunk: &ScoredChunk) -> Vec<ScoredChunk> {
        let mut ids = Vec::new();
        ids.extend(chunk.related.previous.clone());
        ids.extend(chunk.related.next.clone());
        ids.extend(chunk.related.parent_section.clone());
        ids.extend(chunk.related.overlap_partners.iter().cloned());
        if ids.is_empty() {
            return Vec::new();
        }
        self.vector_store.fetch_by_ids(collection, &ids).await.unwrap_or_default()
    }
}

fn validate_request(request: &SearchRequest) -> Result<(), QueryError> {
    if request.query.trim().is_empty() {
        return Err(QueryError::Validation("missing_query", "query must not be empty".into()));
    }
    if request.limit < 1 {
        return Err(QueryError::Validation("invalid_limit", "limit must be at least 1".into()));
    }
    if !(0.0..=1.0).contains(&request.similarity_threshold) {
        return Err(QueryError::Validation(
            "invalid_threshold",
            "similarity_threshold must be between 0.0 and 1.0".into(),
        ));
    }
    Ok(())
}

fn assemble_context(results: &[SearchResult], budget_tokens: usize) -> String {
    let mut context = String::new();
    let mut used_tokens = 0usize;
    for (idx, result) in results.iter().enumerate() {
        let text = &result.chunk.metadata.text;
        let tokens = estimate_tokens(text);
        if used_tokens + tokens > budget_tokens && used_tokens > 0 {
            break;
        }
        context.push_str(&format!("[{}] {}\n\n", idx + 1, text));
        used_tokens += tokens;
    }
    context
}

fn estimate_tokens(text: &str) -> usize {
    tiktoken_rs::cl100k_base()
        .map(|bpe| bpe.encode_ordinary(text).len())
        .unwrap_or_else(|_| text.split_whitespace().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ChunkId, FileId};
    use crate::vectorstore::{ChunkMetadata, RelatedChunkIds, VectorStoreError};
    use async_trait::async_trait;

    struct StubVectorStore {
        hits: Vec<ScoredChunk>,
    }

    #[async_trait]
    impl VectorStore for StubVectorStore {
        async fn upsert(
            &self,
            _collection: &CollectionId,
            _fingerprint_key: &str,
            _records: Vec<crate::vectorstore::EmbeddingRecord>,
        ) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn search(
            &self,
            _collection: &CollectionId,
            _vector: &[f32],
            _limit: usize,
            _score_threshold: Option<f32>,
            _filter: &SearchFilter,
        ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
            Ok(self.hits.clone())
        }

        async fn fetch_by_ids(
            &self,
            _collection: &CollectionId,
            _ids: &[ChunkId],
        ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
            Ok(Vec::new())
        }

        async fn delete_by_ids(&self, _collection: &CollectionId, _ids: &[ChunkId]) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn delete_collection(&self, _collection: &CollectionId) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn delete_by_file(&self, _collection: &CollectionId, _file_id: &FileId) -> Result<(), VectorStoreError> {
            Ok(())
        }
    }

    fn sample_chunk(id: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk_id: ChunkId(id.to_string()),
            score,
            metadata: ChunkMetadata {
                collection_id: CollectionId("docs".into()),
                file_id: FileId("file-1".into()),
                position: 0,
                text: format!("text for {id}"),
                length: 10,
                contains_code: false,
                language: None,
                header_hierarchy: String::new(),
                chunk_type: "paragraph".into(),
                content_hash: "hash".into(),
                created_at: "2026-01-01T00:00:00Z".into(),
            },
            related: RelatedChunkIds::default(),
        }
    }

    fn pipeline(hits: Vec<ScoredChunk>) -> QueryPipeline {
        QueryPipeline {
            vector_store: std::sync::Arc::new(StubVectorStore { hits }),
            embedding: std::sync::Arc::new(crate::embedding::DeterministicClient::new(
                8,
                "test:model".into(),
            )),
            llm: None,
            query_expansion_enabled: false,
            max_query_variants: 3,
            auto_reranking_enabled: false,
            reranking_threshold: 8,
            expansion_cache: Mutex::new(HashMap::new()),
        }
    }

    #[tokio::test]
    async fn rejects_empty_query() {
        let pipeline = pipeline(vec![]);
        let request = SearchRequest {
            query: "   ".into(),
            collection: CollectionId("docs".into()),
            limit: 5,
            similarity_threshold: 0.0,
            filter: SearchFilter::default(),
            expand_context: false,
        };
        let err = pipeline.vector_search(request, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation("missing_query", _)));
    }

    #[tokio::test]
    async fn returns_ranked_results_within_limit() {
        let pipeline = pipeline(vec![sample_chunk("a", 0.9), sample_chunk("b", 0.8)]);
        let request = SearchRequest {
            query: "hello".into(),
            collection: CollectionId("docs".into()),
            limit: 1,
            similarity_threshold: 0.0,
            filter: SearchFilter::default(),
            expand_context: false,
        };
        let response = pipeline.vector_search(request, CancellationToken::new()).await.unwrap();
        assert_eq!(response.results.len(), 1);
        assert!(!response.expansion_used);
    }

    #[tokio::test]
    async fn rag_query_degrades_without_llm() {
        let pipeline = pipeline(vec![sample_chunk("a", 0.9)]);
        let request = SearchRequest {
            query: "hello".into(),
            collection: CollectionId("docs".into()),
            limit: 5,
            similarity_threshold: 0.0,
            filter: SearchFilter::default(),
            expand_context: false,
        };
        let response = pipeline.rag_query(request, CancellationToken::new()).await.unwrap();
        assert!(response.degraded);
        assert!(response.answer.is_none());
        assert_eq!(response.sources.len(), 1);
    }
}
