//! Service container and the protocol-agnostic use-case layer.
//!
//! `ServiceContainer` owns every process-wide singleton (collection store, vector store,
//! embedding client, optional LLM client, sync coordinator, query pipeline, crawl adapter) and
//! implements [`KnowledgeBaseApi`], the single source of business logic both protocol adapters
//! call through. Every operation is first an inherent method on `ServiceContainer`, then
//! re-exposed through the trait by delegation, so the inherent methods stay directly callable
//! from tests without going through dynamic dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::crawl::{CrawlAdapter, CrawlError, DeepCrawlResult, ExtractedPage, LinkPreview, StubCrawlAdapter};
use crate::embedding::{self, EmbeddingClient};
use crate::error::UseCaseError;
use crate::ids::{CollectionId, FileId};
use crate::llm;
use crate::metrics::{CodeMetrics, MetricsSnapshot};
use crate::query::{QueryPipeline, RagResponse, SearchRequest, SearchResponse};
use crate::store::{self, Collection, CollectionStore, FileRecord};
use crate::sync::{SyncCoordinator, SyncReport, SyncStatus};
use crate::vectorstore::{self, VectorStore};

/// Process-wide owner of every singleton the use-case layer depends on.
pub struct ServiceContainer {
    store: Arc<dyn CollectionStore>,
    vector_store: Arc<dyn VectorStore>,
    crawl: Arc<dyn CrawlAdapter>,
    sync: Arc<SyncCoordinator>,
    query: Arc<QueryPipeline>,
    metrics: Arc<CodeMetrics>,
}

impl ServiceContainer {
    /// Construct every singleton from process configuration. Fatal at startup on misconfiguration,
    /// matching the "bad configuration is a fatal startup error" philosophy for this process.
    pub async fn new(config: &Config) -> Self {
        let store = store::build_store(config).expect("failed to initialize collection store");
        let vector_store = vectorstore::build_vector_store(config).expect("failed to initialize vector store");
        let embedding_client: Arc<dyn EmbeddingClient + Send + Sync> = Arc::from(embedding::get_embedding_client());
        let llm_client = llm::get_llm_client();
        let metrics = Arc::new(CodeMetrics::new());

        let sync = Arc::new(SyncCoordinator::new(
            store.clone(),
            vector_store.clone(),
            embedding_client.clone(),
            metrics.clone(),
            config,
        ));
        let query = Arc::new(QueryPipeline::new(vector_store.clone(), embedding_client, llm_client, config));

        Self { store, vector_store, crawl: Arc::new(StubCrawlAdapter), sync, query, metrics }
    }

    /// Create a new, empty collection.
    pub async fn create_collection(&self, name: &str, description: &str) -> Result<Collection, UseCaseError> {
        Ok(self.store.create_collection(name, description).await?)
    }

    /// List every collection.
    pub async fn list_collections(&self) -> Result<Vec<Collection>, UseCaseError> {
        Ok(self.store.list_collections().await?)
    }

    /// Fetch one collection by id.
    pub async fn get_collection(&self, id: &CollectionId) -> Result<Collection, UseCaseError> {
        Ok(self.store.get_collection(id).await?)
    }

    /// Delete a collection, its files, and its vector records.
    pub async fn delete_collection(&self, id: &CollectionId) -> Result<(), UseCaseError> {
        self.store.delete_collection(id).await?;
        if let Err(err) = self.vector_store.delete_collection(id).await {
            tracing::warn!(collection = %id, error = %err, "deferred vector cleanup after collection delete");
        }
        Ok(())
    }

    /// Save (create or overwrite) a file.
    pub async fn save_file(
        &self,
        collection: &CollectionId,
        folder: &str,
        name: &str,
        content: &str,
        source_url: Option<&str>,
    ) -> Result<FileRecord, UseCaseError> {
        Ok(self.store.save_file(collection, folder, name, content, source_url).await?)
    }

    /// Read a file by id.
    pub async fn read_file(&self, file_id: &FileId) -> Result<FileRecord, UseCaseError> {
        Ok(self.store.read_file(file_id).await?)
    }

    /// Replace a file's content in place.
    pub async fn update_file(&self, file_id: &FileId, content: &str) -> Result<FileRecord, UseCaseError> {
        Ok(self.store.update_file(file_id, content).await?)
    }

    /// Delete a file and its vector records.
    pub async fn delete_file(&self, collection: &CollectionId, file_id: &FileId) -> Result<(), UseCaseError> {
        self.store.delete_file(file_id).await?;
        if let Err(err) = self.vector_store.delete_by_file(collection, file_id).await {
            tracing::warn!(file = %file_id, error = %err, "deferred vector cleanup after file delete");
        }
        Ok(())
    }

    /// List every file in a collection.
    pub async fn list_files(&self, collection: &CollectionId) -> Result<Vec<FileRecord>, UseCaseError> {
        Ok(self.store.list_files(collection).await?)
    }

    /// Force an immediate filesystem-mode reconciliation pass, ahead of the poll interval.
    /// A no-op for backends that reconcile on every read (the embedded database backend).
    pub async fn reconcile_now(&self, collection: Option<&CollectionId>) -> Result<(), UseCaseError> {
        Ok(self.store.reconcile_now(collection).await?)
    }

    /// Extract a single URL's content without persisting it anywhere.
    pub async fn extract_one(&self, url: &str) -> Result<ExtractedPage, UseCaseError> {
        self.crawl.extract_one(url).await.map_err(crawl_error)
    }

    /// Crawl outward from a URL, bounded by depth and page count.
    pub async fn deep_crawl(&self, url: &str, max_depth: u32, max_pages: usize) -> Result<DeepCrawlResult, UseCaseError> {
        self.crawl.deep_crawl(url, max_depth, max_pages).await.map_err(crawl_error)
    }

    /// List the links discoverable from a URL without following them.
    pub async fn preview_links(&self, url: &str) -> Result<Vec<LinkPreview>, UseCaseError> {
        self.crawl.preview_links(url).await.map_err(crawl_error)
    }

    /// Fetch a URL and save its extracted content as a file in a collection.
    pub async fn crawl_into_collection(
        &self,
        collection: &CollectionId,
        folder: &str,
        url: &str,
    ) -> Result<FileRecord, UseCaseError> {
        let page = self.crawl.extract_one(url).await.map_err(crawl_error)?;
        let name = page
            .title
            .as_deref()
            .map(crate::ids::sanitize_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| crate::ids::content_hash(url.as_bytes()));
        Ok(self
            .store
            .save_file(collection, folder, &format!("{name}.md"), &page.markdown, Some(url))
            .await?)
    }

    /// Enable user-triggered sync for a collection.
    pub async fn enable_sync(&self, collection: &CollectionId) -> Result<(), UseCaseError> {
        self.sync.enable(collection);
        Ok(())
    }

    /// Disable sync for a collection.
    pub async fn disable_sync(&self, collection: &CollectionId) -> Result<(), UseCaseError> {
        self.sync.disable(collection);
        Ok(())
    }

    /// Run an incremental sync for a collection.
    pub async fn sync_now(
        &self,
        collection: &CollectionId,
        cancellation: CancellationToken,
    ) -> Result<SyncReport, UseCaseError> {
        Ok(self.sync.sync_now(collection, cancellation).await?)
    }

    /// Fetch a collection's current sync status.
    pub async fn sync_status(&self, collection: &CollectionId) -> Result<SyncStatus, UseCaseError> {
        Ok(self.sync.status(collection)?)
    }

    /// List sync status for every collection that has one.
    pub async fn list_sync_statuses(&self) -> Result<Vec<SyncStatus>, UseCaseError> {
        Ok(self.sync.list_statuses())
    }

    /// Delete all vector records for a collection without touching its files.
    pub async fn delete_vectors(&self, collection: &CollectionId) -> Result<(), UseCaseError> {
        Ok(self.sync.delete_vectors(collection).await?)
    }

    /// Run the search pipeline.
    pub async fn vector_search(
        &self,
        request: SearchRequest,
        cancellation: CancellationToken,
    ) -> Result<SearchResponse, UseCaseError> {
        self.store.get_collection(&request.collection).await?;
        self.metrics.record_query();
        Ok(self.query.vector_search(request, cancellation).await?)
    }

    /// Run the RAG query use-case.
    pub async fn rag_query(
        &self,
        request: SearchRequest,
        cancellation: CancellationToken,
    ) -> Result<RagResponse, UseCaseError> {
        self.store.get_collection(&request.collection).await?;
        self.metrics.record_rag_query();
        Ok(self.query.rag_query(request, cancellation).await?)
    }

    /// Current diagnostic counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn crawl_error(err: CrawlError) -> UseCaseError {
    match err {
        CrawlError::InvalidUrl(msg) => UseCaseError::validation("invalid_url", msg),
        CrawlError::FetchFailed(msg) => UseCaseError::dependency_unavailable(msg),
    }
}

/// Protocol-agnostic use-case surface implemented by [`ServiceContainer`] and invoked identically
/// by both the RPC and HTTP adapters.
#[async_trait]
pub trait KnowledgeBaseApi: Send + Sync {
    /// Create a new, empty collection.
    async fn create_collection(&self, name: &str, description: &str) -> Result<Collection, UseCaseError>;
    /// List every collection.
    async fn list_collections(&self) -> Result<Vec<Collection>, UseCaseError>;
    /// Fetch one collection by id.
    async fn get_collection(&self, id: &CollectionId) -> Result<Collection, UseCaseError>;
    /// Delete a collection, its files, and its vector records.
    async fn delete_collection(&self, id: &CollectionId) -> Result<(), UseCaseError>;

    /// Save (create or overwrite) a file.
    async fn save_file(
        &self,
        collection: &CollectionId,
        folder: &str,
        name: &str,
        content: &str,
        source_url: Option<&str>,
    ) -> Result<FileRecord, UseCaseError>;
    /// Read a file by id.
    async fn read_file(&self, file_id: &FileId) -> Result<FileRecord, UseCaseError>;
    /// Replace a file's content in place.
    async fn update_file(&self, file_id: &FileId, content: &str) -> Result<FileRecord, UseCaseError>;
    /// Delete a file and its vector records.
    async fn delete_file(&self, collection: &CollectionId, file_id: &FileId) -> Result<(), UseCaseError>;
    /// List every file in a collection.
    async fn list_files(&self, collection: &CollectionId) -> Result<Vec<FileRecord>, UseCaseError>;
    /// Force an immediate filesystem-mode reconciliation pass, ahead of the poll interval.
    async fn reconcile_now(&self, collection: Option<&CollectionId>) -> Result<(), UseCaseError>;

    /// Extract a single URL's content without persisting it anywhere.
    async fn extract_one(&self, url: &str) -> Result<ExtractedPage, UseCaseError>;
    /// Crawl outward from a URL, bounded by depth and page count.
    async fn deep_crawl(&self, url: &str, max_depth: u32, max_pages: usize) -> Result<DeepCrawlResult, UseCaseError>;
    /// List the links discoverable from a URL without following them.
    async fn preview_links(&self, url: &str) -> Result<Vec<LinkPreview>, UseCaseError>;
    /// Fetch a URL and save its extracted content as a file in a collection.
    async fn crawl_into_collection(
        &self,
        collection: &CollectionId,
        folder: &str,
        url: &str,
    ) -> Result<FileRecord, UseCaseError>;

    /// Enable user-triggered sync for a collection.
    async fn enable_sync(&self, collection: &CollectionId) -> Result<(), UseCaseError>;
    /// Disable sync for a collection.
    async fn disable_sync(&self, collection: &CollectionId) -> Result<(), UseCaseError>;
    /// Run an incremental sync for a collection.
    async fn sync_now(&self, collection: &CollectionId, cancellation: CancellationToken) -> Result<SyncReport, UseCaseError>;
    /// Fetch a collection's current sync status.
    async fn sync_status(&self, collection: &CollectionId) -> Result<SyncStatus, UseCaseError>;
    /// List sync status for every collection that has one.
    async fn list_sync_statuses(&self) -> Result<Vec<SyncStatus>, UseCaseError>;
    /// Delete all vector records for a collection without touching its files.
    async fn delete_vectors(&self, collection: &CollectionId) -> Result<(), UseCaseError>;

    /// Run the search pipeline.
    async fn vector_search(
        &self,
        request: SearchRequest,
        cancellation: CancellationToken,
    ) -> Result<SearchResponse, UseCaseError>;
    /// Run the RAG query use-case.
    async fn rag_query(&self, request: SearchRequest, cancellation: CancellationToken) -> Result<RagResponse, UseCaseError>;
    /// Current diagnostic counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

#[async_trait]
impl KnowledgeBaseApi for ServiceContainer {
    async fn create_collection(&self, name: &str, description: &str) -> Result<Collection, UseCaseError> {
        ServiceContainer::create_collection(self, name, description).await
    }

    async fn list_collections(&self) -> Result<Vec<Collection>, UseCaseError> {
        ServiceContainer::list_collections(self).await
    }

    async fn get_collection(&self, id: &CollectionId) -> Result<Collection, UseCaseError> {
        ServiceContainer::get_collection(self, id).await
    }

    async fn delete_collection(&self, id: &CollectionId) -> Result<(), UseCaseError> {
        ServiceContainer::delete_collection(self, id).await
    }

    async fn save_file(
        &self,
        collection: &CollectionId,
        folder: &str,
        name: &str,
        content: &str,
        source_url: Option<&str>,
    ) -> Result<FileRecord, UseCaseError> {
        ServiceContainer::save_file(self, collection, folder, name, content, source_url).await
    }

    async fn read_file(&self, file_id: &FileId) -> Result<FileRecord, UseCaseError> {
        ServiceContainer::read_file(self, file_id).await
    }

    async fn update_file(&self, file_id: &FileId, content: &str) -> Result<FileRecord, UseCaseError> {
        ServiceContainer::update_file(self, file_id, content).await
    }

    async fn delete_file(&self, collection: &CollectionId, file_id: &FileId) -> Result<(), UseCaseError> {
        ServiceContainer::delete_file(self, collection, file_id).await
    }

    async fn list_files(&self, collection: &CollectionId) -> Result<Vec<FileRecord>, UseCaseError> {
        ServiceContainer::list_files(self, collection).await
    }

    async fn reconcile_now(&self, collection: Option<&CollectionId>) -> Result<(), UseCaseError> {
        ServiceContainer::reconcile_now(self, collection).await
    }

    async fn extract_one(&self, url: &str) -> Result<ExtractedPage, UseCaseError> {
        ServiceContainer::extract_one(self, url).await
    }

    async fn deep_crawl(&self, url: &str, max_depth: u32, max_pages: usize) -> Result<DeepCrawlResult, UseCaseError> {
        ServiceContainer::deep_crawl(self, url, max_depth, max_pages).await
    }

    async fn preview_links(&self, url: &str) -> Result<Vec<LinkPreview>, UseCaseError> {
        ServiceContainer::preview_links(self, url).await
    }

    async fn crawl_into_collection(
        &self,
        collection: &CollectionId,
        folder: &str,
        url: &str,
    ) -> Result<FileRecord, UseCaseError> {
        ServiceContainer::crawl_into_collection(self, collection, folder, url).await
    }

    async fn enable_sync(&self, collection: &CollectionId) -> Result<(), UseCaseError> {
        ServiceContainer::enable_sync(self, collection).await
    }

    async fn disable_sync(&self, collection: &CollectionId) -> Result<(), UseCaseError> {
        ServiceContainer::disable_sync(self, collection).await
    }

    async fn sync_now(&self, collection: &CollectionId, cancellation: CancellationToken) -> Result<SyncReport, UseCaseError> {
        ServiceContainer::sync_now(self, collection, cancellation).await
    }

    async fn sync_status(&self, collection: &CollectionId) -> Result<SyncStatus, UseCaseError> {
        ServiceContainer::sync_status(self, collection).await
    }

    async fn list_sync_statuses(&self) -> Result<Vec<SyncStatus>, UseCaseError> {
        ServiceContainer::list_sync_statuses(self).await
    }

    async fn delete_vectors(&self, collection: &CollectionId) -> Result<(), UseCaseError> {
        ServiceContainer::delete_vectors(self, collection).await
    }

    async fn vector_search(
        &self,
        request: SearchRequest,
        cancellation: CancellationToken,
    ) -> Result<SearchResponse, UseCaseError> {
        ServiceContainer::vector_search(self, request, cancellation).await
    }

    async fn rag_query(&self, request: SearchRequest, cancellation: CancellationToken) -> Result<RagResponse, UseCaseError> {
        ServiceContainer::rag_query(self, request, cancellation).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        ServiceContainer::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkStrategy, EmbeddingProvider, LlmProvider, StorageBackend};

    fn test_config() -> Config {
        Config {
            collection_storage_type: StorageBackend::EmbeddedDb,
            collection_storage_path: ":memory:".to_string(),
            vector_store_url: "http://127.0.0.1:6333".to_string(),
            vector_store_api_key: None,
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: "test-model".to_string(),
            embedding_dimension: 8,
            ollama_url: None,
            server_port: None,
            search_default_limit: 5,
            search_max_limit: 50,
            search_default_score_threshold: 0.0,
            chunk_strategy: ChunkStrategy::MarkdownIntelligent,
            chunk_size: 500,
            chunk_overlap_ratio: 0.2,
            llm_provider: LlmProvider::None,
            llm_model: None,
            query_expansion_enabled: false,
            max_query_variants: 3,
            auto_reranking_enabled: false,
            reranking_threshold: 8,
            context_expansion_enabled: true,
            sync_max_file_concurrency: 4,
            sync_retry_attempts: 1,
            sync_retry_backoff_base_ms: 10,
            fs_reconcile_poll_interval_secs: 0,
        }
    }

    #[tokio::test]
    async fn create_and_read_collection_round_trips() {
        let container = ServiceContainer::new(&test_config()).await;
        let collection = container.create_collection("docs", "test collection").await.unwrap();
        let fetched = container.get_collection(&collection.id).await.unwrap();
        assert_eq!(fetched.name, "docs");
    }

    #[tokio::test]
    async fn create_collection_twice_conflicts() {
        let container = ServiceContainer::new(&test_config()).await;
        container.create_collection("docs", "first").await.unwrap();
        let err = container.create_collection("docs", "second").await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn save_then_read_file_round_trips_content() {
        let container = ServiceContainer::new(&test_config()).await;
        let collection = container.create_collection("docs", "").await.unwrap();
        let saved = container
            .save_file(&collection.id, "", "a.md", "# H\n\nhello", None)
            .await
            .unwrap();
        let read = container.read_file(&saved.id).await.unwrap();
        assert_eq!(read.content, "# H\n\nhello");
    }

    #[tokio::test]
    async fn reconcile_now_is_a_no_op_on_the_embedded_database_backend() {
        let container = ServiceContainer::new(&test_config()).await;
        let collection = container.create_collection("docs", "").await.unwrap();
        container.reconcile_now(Some(&collection.id)).await.unwrap();
    }

    #[tokio::test]
    async fn search_against_missing_collection_is_not_found() {
        let container = ServiceContainer::new(&test_config()).await;
        let request = SearchRequest {
            query: "hello".into(),
            collection: CollectionId("missing".into()),
            limit: 5,
            similarity_threshold: 0.0,
            filter: crate::vectorstore::SearchFilter::default(),
            expand_context: false,
        };
        let err = container.vector_search(request, CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }
}
