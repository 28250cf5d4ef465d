//! Sync coordinator: brings the vector index into agreement with a collection's file contents.
//!
//! User-triggered only; incremental via content-hash diffing. Per-collection locking (one sync
//! at a time per collection, collections proceed independently), bounded-concurrency batch
//! processing via `futures_util::stream::buffer_unordered`, and per-file retry with exponential
//! backoff so one file's provider failure never aborts the whole run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::chunking::{ChunkDraft, chunk_document};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::ids::{CollectionId, FileId, now_rfc3339};
use crate::store::CollectionStore;
use crate::vectorstore::{ChunkMetadata, EmbeddingRecord, RelatedChunkIds, VectorStore};

/// Errors raised by the sync coordinator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The referenced collection has no known sync status (never synced, or unknown id).
    #[error("no sync status for collection '{0}'")]
    NotFound(String),
    /// An internal invariant was violated.
    #[error("sync failed: {0}")]
    Internal(String),
}

/// Lifecycle state of a collection's vector index relative to its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No sync has ever run for this collection.
    NeverSynced,
    /// The vector index matches the files as of the last sync.
    InSync,
    /// Files have changed since the last successful sync.
    OutOfSync,
    /// A sync is currently running.
    Syncing,
    /// The last sync completed with one or more file errors.
    Error,
}

/// Per-collection sync status, tracked in-process by the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Owning collection.
    pub collection_id: CollectionId,
    /// Current lifecycle state.
    pub state: SyncState,
    /// Whether sync is enabled for this collection (disabled collections are skipped by
    /// schedulers; `sync_now` still works when called explicitly).
    pub enabled: bool,
    /// Total files known at last scan.
    pub file_count: u64,
    /// Files whose content changed since the last successful sync.
    pub changed_file_count: u64,
    /// Total chunks currently indexed.
    pub chunk_count: u64,
    /// RFC-3339 timestamp of the last successful sync completion.
    pub last_synced_at: Option<String>,
    /// Files processed so far in the current (or most recent) run.
    pub files_processed: u64,
    /// Total files targeted by the current (or most recent) run.
    pub files_total: u64,
    /// Most recent error summary, when `state == Error`.
    pub last_error: Option<String>,
    /// Embedding model fingerprint the index currently holds records for.
    pub model_fingerprint: Option<String>,
}

impl SyncStatus {
    fn new(collection_id: CollectionId) -> Self {
        Self {
            collection_id,
            state: SyncState::NeverSynced,
            enabled: true,
            file_count: 0,
            changed_file_count: 0,
            chunk_count: 0,
            last_synced_at: None,
            files_processed: 0,
            files_total: 0,
            last_error: None,
            model_fingerprint: None,
        }
    }
}

/// Outcome of a single `sync_now` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Files successfully re-chunked and re-embedded (or removed).
    pub files_processed: u64,
    /// Files targeted by this run.
    pub files_total: u64,
    /// Per-file errors encountered, file id to message.
    pub errors: Vec<(String, String)>,
    /// Whether the run was cancelled before completing all files.
    pub cancelled: bool,
}

struct FileSnapshot {
    hashes: HashMap<FileId, String>,
    chunk_counts: HashMap<FileId, u64>,
}

impl FileSnapshot {
    fn empty() -> Self {
        Self { hashes: HashMap::new(), chunk_counts: HashMap::new() }
    }
}

/// Coordinates incremental synchronization between a collection store and a vector store.
pub struct SyncCoordinator {
    store: Arc<dyn CollectionStore>,
    vector_store: Arc<dyn VectorStore>,
    embedding: Arc<dyn EmbeddingClient + Send + Sync>,
    metrics: Arc<crate::metrics::CodeMetrics>,
    concurrency: usize,
    retry_attempts: u32,
    retry_backoff_base_ms: u64,
    chunk_size: usize,
    chunk_overlap_ratio: f32,
    chunk_strategy: crate::config::ChunkStrategy,

    locks: std::sync::Mutex<HashMap<CollectionId, Arc<AsyncMutex<()>>>>,
    statuses: std::sync::Mutex<HashMap<CollectionId, SyncStatus>>,
    snapshots: std::sync::Mutex<HashMap<CollectionId, FileSnapshot>>,
}

impl SyncCoordinator {
    /// Construct a coordinator from the service container's shared singletons and configuration.
    pub fn new(
        store: Arc<dyn CollectionStore>,
        vector_store: Arc<dyn VectorStore>,
        embedding: Arc<dyn EmbeddingClient + Send + Sync>,
        metrics: Arc<crate::metrics::CodeMetrics>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            vector_store,
            embedding,
            metrics,
            concurrency: config.sync_max_file_concurrency,
            retry_attempts: config.sync_retry_attempts,
            retry_backoff_base_ms: config.sync_retry_backoff_base_ms,
            chunk_size: config.chunk_size,
            chunk_overlap_ratio: config.chunk_overlap_ratio,
            chunk_strategy: config.chunk_strategy,
            locks: std::sync::Mutex::new(HashMap::new()),
            statuses: std::sync::Mutex::new(HashMap::new()),
            snapshots: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, collection: &CollectionId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("locks mutex poisoned");
        locks
            .entry(collection.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Enable scheduled sync for a collection (does not itself trigger a run).
    pub fn enable(&self, collection: &CollectionId) {
        let mut statuses = self.statuses.lock().expect("status mutex poisoned");
        statuses
            .entry(collection.clone())
            .or_insert_with(|| SyncStatus::new(collection.clone()))
            .enabled = true;
    }

    /// Disable scheduled sync for a collection.
    pub fn disable(&self, collection: &CollectionId) {
        let mut statuses = self.statuses.lock().expect("status mutex poisoned");
        statuses
            .entry(collection.clone())
            .or_insert_with(|| SyncStatus::new(collection.clone()))
            .enabled = false;
    }

    /// Fetch the current status for one collection.
    pub fn status(&self, collection: &CollectionId) -> Result<SyncStatus, SyncError> {
        let statuses = self.statuses.lock().expect("status mutex poisoned");
        statuses
            .get(collection)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(collection.0.clone()))
    }

    /// List status records for every collection the coordinator has seen.
    pub fn list_statuses(&self) -> Vec<SyncStatus> {
        let statuses = self.statuses.lock().expect("status mutex poisoned");
        statuses.values().cloned().collect()
    }

    fn set_status<F: FnOnce(&mut SyncStatus)>(&self, collection: &CollectionId, f: F) {
        let mut statuses = self.statuses.lock().expect("status mutex poisoned");
        let entry = statuses
            .entry(collection.clone())
            .or_insert_with(|| SyncStatus::new(collection.clone()));
        f(entry);
    }

    /// Delete every vector record for a collection without touching its files.
    pub async fn delete_vectors(&self, collection: &CollectionId) -> Result<(), SyncError> {
        self.vector_store
            .delete_collection(collection)
            .await
            .map_err(|e| SyncError::Internal(e.to_string()))?;
        self.snapshots.lock().expect("snapshot mutex poisoned").remove(collection);
        self.set_status(collection, |status| {
            status.state = SyncState::NeverSynced;
            status.chunk_count = 0;
            status.model_fingerprint = None;
        });
        Ok(())
    }

    /// Run an incremental sync for `collection`, observing `cancellation` at file-batch
    /// boundaries.
    pub async fn sync_now(
        &self,
        collection: &CollectionId,
        cancellation: CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let guard = self.lock_for(collection);
        let _permit = guard.lock().await;

        self.set_status(collection, |status| status.state = SyncState::Syncing);

        let files = self
            .store
            .list_files(collection)
            .await
            .map_err(|e| SyncError::Internal(e.to_string()))?;

        let fingerprint_key = self.embedding.fingerprint();
        let stored_fingerprint = self
            .statuses
            .lock()
            .expect("status mutex poisoned")
            .get(collection)
            .and_then(|s| s.model_fingerprint.clone());

        let full_reembed = stored_fingerprint
            .as_ref()
            .is_some_and(|existing| existing != &fingerprint_key);

        if full_reembed {
            tracing::info!(collection = %collection.0, "embedding model changed; performing full re-embed");
            let _ = self.vector_store.delete_collection(collection).await;
            self.snapshots.lock().expect("snapshot mutex poisoned").remove(collection);
        }

        let previous_hashes = {
            let mut snapshots = self.snapshots.lock().expect("snapshot mutex poisoned");
            snapshots
                .entry(collection.clone())
                .or_insert_with(FileSnapshot::empty)
                .hashes
                .clone()
        };

        let current_ids: std::collections::HashSet<FileId> =
            files.iter().map(|f| f.id.clone()).collect();

        let removed: Vec<FileId> = previous_hashes
            .keys()
            .filter(|id| !current_ids.contains(*id))
            .cloned()
            .collect();

        let to_process: Vec<_> = files
            .into_iter()
            .filter(|file| {
                full_reembed
                    || previous_hashes
                        .get(&file.id)
                        .is_none_or(|hash| hash != &file.content_hash)
            })
            .collect();

        for file_id in &removed {
            if let Err(err) = self.vector_store.delete_by_file(collection, file_id).await {
                tracing::warn!(file_id = %file_id.0, error = %err, "failed to delete vectors for removed file");
            }
            if let Some(snap) = self.snapshots.lock().expect("snapshot mutex poisoned").get_mut(collection) {
                snap.hashes.remove(file_id);
                snap.chunk_counts.remove(file_id);
            }
        }

        self.set_status(collection, |status| {
            status.files_total = to_process.len() as u64;
            status.files_processed = 0;
        });

        let concurrency = self.concurrency.max(1);
        let collection = collection.clone();
        let cancellation_for_stream = cancellation.clone();

        let results: Vec<(FileId, Result<(String, usize), String>)> = stream::iter(to_process.into_iter())
            .map(|file| {
                let collection = collection.clone();
                let cancellation = cancellation_for_stream.clone();
                async move {
                    if cancellation.is_cancelled() {
                        return (file.id.clone(), Err("cancelled".to_string()));
                    }
                    let outcome = self.sync_one_file(&collection, &file, &fingerprint_key).await;
                    (file.id.clone(), outcome.map(|count| (file.content_hash.clone(), count)))
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut errors = Vec::new();
        let mut processed = 0u64;

        for (file_id, outcome) in results {
            match outcome {
                Ok((hash, chunk_count)) => {
                    processed += 1;
                    let mut snapshots = self.snapshots.lock().expect("snapshot mutex poisoned");
                    let snap = snapshots.entry(collection.clone()).or_insert_with(FileSnapshot::empty);
                    snap.hashes.insert(file_id.clone(), hash);
                    snap.chunk_counts.insert(file_id, chunk_count as u64);
                    drop(snapshots);
                    self.set_status(&collection, |status| status.files_processed += 1);
                }
                Err(message) => {
                    errors.push((file_id.0.clone(), message));
                }
            }
        }

        let cancelled = cancellation.is_cancelled();
        self.metrics.record_sync(processed, errors.len() as u64);

        let current_chunk_total: u64 = self
            .snapshots
            .lock()
            .expect("snapshot mutex poisoned")
            .get(&collection)
            .map(|snap| snap.chunk_counts.values().sum())
            .unwrap_or(0);

        self.set_status(&collection, |status| {
            status.model_fingerprint = Some(fingerprint_key.clone());
            status.chunk_count = current_chunk_total;
            status.changed_file_count = processed;
            if cancelled {
                status.state = SyncState::OutOfSync;
            } else if errors.is_empty() {
                status.state = SyncState::InSync;
                status.last_synced_at = Some(now_rfc3339());
                status.last_error = None;
            } else {
                status.state = SyncState::Error;
                status.last_error = Some(format!("{} file(s) failed", errors.len()));
            }
        });

        Ok(SyncReport {
            files_processed: processed,
            files_total: errors.len() as u64 + processed,
            errors,
            cancelled,
        })
    }

    async fn sync_one_file(
        &self,
        collection: &CollectionId,
        file: &crate::store::FileRecord,
        fingerprint_key: &str,
    ) -> Result<usize, String> {
        let mut attempt = 0u32;
        loop {
            match self.try_embed_file(collection, file, fingerprint_key).await {
                Ok(count) => return Ok(count),
                Err(err) if attempt < self.retry_attempts => {
                    attempt += 1;
                    let backoff = self.retry_backoff_base_ms * 2u64.pow(attempt - 1);
                    tracing::warn!(
                        file_id = %file.id.0,
                        attempt,
                        error = %err,
                        "sync attempt failed; retrying after backoff"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_embed_file(
        &self,
        collection: &CollectionId,
        file: &crate::store::FileRecord,
        fingerprint_key: &str,
    ) -> Result<usize, String> {
        let drafts = chunk_document(&file.content, self.chunk_size, self.chunk_overlap_ratio, self.chunk_strategy)
            .map_err(|e| e.to_string())?;

        if drafts.is_empty() {
            let _ = self.vector_store.delete_by_file(collection, &file.id).await;
            return Ok(0);
        }

        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
        let vectors = self
            .embedding
            .generate_embeddings(texts)
            .await
            .map_err(|e| e.to_string())?;

        let records = build_records(collection, &file.id, &drafts, vectors);
        self.vector_store
            .delete_by_file(collection, &file.id)
            .await
            .map_err(|e| e.to_string())?;
        self.vector_store
            .upsert(collection, fingerprint_key, records)
            .await
            .map_err(|e| e.to_string())?;

        Ok(drafts.len())
    }
}

fn build_records(
    collection: &CollectionId,
    file_id: &FileId,
    drafts: &[ChunkDraft],
    vectors: Vec<Vec<f32>>,
) -> Vec<EmbeddingRecord> {
    let created_at = now_rfc3339();
    let mut last_heading_id: Option<crate::ids::ChunkId> = None;
    let mut chunk_ids: Vec<crate::ids::ChunkId> = Vec::with_capacity(drafts.len());

    for (idx, draft) in drafts.iter().enumerate() {
        let _ = draft;
        chunk_ids.push(crate::ids::ChunkId(format!("{}:{}", file_id.0, idx)));
    }

    let mut records = Vec::with_capacity(drafts.len());
    for (idx, (draft, vector)) in drafts.iter().zip(vectors.into_iter()).enumerate() {
        let chunk_id = chunk_ids[idx].clone();
        let previous = if idx > 0 { Some(chunk_ids[idx - 1].clone()) } else { None };
        let next = chunk_ids.get(idx + 1).cloned();
        let overlap_partners: Vec<crate::ids::ChunkId> =
            previous.iter().chain(next.iter()).cloned().collect();

        let parent_section = if draft.chunk_type == crate::chunking::ChunkType::Heading {
            let current = last_heading_id.clone();
            last_heading_id = Some(chunk_id.clone());
            current
        } else {
            last_heading_id.clone()
        };

        let contains_code = draft.chunk_type == crate::chunking::ChunkType::CodeBlock;
        let chunk_type_name = match draft.chunk_type {
            crate::chunking::ChunkType::Heading => "header_section",
            crate::chunking::ChunkType::CodeBlock => "code_block",
            crate::chunking::ChunkType::Table => "table",
            crate::chunking::ChunkType::List => "list",
            crate::chunking::ChunkType::Blockquote | crate::chunking::ChunkType::Prose => "paragraph",
        };

        records.push(EmbeddingRecord {
            chunk_id,
            vector,
            metadata: ChunkMetadata {
                collection_id: collection.clone(),
                file_id: file_id.clone(),
                position: idx as u32,
                text: draft.text.clone(),
                length: draft.text.chars().count() as u32,
                contains_code,
                language: draft.language.clone(),
                header_hierarchy: draft.header_hierarchy.join(" > "),
                chunk_type: chunk_type_name.to_string(),
                content_hash: crate::ids::content_hash(draft.text.as_bytes()),
                created_at: created_at.clone(),
            },
            related: RelatedChunkIds { previous, next, overlap_partners, parent_section },
        });
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DeterministicClient;
    use crate::store::db::DbCollectionStore;
    use std::sync::Arc;

    struct NoopVectorStore {
        upserted: std::sync::Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl VectorStore for NoopVectorStore {
        async fn upsert(
            &self,
            _collection: &CollectionId,
            _fingerprint_key: &str,
            records: Vec<EmbeddingRecord>,
        ) -> Result<(), crate::vectorstore::VectorStoreError> {
            *self.upserted.lock().unwrap() += records.len();
            Ok(())
        }
        async fn search(
            &self,
            _collection: &CollectionId,
            _vector: &[f32],
            _limit: usize,
            _score_threshold: Option<f32>,
            _filter: &crate::vectorstore::SearchFilter,
        ) -> Result<Vec<crate::vectorstore::ScoredChunk>, crate::vectorstore::VectorStoreError> {
            Ok(Vec::new())
        }
        async fn fetch_by_ids(
            &self,
            _collection: &CollectionId,
            _ids: &[crate::ids::ChunkId],
        ) -> Result<Vec<crate::vectorstore::ScoredChunk>, crate::vectorstore::VectorStoreError> {
            Ok(Vec::new())
        }
        async fn delete_by_ids(
            &self,
            _collection: &CollectionId,
            _ids: &[crate::ids::ChunkId],
        ) -> Result<(), crate::vectorstore::VectorStoreError> {
            Ok(())
        }
        async fn delete_collection(&self, _collection: &CollectionId) -> Result<(), crate::vectorstore::VectorStoreError> {
            Ok(())
        }
        async fn delete_by_file(&self, _collection: &CollectionId, _file_id: &FileId) -> Result<(), crate::vectorstore::VectorStoreError> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        Config {
            collection_storage_type: crate::config::StorageBackend::EmbeddedDb,
            collection_storage_path: ":memory:".into(),
            vector_store_url: "http://localhost:6333".into(),
            vector_store_api_key: None,
            embedding_provider: crate::config::EmbeddingProvider::Ollama,
            embedding_model: "test".into(),
            embedding_dimension: 8,
            ollama_url: None,
            server_port: None,
            search_default_limit: 5,
            search_max_limit: 50,
            search_default_score_threshold: 0.25,
            chunk_strategy: crate::config::ChunkStrategy::Baseline,
            chunk_size: 50,
            chunk_overlap_ratio: 0.0,
            llm_provider: crate::config::LlmProvider::None,
            llm_model: None,
            query_expansion_enabled: false,
            max_query_variants: 3,
            auto_reranking_enabled: false,
            reranking_threshold: 8,
            context_expansion_enabled: true,
            sync_max_file_concurrency: 2,
            sync_retry_attempts: 0,
            sync_retry_backoff_base_ms: 1,
            fs_reconcile_poll_interval_secs: 0,
        }
    }

    #[tokio::test]
    async fn sync_now_processes_new_files_and_marks_in_sync() {
        let store: Arc<dyn CollectionStore> = Arc::new(DbCollectionStore::in_memory().unwrap());
        let collection = store.create_collection("docs", "").await.unwrap();
        store.save_file(&collection.id, "", "a.md", "hello world content", None).await.unwrap();

        let vector_store = Arc::new(NoopVectorStore { upserted: std::sync::Mutex::new(0) });
        let embedding = Arc::new(DeterministicClient::new(8, "test".into()));
        let metrics = Arc::new(crate::metrics::CodeMetrics::new());
        let config = test_config();

        let coordinator = SyncCoordinator::new(store, vector_store.clone(), embedding, metrics, &config);
        let report = coordinator
            .sync_now(&collection.id, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.files_processed, 1);
        assert!(report.errors.is_empty());
        assert!(*vector_store.upserted.lock().unwrap() > 0);

        let status = coordinator.status(&collection.id).unwrap();
        assert_eq!(status.state as u8, SyncState::InSync as u8);
    }

    #[tokio::test]
    async fn sync_now_skips_unchanged_files_on_second_run() {
        let store: Arc<dyn CollectionStore> = Arc::new(DbCollectionStore::in_memory().unwrap());
        let collection = store.create_collection("docs", "").await.unwrap();
        store.save_file(&collection.id, "", "a.md", "hello world content", None).await.unwrap();

        let vector_store = Arc::new(NoopVectorStore { upserted: std::sync::Mutex::new(0) });
        let embedding = Arc::new(DeterministicClient::new(8, "test".into()));
        let metrics = Arc::new(crate::metrics::CodeMetrics::new());
        let config = test_config();

        let coordinator = SyncCoordinator::new(store, vector_store, embedding, metrics, &config);
        coordinator.sync_now(&collection.id, CancellationToken::new()).await.unwrap();
        let second = coordinator.sync_now(&collection.id, CancellationToken::new()).await.unwrap();

        assert_eq!(second.files_processed, 0);
    }

    #[tokio::test]
    async fn chunk_count_reflects_current_files_not_accumulated_deltas() {
        let store: Arc<dyn CollectionStore> = Arc::new(DbCollectionStore::in_memory().unwrap());
        let collection = store.create_collection("docs", "").await.unwrap();
        store.save_file(&collection.id, "", "a.md", &"alpha ".repeat(40), None).await.unwrap();
        store.save_file(&collection.id, "", "b.md", &"beta ".repeat(40), None).await.unwrap();

        let vector_store = Arc::new(NoopVectorStore { upserted: std::sync::Mutex::new(0) });
        let embedding = Arc::new(DeterministicClient::new(8, "test".into()));
        let metrics = Arc::new(crate::metrics::CodeMetrics::new());
        let config = test_config();

        let coordinator = SyncCoordinator::new(store.clone(), vector_store, embedding, metrics, &config);
        coordinator.sync_now(&collection.id, CancellationToken::new()).await.unwrap();

        let files = store.list_files(&collection.id).await.unwrap();
        let a = files.iter().find(|f| f.filename == "a.md").unwrap();
        store.update_file(&a.id, "alpha changed").await.unwrap();

        coordinator.sync_now(&collection.id, CancellationToken::new()).await.unwrap();

        let a_chunks = chunk_document("alpha changed", config.chunk_size, config.chunk_overlap_ratio, config.chunk_strategy)
            .unwrap()
            .len();
        let b_chunks = chunk_document(&"beta ".repeat(40), config.chunk_size, config.chunk_overlap_ratio, config.chunk_strategy)
            .unwrap()
            .len();

        let status = coordinator.status(&collection.id).unwrap();
        assert_eq!(status.chunk_count, (a_chunks + b_chunks) as u64);
    }
}
