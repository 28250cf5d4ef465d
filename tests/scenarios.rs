//! End-to-end scenarios exercising the service container against a mocked vector store.
//!
//! Each test targets one of the concrete scenarios the use-case layer is built to satisfy:
//! round-trip file storage, incremental sync with hash-diffing, markdown-aware chunking,
//! graceful RAG degradation, and filesystem-mode external-edit reconciliation.

use httpmock::{Method, MockServer};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use knowledgebase::config::{ChunkStrategy, Config, EmbeddingProvider, LlmProvider, StorageBackend};
use knowledgebase::query::SearchRequest;
use knowledgebase::service::ServiceContainer;
use knowledgebase::vectorstore::SearchFilter;

fn base_config(backend: StorageBackend, storage_path: String, vector_store_url: String) -> Config {
    Config {
        collection_storage_type: backend,
        collection_storage_path: storage_path,
        vector_store_url,
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

/// Mounts the handful of Qdrant-compatible endpoints the vector store client calls during a
/// sync pass: collection existence check, collection creation, fingerprint scroll, and upsert.
/// The scroll mock also serves `delete_by_file`'s scroll-then-delete sweep with an empty page.
fn mount_sync_mocks(server: &MockServer, collection: &str) {
    server.mock(|when, then| {
        when.method(Method::GET).path(format!("/collections/{collection}"));
        then.status(404);
    });
    server.mock(|when, then| {
        when.method(Method::PUT).path(format!("/collections/{collection}"));
        then.status(200).json_body(json!({"result": true}));
    });
    server.mock(|when, then| {
        when.method(Method::POST).path(format!("/collections/{collection}/points/scroll"));
        then.status(200).json_body(json!({"result": {"points": [], "next_page_offset": null}}));
    });
    server.mock(|when, then| {
        when.method(Method::PUT)
            .path(format!("/collections/{collection}/points"))
            .query_param("wait", "true");
        then.status(200).json_body(json!({"result": {"status": "acknowledged"}}));
    });
}

#[tokio::test]
async fn round_trip_save_and_read_file() {
    let server = MockServer::start();
    let config = base_config(StorageBackend::EmbeddedDb, ":memory:".to_string(), server.base_url());
    let container = ServiceContainer::new(&config).await;

    let collection = container.create_collection("docs", "").await.unwrap();
    container.save_file(&collection.id, "folder", "a.md", "# H\n\nhello", None).await.unwrap();

    let files = container.list_files(&collection.id).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].folder_path, "folder");
    assert_eq!(files[0].filename, "a.md");
    assert_eq!(files[0].content, "# H\n\nhello");

    let read_back = container.read_file(&files[0].id).await.unwrap();
    assert_eq!(read_back.content, "# H\n\nhello");
}

#[tokio::test]
async fn incremental_sync_only_reprocesses_changed_files() {
    let server = MockServer::start();
    let config = base_config(StorageBackend::EmbeddedDb, ":memory:".to_string(), server.base_url());
    let container = ServiceContainer::new(&config).await;

    let collection = container.create_collection("docs", "").await.unwrap();
    mount_sync_mocks(&server, &collection.id.0);

    container.save_file(&collection.id, "", "a.md", &"alpha content ".repeat(20), None).await.unwrap();
    container.save_file(&collection.id, "", "b.md", &"beta content ".repeat(30), None).await.unwrap();

    container.enable_sync(&collection.id).await.unwrap();
    let first = container.sync_now(&collection.id, CancellationToken::new()).await.unwrap();
    assert_eq!(first.files_processed, 2);
    assert!(first.errors.is_empty());

    let status = container.sync_status(&collection.id).await.unwrap();
    assert_eq!(status.state as u8, knowledgebase::sync::SyncState::InSync as u8);
    assert!(status.chunk_count > 0);

    let files = container.list_files(&collection.id).await.unwrap();
    let a = files.iter().find(|f| f.filename == "a.md").unwrap();
    container.update_file(&a.id, "alpha content changed entirely").await.unwrap();

    let second = container.sync_now(&collection.id, CancellationToken::new()).await.unwrap();
    assert_eq!(second.files_processed, 1, "only the modified file should be re-embedded");

    let status_after = container.sync_status(&collection.id).await.unwrap();
    let a_chunks = knowledgebase::chunking::chunk_document(
        "alpha content changed entirely",
        500,
        0.2,
        ChunkStrategy::MarkdownIntelligent,
    )
    .unwrap()
    .len();
    let b_chunks = knowledgebase::chunking::chunk_document(
        &"beta content ".repeat(30),
        500,
        0.2,
        ChunkStrategy::MarkdownIntelligent,
    )
    .unwrap()
    .len();
    assert_eq!(
        status_after.chunk_count,
        (a_chunks + b_chunks) as u64,
        "chunk_count must reflect current file contents, not accumulate stale deltas"
    );
}

#[tokio::test]
async fn markdown_chunking_isolates_fenced_code_block() {
    let text = "# Doc\n\n## Section\n\nIntro text.\n\n```python\n".to_string()
        + &(0..40).map(|i| format!("line_{i} = {i}\n")).collect::<String>()
        + "```\n";

    let drafts = knowledgebase::chunking::chunk_document(
        &text,
        10_000,
        0.0,
        ChunkStrategy::MarkdownIntelligent,
    )
    .unwrap();

    let code_chunks: Vec<_> = drafts
        .iter()
        .filter(|d| d.chunk_type == knowledgebase::chunking::ChunkType::CodeBlock)
        .collect();
    assert_eq!(code_chunks.len(), 1, "the fenced block must not be split across chunks");

    let code = code_chunks[0];
    assert_eq!(code.language.as_deref(), Some("python"));
    assert_eq!(code.header_hierarchy, vec!["Section".to_string()]);
    assert!(code.text.contains("line_0 = 0"));
    assert!(code.text.contains("line_39 = 39"));
}

#[tokio::test]
async fn search_degrades_to_single_query_without_llm() {
    let server = MockServer::start();
    let config = base_config(StorageBackend::EmbeddedDb, ":memory:".to_string(), server.base_url());
    let container = ServiceContainer::new(&config).await;

    let collection = container.create_collection("docs", "").await.unwrap();
    mount_sync_mocks(&server, &collection.id.0);
    container.save_file(&collection.id, "", "a.md", "KI Grundlagen sind wichtig.", None).await.unwrap();
    container.enable_sync(&collection.id).await.unwrap();
    container.sync_now(&collection.id, CancellationToken::new()).await.unwrap();

    server.mock(|when, then| {
        when.method(Method::POST).path(format!("/collections/{}/points/search", collection.id.0));
        then.status(200).json_body(json!({
            "result": [{
                "id": "chunk-1",
                "score": 0.42,
                "payload": {
                    "collection_id": collection.id.0,
                    "file_id": "file-1",
                    "position": 0,
                    "text": "KI Grundlagen sind wichtig.",
                    "length": 27,
                    "contains_code": false,
                    "header_hierarchy": "",
                    "chunk_type": "paragraph",
                    "content_hash": "abc",
                    "created_at": "2026-01-01T00:00:00Z",
                    "model_fingerprint": "m#8"
                }
            }]
        }));
    });

    let request = SearchRequest {
        query: "KI Grundlagen".to_string(),
        collection: collection.id.clone(),
        limit: 5,
        similarity_threshold: 0.0,
        filter: SearchFilter::default(),
        expand_context: false,
    };
    let response = container.vector_search(request, CancellationToken::new()).await.unwrap();

    assert!(!response.expansion_used, "no LLM is configured, so expansion must not have run");
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].chunk.chunk_id.0, "chunk-1");
}

#[tokio::test]
async fn rag_query_degrades_to_retrieval_only_without_an_llm_provider() {
    let server = MockServer::start();
    let config = base_config(StorageBackend::EmbeddedDb, ":memory:".to_string(), server.base_url());
    let container = ServiceContainer::new(&config).await;

    let collection = container.create_collection("docs", "").await.unwrap();
    mount_sync_mocks(&server, &collection.id.0);
    server.mock(|when, then| {
        when.method(Method::POST).path(format!("/collections/{}/points/search", collection.id.0));
        then.status(200).json_body(json!({"result": []}));
    });

    let request = SearchRequest {
        query: "anything".to_string(),
        collection: collection.id.clone(),
        limit: 5,
        similarity_threshold: 0.0,
        filter: SearchFilter::default(),
        expand_context: false,
    };
    let response = container.rag_query(request, CancellationToken::new()).await.unwrap();
    assert!(response.degraded);
    assert!(response.answer.is_none());
}

#[tokio::test]
async fn filesystem_backend_reconciles_externally_added_and_removed_files() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start();
    let config = base_config(
        StorageBackend::Filesystem,
        dir.path().to_str().unwrap().to_string(),
        server.base_url(),
    );
    let container = ServiceContainer::new(&config).await;

    let collection = container.create_collection("docs", "").await.unwrap();
    container.save_file(&collection.id, "", "a.md", "original content", None).await.unwrap();

    let external_path = dir.path().join(&collection.id.0).join("external.md");
    std::fs::write(&external_path, "added from outside the API").unwrap();
    std::fs::remove_file(dir.path().join(&collection.id.0).join("a.md")).unwrap();

    container.reconcile_now(Some(&collection.id)).await.unwrap();

    let files = container.list_files(&collection.id).await.unwrap();
    assert!(files.iter().any(|f| f.filename == "external.md"));
    assert!(!files.iter().any(|f| f.filename == "a.md"));
}

#[tokio::test]
async fn create_collection_twice_conflicts_and_leaves_state_unchanged() {
    let server = MockServer::start();
    let config = base_config(StorageBackend::EmbeddedDb, ":memory:".to_string(), server.base_url());
    let container = ServiceContainer::new(&config).await;

    container.create_collection("docs", "first").await.unwrap();
    let err = container.create_collection("docs", "second").await.unwrap_err();
    assert_eq!(err.kind, knowledgebase::error::ErrorKind::Conflict);

    let collections = container.list_collections().await.unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].description, "first");
}
