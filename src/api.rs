//! HTTP surface for the knowledge-base server.
//!
//! Mirrors the RPC tool surface one-for-one over `axum`: every handler below decodes a request,
//! calls exactly one [`KnowledgeBaseApi`] use-case, and encodes the result. `AppError` maps every
//! `ErrorKind` to its mandated status code (400/404/409/500/503), rather than collapsing
//! everything to 500.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorKind, UseCaseError};
use crate::ids::CollectionId;
use crate::query::SearchRequest as PipelineSearchRequest;
use crate::service::KnowledgeBaseApi;
use crate::vectorstore::SearchFilter;

/// Build the HTTP router exposing every use-case over JSON.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: KnowledgeBaseApi + 'static,
{
    Router::new()
        .route(
            "/api/file-collections",
            get(list_collections::<S>).post(create_collection::<S>),
        )
        .route(
            "/api/file-collections/:id",
            get(get_collection::<S>).delete(delete_collection::<S>),
        )
        .route(
            "/api/file-collections/:id/files",
            get(list_files::<S>).post(save_file::<S>),
        )
        .route(
            "/api/file-collections/:id/files/:file_id",
            get(read_file::<S>).put(update_file::<S>).delete(delete_file::<S>),
        )
        .route("/api/file-collections/:id/reconcile", post(reconcile_collection::<S>))
        .route("/api/crawl/single/:id", post(crawl_single::<S>))
        .route("/api/extract", post(extract::<S>))
        .route("/api/deep-crawl", post(deep_crawl::<S>))
        .route("/api/link-preview", post(link_preview::<S>))
        .route(
            "/api/vector-sync/collections/:id/sync",
            post(sync_collection::<S>),
        )
        .route(
            "/api/vector-sync/collections/:id/enable",
            post(enable_sync::<S>),
        )
        .route(
            "/api/vector-sync/collections/:id/disable",
            post(disable_sync::<S>),
        )
        .route(
            "/api/vector-sync/collections/:id/status",
            get(sync_status::<S>),
        )
        .route(
            "/api/vector-sync/collections/:id/vectors",
            delete(delete_vectors::<S>),
        )
        .route("/api/vector-sync/statuses", get(list_sync_statuses::<S>))
        .route("/api/vector-sync/search", post(vector_search::<S>))
        .route("/api/query", post(rag_query::<S>))
        .route("/api/metrics", get(get_metrics::<S>))
        .route("/api/commands", get(get_commands))
        .with_state(service)
}

#[derive(Deserialize)]
struct CreateCollectionRequest {
    name: String,
    #[serde(default)]
    description: String,
}

async fn create_collection<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Json(request): Json<CreateCollectionRequest>,
) -> Result<Json<crate::store::Collection>, AppError> {
    let collection = service.create_collection(&request.name, &request.description).await?;
    Ok(Json(collection))
}

async fn list_collections<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
) -> Result<Json<Vec<crate::store::Collection>>, AppError> {
    Ok(Json(service.list_collections().await?))
}

async fn get_collection<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Json<crate::store::Collection>, AppError> {
    Ok(Json(service.get_collection(&CollectionId(id)).await?))
}

async fn delete_collection<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    service.delete_collection(&CollectionId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SaveFileRequest {
    folder: String,
    name: String,
    content: String,
    #[serde(default)]
    source_url: Option<String>,
}

async fn save_file<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
    Json(request): Json<SaveFileRequest>,
) -> Result<Json<crate::store::FileRecord>, AppError> {
    let record = service
        .save_file(
            &CollectionId(id),
            &request.folder,
            &request.name,
            &request.content,
            request.source_url.as_deref(),
        )
        .await?;
    Ok(Json(record))
}

async fn list_files<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<crate::store::FileRecord>>, AppError> {
    Ok(Json(service.list_files(&CollectionId(id)).await?))
}

async fn read_file<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path((_id, file_id)): Path<(String, String)>,
) -> Result<Json<crate::store::FileRecord>, AppError> {
    Ok(Json(service.read_file(&crate::ids::FileId(file_id)).await?))
}

#[derive(Deserialize)]
struct UpdateFileRequest {
    content: String,
}

async fn update_file<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path((_id, file_id)): Path<(String, String)>,
    Json(request): Json<UpdateFileRequest>,
) -> Result<Json<crate::store::FileRecord>, AppError> {
    let record = service
        .update_file(&crate::ids::FileId(file_id), &request.content)
        .await?;
    Ok(Json(record))
}

async fn delete_file<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path((id, file_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    service
        .delete_file(&CollectionId(id), &crate::ids::FileId(file_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct CrawlSingleRequest {
    url: String,
    #[serde(default)]
    folder: String,
}

async fn reconcile_collection<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    service.reconcile_now(Some(&CollectionId(id))).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn crawl_single<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
    Json(request): Json<CrawlSingleRequest>,
) -> Result<Json<crate::store::FileRecord>, AppError> {
    let record = service
        .crawl_into_collection(&CollectionId(id), &request.folder, &request.url)
        .await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct ExtractRequest {
    url: String,
}

#[derive(Serialize)]
struct ExtractResponse {
    url: String,
    title: Option<String>,
    markdown: String,
}

async fn extract<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, AppError> {
    let page = service.extract_one(&request.url).await?;
    Ok(Json(ExtractResponse { url: page.url, title: page.title, markdown: page.markdown }))
}

#[derive(Deserialize)]
struct DeepCrawlRequest {
    url: String,
    #[serde(default = "default_max_depth")]
    max_depth: u32,
    #[serde(default = "default_max_pages")]
    max_pages: usize,
}

fn default_max_depth() -> u32 {
    1
}

fn default_max_pages() -> usize {
    10
}

#[derive(Serialize)]
struct DeepCrawlResponse {
    pages: Vec<ExtractResponse>,
    truncated_link_count: usize,
}

async fn deep_crawl<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Json(request): Json<DeepCrawlRequest>,
) -> Result<Json<DeepCrawlResponse>, AppError> {
    let result = service.deep_crawl(&request.url, request.max_depth, request.max_pages).await?;
    Ok(Json(DeepCrawlResponse {
        pages: result
            .pages
            .into_iter()
            .map(|p| ExtractResponse { url: p.url, title: p.title, markdown: p.markdown })
            .collect(),
        truncated_link_count: result.truncated_links.len(),
    }))
}

#[derive(Deserialize)]
struct LinkPreviewRequest {
    url: String,
}

#[derive(Serialize)]
struct LinkPreviewEntry {
    url: String,
    text: Option<String>,
}

async fn link_preview<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Json(request): Json<LinkPreviewRequest>,
) -> Result<Json<Vec<LinkPreviewEntry>>, AppError> {
    let links = service.preview_links(&request.url).await?;
    Ok(Json(links.into_iter().map(|l| LinkPreviewEntry { url: l.url, text: l.text }).collect()))
}

async fn sync_collection<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Json<crate::sync::SyncReport>, AppError> {
    let report = service.sync_now(&CollectionId(id), CancellationToken::new()).await?;
    Ok(Json(report))
}

async fn enable_sync<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    service.enable_sync(&CollectionId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn disable_sync<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    service.disable_sync(&CollectionId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sync_status<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Json<crate::sync::SyncStatus>, AppError> {
    Ok(Json(service.sync_status(&CollectionId(id)).await?))
}

async fn list_sync_statuses<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
) -> Result<Json<Vec<crate::sync::SyncStatus>>, AppError> {
    Ok(Json(service.list_sync_statuses().await?))
}

async fn delete_vectors<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    service.delete_vectors(&CollectionId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SearchRequestBody {
    query: String,
    collection: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default = "default_threshold")]
    similarity_threshold: f32,
    #[serde(default)]
    expand_context: bool,
}

fn default_limit() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.25
}

impl From<SearchRequestBody> for PipelineSearchRequest {
    fn from(body: SearchRequestBody) -> Self {
        PipelineSearchRequest {
            query: body.query,
            collection: CollectionId(body.collection),
            limit: body.limit,
            similarity_threshold: body.similarity_threshold,
            filter: SearchFilter::default(),
            expand_context: body.expand_context,
        }
    }
}

async fn vector_search<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Json(request): Json<SearchRequestBody>,
) -> Result<Json<crate::query::SearchResponse>, AppError> {
    let response = service.vector_search(request.into(), CancellationToken::new()).await?;
    Ok(Json(response))
}

async fn rag_query<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
    Json(request): Json<SearchRequestBody>,
) -> Result<Json<crate::query::RagResponse>, AppError> {
    let response = service.rag_query(request.into(), CancellationToken::new()).await?;
    Ok(Json(response))
}

async fn get_metrics<S: KnowledgeBaseApi>(
    State(service): State<Arc<S>>,
) -> Json<crate::metrics::MetricsSnapshot> {
    Json(service.metrics_snapshot())
}

#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "create_collection",
                method: "POST",
                path: "/api/file-collections",
                description: "Create a new, empty file collection.",
                request_example: Some(json!({"name": "docs", "description": "my notes"})),
            },
            CommandDescriptor {
                name: "list_collections",
                method: "GET",
                path: "/api/file-collections",
                description: "List every collection.",
                request_example: None,
            },
            CommandDescriptor {
                name: "save_file",
                method: "POST",
                path: "/api/file-collections/{id}/files",
                description: "Save (create or overwrite) a file in a collection.",
                request_example: Some(json!({"folder": "", "name": "a.md", "content": "# H\n\nhello"})),
            },
            CommandDescriptor {
                name: "reconcile_collection",
                method: "POST",
                path: "/api/file-collections/{id}/reconcile",
                description: "Force an immediate filesystem-mode reconciliation pass for a collection.",
                request_example: None,
            },
            CommandDescriptor {
                name: "sync_collection",
                method: "POST",
                path: "/api/vector-sync/collections/{id}/sync",
                description: "Run an incremental sync for a collection.",
                request_example: None,
            },
            CommandDescriptor {
                name: "vector_search",
                method: "POST",
                path: "/api/vector-sync/search",
                description: "Run the multi-query search pipeline against a collection.",
                request_example: Some(json!({"query": "ownership rules", "collection": "docs", "limit": 5})),
            },
            CommandDescriptor {
                name: "rag_query",
                method: "POST",
                path: "/api/query",
                description: "Run retrieval-augmented generation against a collection.",
                request_example: Some(json!({"query": "how does sync work?", "collection": "docs"})),
            },
        ],
    })
}

struct AppError(UseCaseError);

impl From<UseCaseError> for AppError {
    fn from(inner: UseCaseError) -> Self {
        Self(inner)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::DependencyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::Storage | ErrorKind::ChunkMetadata | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(json!({
            "detail": {
                "error": {
                    "code": self.0.code,
                    "message": self.0.message,
                }
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsSnapshot;
    use crate::query::{RagResponse, SearchResponse};
    use crate::store::{Collection, FileRecord};
    use crate::sync::{SyncReport, SyncState, SyncStatus};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode as HttpStatusCode};
    use tower::ServiceExt;

    struct StubService;

    #[async_trait]
    impl KnowledgeBaseApi for StubService {
        async fn create_collection(&self, name: &str, description: &str) -> Result<Collection, UseCaseError> {
            Ok(Collection {
                id: CollectionId(name.to_string()),
                name: name.to_string(),
                description: description.to_string(),
                created_at: "2026-01-01T00:00:00Z".into(),
                updated_at: "2026-01-01T00:00:00Z".into(),
                file_count: 0,
                total_size: 0,
                metadata: serde_json::json!({}),
            })
        }
        async fn list_collections(&self) -> Result<Vec<Collection>, UseCaseError> {
            Ok(Vec::new())
        }
        async fn get_collection(&self, id: &CollectionId) -> Result<Collection, UseCaseError> {
            if id.0 == "missing" {
                return Err(UseCaseError::not_found("collection not found"));
            }
            self.create_collection(&id.0, "").await
        }
        async fn delete_collection(&self, _id: &CollectionId) -> Result<(), UseCaseError> {
            Ok(())
        }
        async fn save_file(
            &self,
            collection: &CollectionId,
            folder: &str,
            name: &str,
            content: &str,
            source_url: Option<&str>,
        ) -> Result<FileRecord, UseCaseError> {
            Ok(FileRecord {
                id: crate::ids::FileId("file-1".into()),
                collection_id: collection.clone(),
                filename: name.to_string(),
                folder_path: folder.to_string(),
                content: content.to_string(),
                content_hash: crate::ids::content_hash(content.as_bytes()),
                source_url: source_url.map(str::to_string),
                created_at: "2026-01-01T00:00:00Z".into(),
                updated_at: "2026-01-01T00:00:00Z".into(),
                byte_size: content.len() as u64,
            })
        }
        async fn read_file(&self, file_id: &crate::ids::FileId) -> Result<FileRecord, UseCaseError> {
            self.save_file(&CollectionId("docs".into()), "", &file_id.0, "content", None).await
        }
        async fn update_file(&self, file_id: &crate::ids::FileId, content: &str) -> Result<FileRecord, UseCaseError> {
            self.save_file(&CollectionId("docs".into()), "", &file_id.0, content, None).await
        }
        async fn delete_file(&self, _collection: &CollectionId, _file_id: &crate::ids::FileId) -> Result<(), UseCaseError> {
            Ok(())
        }
        async fn list_files(&self, _collection: &CollectionId) -> Result<Vec<FileRecord>, UseCaseError> {
            Ok(Vec::new())
        }
        async fn reconcile_now(&self, _collection: Option<&CollectionId>) -> Result<(), UseCaseError> {
            Ok(())
        }
        async fn extract_one(&self, url: &str) -> Result<crate::crawl::ExtractedPage, UseCaseError> {
            Ok(crate::crawl::ExtractedPage { url: url.to_string(), title: None, markdown: String::new() })
        }
        async fn deep_crawl(&self, url: &str, _max_depth: u32, _max_pages: usize) -> Result<crate::crawl::DeepCrawlResult, UseCaseError> {
            let page = self.extract_one(url).await?;
            Ok(crate::crawl::DeepCrawlResult { pages: vec![page], truncated_links: Vec::new() })
        }
        async fn preview_links(&self, _url: &str) -> Result<Vec<crate::crawl::LinkPreview>, UseCaseError> {
            Ok(Vec::new())
        }
        async fn crawl_into_collection(
            &self,
            collection: &CollectionId,
            folder: &str,
            url: &str,
        ) -> Result<FileRecord, UseCaseError> {
            self.save_file(collection, folder, "page.md", "content", Some(url)).await
        }
        async fn enable_sync(&self, _collection: &CollectionId) -> Result<(), UseCaseError> {
            Ok(())
        }
        async fn disable_sync(&self, _collection: &CollectionId) -> Result<(), UseCaseError> {
            Ok(())
        }
        async fn sync_now(
            &self,
            _collection: &CollectionId,
            _cancellation: CancellationToken,
        ) -> Result<SyncReport, UseCaseError> {
            Ok(SyncReport { files_processed: 0, files_total: 0, errors: Vec::new(), cancelled: false })
        }
        async fn sync_status(&self, collection: &CollectionId) -> Result<SyncStatus, UseCaseError> {
            Ok(SyncStatus {
                collection_id: collection.clone(),
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
            })
        }
        async fn list_sync_statuses(&self) -> Result<Vec<SyncStatus>, UseCaseError> {
            Ok(Vec::new())
        }
        async fn delete_vectors(&self, _collection: &CollectionId) -> Result<(), UseCaseError> {
            Ok(())
        }
        async fn vector_search(
            &self,
            _request: PipelineSearchRequest,
            _cancellation: CancellationToken,
        ) -> Result<SearchResponse, UseCaseError> {
            Ok(SearchResponse { results: Vec::new(), expansion_used: false, reranking_used: false })
        }
        async fn rag_query(
            &self,
            _request: PipelineSearchRequest,
            _cancellation: CancellationToken,
        ) -> Result<RagResponse, UseCaseError> {
            Ok(RagResponse { answer: None, sources: Vec::new(), degraded: true })
        }
        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                files_indexed: 0,
                chunks_indexed: 0,
                last_chunk_size: None,
                sync_runs: 0,
                sync_files_processed: 0,
                sync_errors: 0,
                queries_executed: 0,
                rag_queries_executed: 0,
            }
        }
    }

    #[tokio::test]
    async fn create_collection_returns_json_body() {
        let app = create_router(Arc::new(StubService));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/file-collections")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"name": "docs"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), HttpStatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["name"], "docs");
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let app = create_router(Arc::new(StubService));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/api/file-collections/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), HttpStatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn commands_catalog_lists_core_operations() {
        let response = get_commands().await;
        assert!(response.0.commands.iter().any(|c| c.name == "vector_search"));
    }
}
