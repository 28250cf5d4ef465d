//! Handlers for the search and RAG query tools.

use std::sync::Arc;

use rmcp::{ErrorData as McpError, model::{CallToolResult, JsonObject}};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::ids::CollectionId;
use crate::query::SearchRequest;
use crate::service::KnowledgeBaseApi;
use crate::vectorstore::SearchFilter;

use super::{map_use_case_error, parse_arguments};

#[derive(Debug, Deserialize)]
pub(crate) struct QueryToolRequest {
    pub(crate) query: String,
    pub(crate) collection: String,
    #[serde(default = "default_limit")]
    pub(crate) limit: usize,
    #[serde(default = "default_threshold")]
    pub(crate) similarity_threshold: f32,
    #[serde(default)]
    pub(crate) expand_context: bool,
}

fn default_limit() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.25
}

impl From<QueryToolRequest> for SearchRequest {
    fn from(req: QueryToolRequest) -> Self {
        SearchRequest {
            query: req.query,
            collection: CollectionId(req.collection),
            limit: req.limit,
            similarity_threshold: req.similarity_threshold,
            filter: SearchFilter::default(),
            expand_context: req.expand_context,
        }
    }
}

pub(crate) async fn handle_search_collection_vectors(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: QueryToolRequest = parse_arguments(arguments)?;
    if args.query.trim().is_empty() {
        return Err(McpError::invalid_params("`query` must not be empty", None));
    }
    let response = service
        .vector_search(args.into(), CancellationToken::new())
        .await
        .map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(serde_json::to_value(response).unwrap_or(json!({}))))
}

pub(crate) async fn handle_rag_query(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: QueryToolRequest = parse_arguments(arguments)?;
    if args.query.trim().is_empty() {
        return Err(McpError::invalid_params("`query` must not be empty", None));
    }
    let response = service
        .rag_query(args.into(), CancellationToken::new())
        .await
        .map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(serde_json::to_value(response).unwrap_or(json!({}))))
}
