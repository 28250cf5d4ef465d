//! Handlers for vector-sync lifecycle tools.

use std::sync::Arc;

use rmcp::{ErrorData as McpError, model::{CallToolResult, JsonObject}};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::ids::CollectionId;
use crate::service::KnowledgeBaseApi;

use super::{map_use_case_error, parse_arguments};

#[derive(Debug, Deserialize)]
pub(crate) struct CollectionIdRequest {
    pub(crate) collection: String,
}

pub(crate) async fn handle_enable_collection_sync(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CollectionIdRequest = parse_arguments(arguments)?;
    service.enable_sync(&CollectionId(args.collection)).await.map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(json!({ "status": "ok" })))
}

pub(crate) async fn handle_disable_collection_sync(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CollectionIdRequest = parse_arguments(arguments)?;
    service.disable_sync(&CollectionId(args.collection)).await.map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(json!({ "status": "ok" })))
}

pub(crate) async fn handle_sync_collection(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CollectionIdRequest = parse_arguments(arguments)?;
    let report = service
        .sync_now(&CollectionId(args.collection), CancellationToken::new())
        .await
        .map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(serde_json::to_value(report).unwrap_or(json!({}))))
}

pub(crate) async fn handle_get_collection_sync_status(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CollectionIdRequest = parse_arguments(arguments)?;
    let status = service
        .sync_status(&CollectionId(args.collection))
        .await
        .map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(serde_json::to_value(status).unwrap_or(json!({}))))
}

pub(crate) async fn handle_list_collection_sync_statuses(
    service: &Arc<dyn KnowledgeBaseApi>,
) -> Result<CallToolResult, McpError> {
    let statuses = service.list_sync_statuses().await.map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(json!({ "statuses": statuses })))
}

pub(crate) async fn handle_delete_collection_vectors(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CollectionIdRequest = parse_arguments(arguments)?;
    service.delete_vectors(&CollectionId(args.collection)).await.map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(json!({ "status": "ok" })))
}
