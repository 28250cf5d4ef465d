//! Handlers for collection lifecycle tools.

use std::sync::Arc;

use rmcp::{ErrorData as McpError, model::{CallToolResult, JsonObject}};
use serde::Deserialize;
use serde_json::json;

use crate::ids::CollectionId;
use crate::service::KnowledgeBaseApi;

use super::{map_use_case_error, parse_arguments};

#[derive(Debug, Deserialize)]
pub(crate) struct CreateCollectionRequest {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CollectionIdRequest {
    pub(crate) collection: String,
}

pub(crate) async fn handle_create_collection(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CreateCollectionRequest = parse_arguments(arguments)?;
    if args.name.trim().is_empty() {
        return Err(McpError::invalid_params("`name` must not be empty", None));
    }
    let collection = service
        .create_collection(&args.name, &args.description)
        .await
        .map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(serde_json::to_value(collection).unwrap_or(json!({}))))
}

pub(crate) async fn handle_list_collections(
    service: &Arc<dyn KnowledgeBaseApi>,
) -> Result<CallToolResult, McpError> {
    let collections = service.list_collections().await.map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(json!({ "collections": collections })))
}

pub(crate) async fn handle_get_collection_info(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CollectionIdRequest = parse_arguments(arguments)?;
    let collection = service
        .get_collection(&CollectionId(args.collection))
        .await
        .map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(serde_json::to_value(collection).unwrap_or(json!({}))))
}

pub(crate) async fn handle_delete_collection(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CollectionIdRequest = parse_arguments(arguments)?;
    service
        .delete_collection(&CollectionId(args.collection))
        .await
        .map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(json!({ "status": "ok" })))
}

pub(crate) async fn handle_reconcile_collection(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CollectionIdRequest = parse_arguments(arguments)?;
    service
        .reconcile_now(Some(&CollectionId(args.collection)))
        .await
        .map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(json!({ "status": "ok" })))
}
