//! Handlers for file storage tools.

use std::sync::Arc;

use rmcp::{ErrorData as McpError, model::{CallToolResult, JsonObject}};
use serde::Deserialize;
use serde_json::json;

use crate::ids::{CollectionId, FileId};
use crate::service::KnowledgeBaseApi;

use super::{map_use_case_error, parse_arguments};

#[derive(Debug, Deserialize)]
pub(crate) struct SaveFileRequest {
    pub(crate) collection: String,
    #[serde(default)]
    pub(crate) folder: String,
    pub(crate) name: String,
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadFileRequest {
    pub(crate) file_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CollectionIdRequest {
    pub(crate) collection: String,
}

pub(crate) async fn handle_save_to_collection(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: SaveFileRequest = parse_arguments(arguments)?;
    if args.content.trim().is_empty() {
        return Err(McpError::invalid_params("`content` must not be empty", None));
    }
    let record = service
        .save_file(
            &CollectionId(args.collection),
            &args.folder,
            &args.name,
            &args.content,
            args.source_url.as_deref(),
        )
        .await
        .map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(serde_json::to_value(record).unwrap_or(json!({}))))
}

pub(crate) async fn handle_read_from_collection(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: ReadFileRequest = parse_arguments(arguments)?;
    let record = service.read_file(&FileId(args.file_id)).await.map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(serde_json::to_value(record).unwrap_or(json!({}))))
}

pub(crate) async fn handle_list_files_in_collection(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CollectionIdRequest = parse_arguments(arguments)?;
    let files = service.list_files(&CollectionId(args.collection)).await.map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(json!({ "files": files })))
}
