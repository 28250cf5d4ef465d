//! Tool handlers for the MCP server.

use rmcp::{ErrorData as McpError, model::JsonObject};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ErrorKind, UseCaseError};

pub mod collections;
pub mod crawl;
pub mod files;
pub mod search;
pub mod sync;

/// Parse structured arguments supplied to a tool invocation.
pub(crate) fn parse_arguments<T: DeserializeOwned>(arguments: Option<JsonObject>) -> Result<T, McpError> {
    let value = arguments.map(Value::Object).unwrap_or_else(|| Value::Object(JsonObject::new()));
    serde_json::from_value(value).map_err(|err| McpError::invalid_params(format!("Invalid arguments: {err}"), None))
}

/// Map a use-case error onto the closest standard MCP error, preserving the message.
pub(crate) fn map_use_case_error(err: UseCaseError) -> McpError {
    match err.kind {
        ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict => {
            McpError::invalid_params(err.message, None)
        }
        ErrorKind::Storage
        | ErrorKind::DependencyUnavailable
        | ErrorKind::ChunkMetadata
        | ErrorKind::Cancelled
        | ErrorKind::Internal => McpError::internal_error(err.message, None),
    }
}
