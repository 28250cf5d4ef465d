//! Handlers for crawl-and-extract tools.

use std::sync::Arc;

use rmcp::{ErrorData as McpError, model::{CallToolResult, JsonObject}};
use serde::Deserialize;
use serde_json::json;

use crate::ids::CollectionId;
use crate::service::KnowledgeBaseApi;

use super::{map_use_case_error, parse_arguments};

#[derive(Debug, Deserialize)]
pub(crate) struct ExtractRequest {
    pub(crate) url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeepCrawlRequest {
    pub(crate) url: String,
    #[serde(default = "default_max_depth")]
    pub(crate) max_depth: u32,
    #[serde(default = "default_max_pages")]
    pub(crate) max_pages: usize,
}

fn default_max_depth() -> u32 {
    1
}

fn default_max_pages() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub(crate) struct CrawlSingleRequest {
    pub(crate) collection: String,
    pub(crate) url: String,
    #[serde(default)]
    pub(crate) folder: String,
}

pub(crate) async fn handle_web_content_extract(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: ExtractRequest = parse_arguments(arguments)?;
    let page = service.extract_one(&args.url).await.map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(json!({
        "url": page.url,
        "title": page.title,
        "markdown": page.markdown,
    })))
}

pub(crate) async fn handle_domain_deep_crawl(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: DeepCrawlRequest = parse_arguments(arguments)?;
    let result = service
        .deep_crawl(&args.url, args.max_depth, args.max_pages)
        .await
        .map_err(map_use_case_error)?;
    let pages: Vec<_> = result
        .pages
        .into_iter()
        .map(|p| json!({"url": p.url, "title": p.title, "markdown": p.markdown}))
        .collect();
    Ok(CallToolResult::structured(json!({
        "pages": pages,
        "truncated_link_count": result.truncated_links.len(),
    })))
}

pub(crate) async fn handle_domain_link_preview(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: ExtractRequest = parse_arguments(arguments)?;
    let links = service.preview_links(&args.url).await.map_err(map_use_case_error)?;
    let links: Vec<_> = links.into_iter().map(|l| json!({"url": l.url, "text": l.text})).collect();
    Ok(CallToolResult::structured(json!({ "links": links })))
}

pub(crate) async fn handle_crawl_single_page_to_collection(
    service: &Arc<dyn KnowledgeBaseApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CrawlSingleRequest = parse_arguments(arguments)?;
    let record = service
        .crawl_into_collection(&CollectionId(args.collection), &args.folder, &args.url)
        .await
        .map_err(map_use_case_error)?;
    Ok(CallToolResult::structured(serde_json::to_value(record).unwrap_or(json!({}))))
}
