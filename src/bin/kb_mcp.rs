//! MCP server entrypoint (stdio transport).
//!
//! Launches an MCP server that exposes every collection, crawl, sync, and query tool over stdio,
//! for editor and agent-host integrations. Shares all runtime configuration with the HTTP binary.

use anyhow::{Context, Result};
use rmcp::{service::ServiceExt, transport::stdio};
use knowledgebase::{config, logging, mcp::KnowledgeBaseMcpServer, service::ServiceContainer};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    config::init_config();
    logging::init_tracing();

    let config = config::get_config();
    let service = Arc::new(ServiceContainer::new(config).await);
    let server = KnowledgeBaseMcpServer::new(service);

    let running = server.serve(stdio()).await.context("failed to start MCP server over stdio")?;

    running.waiting().await.context("MCP server terminated unexpectedly")?;

    Ok(())
}
