//! MCP server bootstrap and request dispatch.

use std::{borrow::Cow, sync::Arc};

use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::{
        AnnotateAble, CallToolRequestParam, CallToolResult, ListResourceTemplatesResult, ListResourcesResult,
        ListToolsResult, RawResource, ReadResourceRequestParam, ReadResourceResult, Resource, ServerCapabilities,
        ServerInfo, Tool, ToolAnnotations,
    },
};

use crate::config::get_config;
use crate::mcp::{
    format::{json_resource_contents, serialize_json},
    handlers::{collections, crawl, files, search, sync},
    registry, schemas,
};
use crate::service::KnowledgeBaseApi;

const COLLECTIONS_URI: &str = "mcp://collections";
const SETTINGS_URI: &str = "mcp://settings";

/// MCP server implementation exposing knowledge-base operations over stdio.
#[derive(Clone)]
pub struct KnowledgeBaseMcpServer {
    service: Arc<dyn KnowledgeBaseApi>,
    registry: Arc<registry::Registry>,
}

impl KnowledgeBaseMcpServer {
    /// Create a new MCP server using the supplied service container.
    pub fn new(service: Arc<dyn KnowledgeBaseApi>) -> Self {
        let mut registry = registry::Registry::new();
        registry.register_resource(COLLECTIONS_URI, resource_collections);
        registry.register_resource(SETTINGS_URI, resource_settings);

        registry.register_tool("web_content_extract", tool_web_content_extract);
        registry.register_tool("domain_deep_crawl", tool_domain_deep_crawl);
        registry.register_tool("domain_link_preview", tool_domain_link_preview);
        registry.register_tool("crawl_single_page_to_collection", tool_crawl_single_page_to_collection);
        registry.register_tool("create_collection", tool_create_collection);
        registry.register_tool("list_file_collections", tool_list_file_collections);
        registry.register_tool("get_collection_info", tool_get_collection_info);
        registry.register_tool("delete_file_collection", tool_delete_file_collection);
        registry.register_tool("reconcile_collection", tool_reconcile_collection);
        registry.register_tool("save_to_collection", tool_save_to_collection);
        registry.register_tool("read_from_collection", tool_read_from_collection);
        registry.register_tool("list_files_in_collection", tool_list_files_in_collection);
        registry.register_tool("enable_collection_sync", tool_enable_collection_sync);
        registry.register_tool("disable_collection_sync", tool_disable_collection_sync);
        registry.register_tool("sync_collection", tool_sync_collection);
        registry.register_tool("get_collection_sync_status", tool_get_collection_sync_status);
        registry.register_tool("list_collection_sync_statuses", tool_list_collection_sync_statuses);
        registry.register_tool("delete_collection_vectors", tool_delete_collection_vectors);
        registry.register_tool("search_collection_vectors", tool_search_collection_vectors);
        registry.register_tool("rag_query", tool_rag_query);

        Self { service, registry: Arc::new(registry) }
    }

    fn describe_tools(&self) -> Vec<Tool> {
        let tool = |name: &'static str, title: &str, description: &'static str, schema, destructive: bool, idempotent: bool| Tool {
            name: Cow::Borrowed(name),
            title: Some(title.to_string()),
            description: Some(Cow::Borrowed(description)),
            input_schema: Arc::new(schema),
            output_schema: None,
            annotations: Some(
                ToolAnnotations::with_title(title).destructive(destructive).idempotent(idempotent).open_world(false),
            ),
            icons: None,
        };

        vec![
            tool(
                "web_content_extract",
                "Extract Web Content",
                "Fetch a single URL and return its extracted markdown without persisting anything.",
                schemas::extract_input_schema(),
                false,
                true,
            ),
            tool(
                "domain_deep_crawl",
                "Deep Crawl Domain",
                "Crawl outward from a URL, bounded by depth and page count, without persisting anything.",
                schemas::deep_crawl_input_schema(),
                false,
                true,
            ),
            tool(
                "domain_link_preview",
                "Preview Domain Links",
                "List the links discoverable from a URL without following them.",
                schemas::extract_input_schema(),
                false,
                true,
            ),
            tool(
                "crawl_single_page_to_collection",
                "Crawl Page Into Collection",
                "Fetch a URL and save its extracted content as a file in a collection.",
                schemas::crawl_single_input_schema(),
                true,
                false,
            ),
            tool(
                "create_collection",
                "Create Collection",
                "Create a new, empty file collection.",
                schemas::create_collection_input_schema(),
                false,
                true,
            ),
            tool(
                "list_file_collections",
                "List Collections",
                "List every file collection.",
                schemas::empty_object_schema(),
                false,
                true,
            ),
            tool(
                "get_collection_info",
                "Get Collection Info",
                "Fetch one collection's metadata by id.",
                schemas::collection_id_input_schema(),
                false,
                true,
            ),
            tool(
                "delete_file_collection",
                "Delete Collection",
                "Delete a collection, its files, and its vector records.",
                schemas::collection_id_input_schema(),
                true,
                false,
            ),
            tool(
                "reconcile_collection",
                "Reconcile Collection",
                "Force an immediate filesystem-mode reconciliation pass for a collection, ahead of the poll interval.",
                schemas::collection_id_input_schema(),
                false,
                false,
            ),
            tool(
                "save_to_collection",
                "Save File",
                "Save (create or overwrite) a file in a collection.",
                schemas::save_file_input_schema(),
                true,
                false,
            ),
            tool(
                "read_from_collection",
                "Read File",
                "Read a file's content by id.",
                schemas::read_file_input_schema(),
                false,
                true,
            ),
            tool(
                "list_files_in_collection",
                "List Files",
                "List every file in a collection.",
                schemas::collection_id_input_schema(),
                false,
                true,
            ),
            tool(
                "enable_collection_sync",
                "Enable Collection Sync",
                "Enable user-triggered vector sync for a collection.",
                schemas::collection_id_input_schema(),
                false,
                true,
            ),
            tool(
                "disable_collection_sync",
                "Disable Collection Sync",
                "Disable vector sync for a collection.",
                schemas::collection_id_input_schema(),
                false,
                true,
            ),
            tool(
                "sync_collection",
                "Sync Collection",
                "Run an incremental vector sync for a collection.",
                schemas::collection_id_input_schema(),
                false,
                false,
            ),
            tool(
                "get_collection_sync_status",
                "Get Sync Status",
                "Fetch a collection's current vector-sync status.",
                schemas::collection_id_input_schema(),
                false,
                true,
            ),
            tool(
                "list_collection_sync_statuses",
                "List Sync Statuses",
                "List vector-sync status for every collection that has one.",
                schemas::empty_object_schema(),
                false,
                true,
            ),
            tool(
                "delete_collection_vectors",
                "Delete Collection Vectors",
                "Delete all vector records for a collection without touching its files.",
                schemas::collection_id_input_schema(),
                true,
                false,
            ),
            tool(
                "search_collection_vectors",
                "Search Collection",
                "Run the multi-query search pipeline against a collection.",
                schemas::search_input_schema(),
                false,
                true,
            ),
            tool(
                "rag_query",
                "RAG Query",
                "Run retrieval-augmented generation against a collection, degrading to retrieval-only without an LLM.",
                schemas::search_input_schema(),
                false,
                true,
            ),
        ]
    }

    fn describe_resources(&self) -> Vec<Resource> {
        let mut collections = RawResource::new(COLLECTIONS_URI, "collections");
        collections.description = Some("Every file collection currently known to the server".into());

        let mut settings = RawResource::new(SETTINGS_URI, "settings");
        settings.description = Some("Effective defaults for search ergonomics".into());

        vec![collections.no_annotation(), settings.no_annotation()]
    }
}

fn resource_collections(server: &KnowledgeBaseMcpServer, _request: ReadResourceRequestParam) -> registry::ResourceFuture {
    let service = server.service.clone();
    Box::pin(async move {
        let collections = service.list_collections().await.map_err(|err| McpError::internal_error(err.message, None))?;
        Ok(ReadResourceResult {
            contents: vec![json_resource_contents(COLLECTIONS_URI, serialize_json(&collections, COLLECTIONS_URI))],
        })
    })
}

fn resource_settings(_server: &KnowledgeBaseMcpServer, _request: ReadResourceRequestParam) -> registry::ResourceFuture {
    Box::pin(async move {
        let config = get_config();
        let payload = serde_json::json!({
            "search_default_limit": config.search_default_limit,
            "search_max_limit": config.search_max_limit,
            "search_default_score_threshold": config.search_default_score_threshold,
        });
        Ok(ReadResourceResult { contents: vec![json_resource_contents(SETTINGS_URI, serialize_json(&payload, SETTINGS_URI))] })
    })
}

macro_rules! tool_fn {
    ($name:ident, $handler:path) => {
        fn $name(server: &KnowledgeBaseMcpServer, request: CallToolRequestParam) -> registry::ToolFuture {
            let service = server.service.clone();
            Box::pin(async move { $handler(&service, request.arguments).await })
        }
    };
}

macro_rules! tool_fn_noargs {
    ($name:ident, $handler:path) => {
        fn $name(server: &KnowledgeBaseMcpServer, _request: CallToolRequestParam) -> registry::ToolFuture {
            let service = server.service.clone();
            Box::pin(async move { $handler(&service).await })
        }
    };
}

tool_fn!(tool_web_content_extract, crawl::handle_web_content_extract);
tool_fn!(tool_domain_deep_crawl, crawl::handle_domain_deep_crawl);
tool_fn!(tool_domain_link_preview, crawl::handle_domain_link_preview);
tool_fn!(tool_crawl_single_page_to_collection, crawl::handle_crawl_single_page_to_collection);
tool_fn!(tool_create_collection, collections::handle_create_collection);
tool_fn_noargs!(tool_list_file_collections, collections::handle_list_collections);
tool_fn!(tool_get_collection_info, collections::handle_get_collection_info);
tool_fn!(tool_delete_file_collection, collections::handle_delete_collection);
tool_fn!(tool_reconcile_collection, collections::handle_reconcile_collection);
tool_fn!(tool_save_to_collection, files::handle_save_to_collection);
tool_fn!(tool_read_from_collection, files::handle_read_from_collection);
tool_fn!(tool_list_files_in_collection, files::handle_list_files_in_collection);
tool_fn!(tool_enable_collection_sync, sync::handle_enable_collection_sync);
tool_fn!(tool_disable_collection_sync, sync::handle_disable_collection_sync);
tool_fn!(tool_sync_collection, sync::handle_sync_collection);
tool_fn!(tool_get_collection_sync_status, sync::handle_get_collection_sync_status);
tool_fn_noargs!(tool_list_collection_sync_statuses, sync::handle_list_collection_sync_statuses);
tool_fn!(tool_delete_collection_vectors, sync::handle_delete_collection_vectors);
tool_fn!(tool_search_collection_vectors, search::handle_search_collection_vectors);
tool_fn!(tool_rag_query, search::handle_rag_query);

impl ServerHandler for KnowledgeBaseMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut implementation = rmcp::model::Implementation::from_build_env();
        implementation.name = "knowledgebase".to_string();
        implementation.title = Some("Knowledge Base MCP".to_string());
        implementation.version = env!("CARGO_PKG_VERSION").to_string();

        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_resources().enable_tools().build(),
            server_info: implementation,
            instructions: Some(
                "Use this server to manage file collections, crawl web content into them, keep a vector index in \
                 sync, and run semantic search or retrieval-augmented queries over their contents."
                    .into(),
            ),
            ..ServerInfo::default()
        }
    }

    fn list_resources(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        let resources = self.describe_resources();
        std::future::ready(Ok(ListResourcesResult::with_all_items(resources)))
    }

    fn list_resource_templates(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourceTemplatesResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListResourceTemplatesResult::with_all_items(Vec::new())))
    }

    fn list_tools(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools = self.describe_tools();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            let uri = request.uri.clone();
            if let Some(handler) = self.registry.resources.get(uri.as_str()) {
                return handler(self, request).await;
            }
            Err(McpError::invalid_params(format!("Unknown resource URI: {uri}"), None))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            if let Some(handler) = self.registry.tools.get(request.name.as_ref()) {
                return handler(self, request).await;
            }
            Err(McpError::invalid_params(format!("Unknown tool: {}", request.name), None))
        }
    }
}
