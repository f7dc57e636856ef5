//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::offline::{OfflineGetParams, clear_impl, get_impl, status_impl};
use crate::tools::{CachePageParams, cache_page_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use stowaway_core::OfflineCache;

/// The main MCP server handler for stowaway.
#[derive(Clone)]
pub struct StowawayServer {
    cache: Arc<OfflineCache>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl StowawayServer {
    /// Create a new server handler over a shared offline cache.
    pub fn new(cache: Arc<OfflineCache>) -> Self {
        Self { cache, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Load a page and every resource it pulls in, then keep them for offline use. Waits until the page counts as loaded."
    )]
    async fn cache_page(&self, params: Parameters<CachePageParams>) -> Result<CallToolResult, McpError> {
        cache_page_impl(&self.cache, params.0).await
    }

    #[tool(description = "Retrieve a cached response by URL. Returns status, headers and the body as text.")]
    async fn offline_get(&self, params: Parameters<OfflineGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.cache, params.0).await
    }

    #[tool(description = "Remove every entry from the offline store.")]
    async fn offline_clear(&self) -> Result<CallToolResult, McpError> {
        clear_impl(&self.cache).await
    }

    #[tool(description = "Report offline store usage and in-flight page loads.")]
    async fn offline_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.cache).await
    }
}

impl ServerHandler for StowawayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "stowaway".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowaway_core::AppConfig;
    use stowaway_core::prefetch::DisabledRenderer;

    #[test]
    fn test_lists_offline_tools() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig { store_dir: dir.path().to_path_buf(), ..Default::default() };
        let cache = OfflineCache::open(&config, Arc::new(DisabledRenderer)).unwrap();
        let server = StowawayServer::new(Arc::new(cache));

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["cache_page", "offline_clear", "offline_get", "offline_status"]);
        assert_eq!(server.get_info().server_info.name, "stowaway");
    }
}
