//! offline_status tool implementation.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use stowaway_core::{Error, OfflineCache};

/// Implementation of the offline_status tool.
pub async fn status_impl(cache: &OfflineCache) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(&cache.status())
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize status: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
