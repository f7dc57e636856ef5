//! offline_clear tool implementation.
//!
//! Removes every entry from the offline store.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stowaway_core::{Error, OfflineCache};

/// Output from the offline_clear tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OfflineClearOutput {
    /// Number of entries removed.
    pub removed: usize,
    /// Bytes freed.
    pub freed_bytes: u64,
}

/// Implementation of the offline_clear tool.
pub async fn clear_impl(cache: &OfflineCache) -> Result<CallToolResult, McpError> {
    let before = cache.status();
    cache.clear_offline_cache()?;

    let output = OfflineClearOutput { removed: before.entries, freed_bytes: before.current_size };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
