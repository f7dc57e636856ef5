//! offline_get tool implementation.
//!
//! Looks a URL up the way a page load would: captured, standard, then offline.

use std::collections::BTreeMap;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stowaway_core::{CacheRequest, Error, OfflineCache};

/// Parameters for the offline_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OfflineGetParams {
    /// URL of the cached resource.
    pub url: String,
}

/// Output from the offline_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OfflineGetOutput {
    pub url: String,
    pub status: u16,
    pub mime_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// RFC 3339 time the response was recorded.
    pub stored_at: String,
    /// Body length in bytes.
    pub bytes: usize,
    /// Body decoded as UTF-8, invalid sequences replaced.
    pub body: String,
}

/// Implementation of the offline_get tool.
pub async fn get_impl(cache: &OfflineCache, params: OfflineGetParams) -> Result<CallToolResult, McpError> {
    let request = CacheRequest::parse(&params.url)?.for_offline();
    let response = cache
        .retrieve_response(&request)
        .ok_or_else(|| Error::CacheMiss(request.to_string()))?;

    let output = OfflineGetOutput {
        url: response.meta.url.clone(),
        status: response.meta.status,
        mime_type: response.meta.mime_type.clone(),
        headers: response.meta.headers.clone(),
        stored_at: response.meta.stored_at.to_rfc3339(),
        bytes: response.body.len(),
        body: String::from_utf8_lossy(&response.body).into_owned(),
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize response: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stowaway_core::prefetch::DisabledRenderer;
    use stowaway_core::{AppConfig, CachedResponse};

    fn cache(dir: &std::path::Path) -> OfflineCache {
        let config = AppConfig { store_dir: dir.to_path_buf(), ..Default::default() };
        OfflineCache::open(&config, Arc::new(DisabledRenderer)).unwrap()
    }

    #[tokio::test]
    async fn test_get_impl_missing() {
        let dir = tempfile::tempdir().unwrap();
        let params = OfflineGetParams { url: "https://example.com/nothing".into() };

        let err = get_impl(&cache(dir.path()), params).await.unwrap_err();
        assert_eq!(err.code.0, -32001);
    }

    #[tokio::test]
    async fn test_get_impl_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let request = CacheRequest::parse("https://example.com/").unwrap().for_offline();
        let response = CachedResponse::new(request.url(), 200, "<html>offline</html>").with_mime_type("text/html");
        cache.store_response(&request, &response).unwrap();

        let result = get_impl(&cache, OfflineGetParams { url: "example.com".into() }).await.unwrap();

        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        let output: OfflineGetOutput = serde_json::from_str(text).unwrap();
        assert_eq!(output.url, "https://example.com/");
        assert_eq!(output.status, 200);
        assert_eq!(output.mime_type.as_deref(), Some("text/html"));
        assert_eq!(output.body, "<html>offline</html>");
        assert_eq!(output.bytes, 20);
    }
}
