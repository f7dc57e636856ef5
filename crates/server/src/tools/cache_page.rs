//! cache_page tool implementation.
//!
//! Loads a page with everything it pulls in and keeps it for offline use.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stowaway_core::prefetch::LoadedPredicate;
use stowaway_core::{Error, OfflineCache, ReadyStateProbe, ScriptProbe};

/// Parameters for the cache_page tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePageParams {
    /// The page to cache.
    pub url: String,

    /// Expression polled until the page counts as loaded.
    /// Defaults to waiting for `document.readyState == "complete"`.
    /// Arbitrary scripts need the headless renderer; without it the load
    /// fails instead of waiting.
    #[serde(default)]
    pub ready_script: Option<String>,

    /// Value `ready_script` must evaluate to (default: true).
    #[serde(default)]
    pub expected: Option<serde_json::Value>,
}

impl CachePageParams {
    fn probe(&self) -> Box<dyn LoadedPredicate> {
        match &self.ready_script {
            Some(script) => Box::new(ScriptProbe::new(
                script.clone(),
                self.expected.clone().unwrap_or(serde_json::Value::Bool(true)),
            )),
            None => Box::new(ReadyStateProbe),
        }
    }
}

/// Implementation of the cache_page tool.
pub async fn cache_page_impl(cache: &OfflineCache, params: CachePageParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }
    if params.ready_script.as_deref().is_some_and(|s| s.trim().is_empty()) {
        return Err(Error::InvalidInput("ready_script cannot be empty".into()).into());
    }

    let task = cache.cache_url(&params.url, params.probe())?;
    tracing::info!(url = %task.url(), coordinator = %task.id(), "cache_page started");
    let unit = task.wait().await?;

    let json = serde_json::to_string_pretty(&unit)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize result: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use stowaway_client::{FetchClient, FetchConfig, FetchRendererFactory};
    use stowaway_core::AppConfig;
    use stowaway_core::prefetch::DisabledRenderer;

    fn cache(dir: &std::path::Path) -> OfflineCache {
        let config = AppConfig { store_dir: dir.to_path_buf(), ..Default::default() };
        OfflineCache::open(&config, Arc::new(DisabledRenderer)).unwrap()
    }

    #[tokio::test]
    async fn test_cache_page_empty_url() {
        let dir = tempfile::tempdir().unwrap();
        let params = CachePageParams { url: "  ".into(), ready_script: None, expected: None };

        let err = cache_page_impl(&cache(dir.path()), params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }

    #[tokio::test]
    async fn test_cache_page_bad_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let params = CachePageParams { url: "ftp://example.com".into(), ready_script: None, expected: None };

        let err = cache_page_impl(&cache(dir.path()), params).await.unwrap_err();
        assert_eq!(err.code.0, -32003);
    }

    #[tokio::test]
    async fn test_cache_page_reports_render_failure() {
        let dir = tempfile::tempdir().unwrap();
        let params = CachePageParams {
            url: "https://example.com".into(),
            ready_script: Some("window.appReady".into()),
            expected: None,
        };

        let err = cache_page_impl(&cache(dir.path()), params).await.unwrap_err();
        assert_eq!(err.code.0, -32012);
    }

    #[tokio::test]
    async fn test_cache_page_script_the_renderer_cannot_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig { store_dir: dir.path().to_path_buf(), poll_interval_ms: 10, ..Default::default() };
        let client = FetchClient::new(FetchConfig::from(&config)).unwrap();
        let cache = OfflineCache::open(&config, Arc::new(FetchRendererFactory::new(client))).unwrap();
        let params = CachePageParams {
            url: "http://127.0.0.1:9/".into(),
            ready_script: Some("window.appReady".into()),
            expected: None,
        };

        let err = tokio::time::timeout(Duration::from_secs(5), cache_page_impl(&cache, params))
            .await
            .expect("cache_page should give up on a script it cannot evaluate")
            .unwrap_err();

        assert_eq!(err.code.0, -32012);
        assert_eq!(cache.status().active_coordinators, 0);
    }
}
