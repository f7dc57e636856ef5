//! HTTP fetch pipeline producing cacheable responses.
//!
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//! - gzip, brotli and deflate bodies are decoded before they are cached

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::{Client, header};
use thiserror::Error;
use url::Url;

use stowaway_core::AppConfig;
use stowaway_core::cache::CachedResponse;

/// Errors from a single fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(String),

    /// Connection, TLS or protocol failure.
    #[error("network error: {0}")]
    Network(String),

    /// The body is larger than the configured limit.
    #[error("{size} bytes exceeds {max}")]
    TooLarge { size: u64, max: usize },
}

impl From<FetchError> for stowaway_core::Error {
    fn from(err: FetchError) -> Self {
        stowaway_core::Error::RenderFailed(err.to_string())
    }
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "stowaway/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "stowaway/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// HTTP client that turns responses into [`CachedResponse`]s.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| FetchError::Build(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// Fetch `url`, whatever its status.
    ///
    /// The response is recorded under the requested URL even when redirects
    /// were followed, so it can be found again by the request that caused it.
    pub async fn fetch(&self, url: &Url) -> Result<CachedResponse, FetchError> {
        let start = Instant::now();

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(FetchError::TooLarge { size: len, max: self.config.max_bytes });
        }

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let body: Bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read response: {e}")))?;

        if body.len() > self.config.max_bytes {
            return Err(FetchError::TooLarge { size: body.len() as u64, max: self.config.max_bytes });
        }

        let mut cached = CachedResponse::new(url, status, body);
        if let Some(mime) = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
        {
            cached = cached.with_mime_type(mime.trim().to_ascii_lowercase());
        }
        for (name, value) in &headers {
            if let Ok(value) = value.to_str() {
                cached = cached.with_header(name.as_str(), value);
            }
        }

        tracing::debug!(
            url = %url,
            final_url = %final_url,
            status,
            fetch_ms = start.elapsed().as_millis() as u64,
            bytes = cached.body.len(),
            "fetched resource"
        );

        Ok(cached)
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}
