//! Renderers that drive page loads for the prefetcher.
//!
//! [`FetchRenderer`] loads pages over plain HTTP and discovers sub-resources
//! from the markup; it runs no scripts. With the `headless` feature,
//! [`HeadlessRenderer`] drives a real Chromium instead.

#[cfg(feature = "headless")]
mod headless;

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use stowaway_core::cache::CacheRequest;
use stowaway_core::prefetch::{RenderError, Renderer, RendererFactory, ResourceEvent, ResourceEvents};

use crate::extract::extract_subresources;
use crate::fetch::FetchClient;

#[cfg(feature = "headless")]
pub use headless::{HeadlessLauncher, HeadlessRenderer};

/// Progress of a fetch-driven load, mirroring `document.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadyState::Loading => "loading",
            ReadyState::Interactive => "interactive",
            ReadyState::Complete => "complete",
        }
    }
}

#[derive(Debug)]
struct PageState {
    ready_state: ReadyState,
    location: Option<Url>,
}

/// Script-free renderer built on [`FetchClient`].
///
/// Fetches the page, then every sub-resource its markup references, one at a
/// time. `evaluate` answers `document.readyState` and `location.href`.
#[derive(Debug)]
pub struct FetchRenderer {
    client: FetchClient,
    state: Arc<Mutex<PageState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FetchRenderer {
    pub fn new(client: FetchClient) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(PageState { ready_state: ReadyState::Loading, location: None })),
            task: Mutex::new(None),
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).ready_state
    }

    fn abort_task(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

impl Drop for FetchRenderer {
    fn drop(&mut self) {
        self.abort_task();
    }
}

#[async_trait::async_trait]
impl Renderer for FetchRenderer {
    async fn load(&self, url: &Url) -> Result<ResourceEvents, RenderError> {
        self.abort_task();
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.ready_state = ReadyState::Loading;
            state.location = Some(url.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(fetch_page(self.client.clone(), url.clone(), self.state.clone(), tx));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(rx)
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, RenderError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match expression.trim().trim_end_matches(';') {
            "document.readyState" => Ok(Value::from(state.ready_state.as_str())),
            "location.href" | "window.location.href" | "document.URL" => {
                Ok(state.location.as_ref().map_or(Value::Null, |url| Value::from(url.as_str())))
            }
            other => Err(RenderError::Unsupported(other.to_string())),
        }
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.abort_task();
        Ok(())
    }
}

async fn fetch_page(
    client: FetchClient, url: Url, state: Arc<Mutex<PageState>>, events: mpsc::UnboundedSender<ResourceEvent>,
) {
    let set_ready = |ready_state| state.lock().unwrap_or_else(PoisonError::into_inner).ready_state = ready_state;

    let page = CacheRequest::new(&url);
    let _ = events.send(ResourceEvent::Requested(page.clone()));
    let response = match client.fetch(&url).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "page fetch failed");
            set_ready(ReadyState::Complete);
            return;
        }
    };

    let is_html = response.meta.mime_type.as_deref().is_none_or(|mime| mime.contains("html"));
    let resources = if is_html {
        extract_subresources(&String::from_utf8_lossy(&response.body), &url)
    } else {
        Vec::new()
    };
    let _ = events.send(ResourceEvent::Responded(page, response));
    set_ready(ReadyState::Interactive);

    for resource in resources {
        let request = CacheRequest::new(&resource);
        if events.send(ResourceEvent::Requested(request.clone())).is_err() {
            return;
        }
        match client.fetch(&resource).await {
            Ok(response) => {
                let _ = events.send(ResourceEvent::Responded(request, response));
            }
            Err(e) => tracing::debug!(url = %resource, error = %e, "sub-resource fetch failed"),
        }
    }

    set_ready(ReadyState::Complete);
}

/// Hands out a [`FetchRenderer`] per page load, sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct FetchRendererFactory {
    client: FetchClient,
}

impl FetchRendererFactory {
    pub fn new(client: FetchClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl RendererFactory for FetchRendererFactory {
    async fn launch(&self) -> Result<Box<dyn Renderer>, RenderError> {
        Ok(Box::new(FetchRenderer::new(self.client.clone())))
    }
}
