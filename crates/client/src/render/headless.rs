//! Headless Chrome/Chromium renderer using chromiumoxide.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use stowaway_core::cache::{CacheRequest, CachedResponse};
use stowaway_core::prefetch::{RenderError, Renderer, RendererFactory, ResourceEvent, ResourceEvents};

/// One shared browser; each launch opens a fresh tab.
pub struct HeadlessLauncher {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
}

impl HeadlessLauncher {
    /// Launch a headless browser instance.
    ///
    /// The browser uses a background task to handle Chrome DevTools Protocol
    /// events; it stops when the launcher is dropped.
    pub async fn new() -> Result<Self, RenderError> {
        let (browser, mut handler) =
            Browser::launch(BrowserConfig::builder().build().map_err(RenderError::Launch)?)
                .await
                .map_err(|e| RenderError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                    break;
                }
            }
        });

        Ok(Self { browser: Arc::new(browser), handler })
    }
}

impl Drop for HeadlessLauncher {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait::async_trait]
impl RendererFactory for HeadlessLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>, RenderError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;
        Ok(Box::new(HeadlessRenderer { page, tasks: Mutex::new(Vec::new()) }))
    }
}

/// A browser tab reporting its network traffic as resource events.
pub struct HeadlessRenderer {
    page: Page,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HeadlessRenderer {
    fn abort_tasks(&self) {
        for task in self.tasks.lock().unwrap_or_else(PoisonError::into_inner).drain(..) {
            task.abort();
        }
    }
}

impl Drop for HeadlessRenderer {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

#[async_trait::async_trait]
impl Renderer for HeadlessRenderer {
    async fn load(&self, url: &Url) -> Result<ResourceEvents, RenderError> {
        let listen_err = |e: chromiumoxide::error::CdpError| RenderError::Navigation(e.to_string());
        let requests = self.page.event_listener::<EventRequestWillBeSent>().await.map_err(listen_err)?;
        let responses = self.page.event_listener::<EventResponseReceived>().await.map_err(listen_err)?;
        let finished = self.page.event_listener::<EventLoadingFinished>().await.map_err(listen_err)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let page = self.page.clone();
        let network = tokio::spawn(async move {
            let mut requests = requests.fuse();
            let mut responses = responses.fuse();
            let mut finished = finished.fuse();
            let mut in_flight: HashMap<RequestId, CacheRequest> = HashMap::new();
            let mut received: HashMap<RequestId, CachedResponse> = HashMap::new();

            loop {
                tokio::select! {
                    Some(event) = requests.next() => {
                        let Ok(url) = Url::parse(&event.request.url) else { continue };
                        if !matches!(url.scheme(), "http" | "https") {
                            continue;
                        }
                        let request = CacheRequest::new(&url);
                        in_flight.insert(event.request_id.clone(), request.clone());
                        if tx.send(ResourceEvent::Requested(request)).is_err() {
                            break;
                        }
                    }
                    Some(event) = responses.next() => {
                        if let Some(request) = in_flight.get(&event.request_id) {
                            received.insert(event.request_id.clone(), response_meta(request, &event));
                        }
                    }
                    Some(event) = finished.next() => {
                        let (Some(request), Some(mut response)) =
                            (in_flight.remove(&event.request_id), received.remove(&event.request_id))
                        else {
                            continue;
                        };
                        match response_body(&page, &event.request_id).await {
                            Ok(body) => response.body = body,
                            Err(e) => tracing::debug!(url = %request, error = %e, "response body unavailable"),
                        }
                        if tx.send(ResourceEvent::Responded(request, response)).is_err() {
                            break;
                        }
                    }
                    else => break,
                }
            }
        });

        let page = self.page.clone();
        let target = url.clone();
        let navigation = tokio::spawn(async move {
            if let Err(e) = page.goto(target.as_str()).await {
                tracing::warn!(url = %target, error = %e, "navigation failed");
            }
        });

        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).extend([network, navigation]);
        Ok(rx)
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, RenderError> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| RenderError::Evaluation(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.abort_tasks();
        self.page.clone().close().await.map_err(|_| RenderError::Closed)
    }
}

fn response_meta(request: &CacheRequest, event: &EventResponseReceived) -> CachedResponse {
    let status = u16::try_from(event.response.status).unwrap_or(0);
    let mut response = CachedResponse::new(request.url(), status, Bytes::new()).with_mime_type(&event.response.mime_type);
    if let Some(headers) = event.response.headers.inner().as_object() {
        for (name, value) in headers {
            if let Some(value) = value.as_str() {
                response = response.with_header(name.to_ascii_lowercase(), value);
            }
        }
    }
    response
}

async fn response_body(page: &Page, request_id: &RequestId) -> Result<Bytes, RenderError> {
    let body = page
        .execute(GetResponseBodyParams::new(request_id.clone()))
        .await
        .map_err(|e| RenderError::Evaluation(e.to_string()))?;
    if body.base64_encoded {
        STANDARD
            .decode(&body.body)
            .map(Bytes::from)
            .map_err(|e| RenderError::Evaluation(e.to_string()))
    } else {
        Ok(Bytes::from(body.body.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowaway_core::prefetch::{LoadedPredicate, ReadyStateProbe};

    #[tokio::test]
    #[ignore = "requires Chrome/Chromium installation"]
    async fn test_headless_launcher_new() {
        let launcher = HeadlessLauncher::new().await;
        assert!(launcher.is_ok());
    }

    #[tokio::test]
    #[ignore = "requires network and Chrome/Chromium"]
    async fn test_load_reports_page_response() {
        let launcher = HeadlessLauncher::new().await.unwrap();
        let renderer = launcher.launch().await.unwrap();
        let url = Url::parse("https://example.com").unwrap();

        let mut events = renderer.load(&url).await.unwrap();
        let mut probe = ReadyStateProbe;
        while !probe.is_loaded(renderer.as_ref()).await.unwrap_or(false) {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
        renderer.close().await.unwrap();

        let mut page_body = None;
        while let Ok(event) = events.try_recv() {
            if let ResourceEvent::Responded(request, response) = event
                && request.url() == &url
            {
                page_body = Some(response.body);
            }
        }
        assert!(String::from_utf8_lossy(&page_body.unwrap()).contains("<html"));
    }
}
