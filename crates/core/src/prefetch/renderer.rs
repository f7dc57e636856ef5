//! Page-rendering capability consumed by the prefetcher.
//!
//! The core never parses markup or runs scripts. A renderer loads a page,
//! reports every request and response the load causes, and evaluates probe
//! expressions on demand.

use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::cache::{CacheRequest, CachedResponse};

/// Errors that can occur while driving a renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to launch or connect to the rendering engine.
    #[error("renderer launch failed: {0}")]
    Launch(String),

    /// Failed to navigate to URL.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Evaluating a probe expression failed.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// The renderer cannot evaluate this expression.
    #[error("unsupported expression: {0}")]
    Unsupported(String),

    /// Renderer closed unexpectedly.
    #[error("renderer closed unexpectedly")]
    Closed,
}

impl From<RenderError> for crate::Error {
    fn from(err: RenderError) -> Self {
        crate::Error::RenderFailed(err.to_string())
    }
}

/// Something the renderer observed while loading a page.
#[derive(Debug, Clone)]
pub enum ResourceEvent {
    /// An outgoing request (the page itself or a sub-resource).
    Requested(CacheRequest),
    /// A response arrived for a request.
    Responded(CacheRequest, CachedResponse),
}

/// Stream of resource events for one load.
pub type ResourceEvents = mpsc::UnboundedReceiver<ResourceEvent>;

/// One rendering surface, owned by a single page load at a time.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Begin navigating to `url`.
    ///
    /// Returns once navigation has started; events keep arriving on the
    /// returned channel until the load settles or the renderer closes.
    async fn load(&self, url: &Url) -> Result<ResourceEvents, RenderError>;

    /// Evaluate an expression against the current page state.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, RenderError>;

    /// Release the rendering surface.
    async fn close(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Hands out a fresh renderer per page load.
#[async_trait::async_trait]
pub trait RendererFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Renderer>, RenderError>;
}

/// Factory for deployments without a renderer; every launch fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRenderer;

#[async_trait::async_trait]
impl RendererFactory for DisabledRenderer {
    async fn launch(&self) -> Result<Box<dyn Renderer>, RenderError> {
        Err(RenderError::Launch("rendering is disabled".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_maps_to_render_failed() {
        let err: crate::Error = RenderError::Navigation("dns".into()).into();
        assert!(err.to_string().starts_with("RENDER_FAILED: navigation failed"));
    }

    #[tokio::test]
    async fn test_disabled_renderer_refuses() {
        assert!(matches!(DisabledRenderer.launch().await, Err(RenderError::Launch(_))));
    }
}
