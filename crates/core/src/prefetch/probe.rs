//! Completion predicates evaluated while a page loads.

use super::renderer::{RenderError, Renderer};

/// Decides whether a page has finished loading.
///
/// Evaluated once per poll tick; only one evaluation is ever in flight.
#[async_trait::async_trait]
pub trait LoadedPredicate: Send {
    async fn is_loaded(&mut self, renderer: &dyn Renderer) -> Result<bool, RenderError>;
}

#[async_trait::async_trait]
impl<P: LoadedPredicate + ?Sized> LoadedPredicate for Box<P> {
    async fn is_loaded(&mut self, renderer: &dyn Renderer) -> Result<bool, RenderError> {
        (**self).is_loaded(renderer).await
    }
}

/// Ready once `document.readyState` reports `"complete"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadyStateProbe;

#[async_trait::async_trait]
impl LoadedPredicate for ReadyStateProbe {
    async fn is_loaded(&mut self, renderer: &dyn Renderer) -> Result<bool, RenderError> {
        let state = renderer.evaluate("document.readyState").await?;
        Ok(state.as_str() == Some("complete"))
    }
}

/// Ready once a script evaluates to an expected value.
#[derive(Debug, Clone)]
pub struct ScriptProbe {
    pub script: String,
    pub expected: serde_json::Value,
}

impl ScriptProbe {
    pub fn new(script: impl Into<String>, expected: serde_json::Value) -> Self {
        Self { script: script.into(), expected }
    }
}

#[async_trait::async_trait]
impl LoadedPredicate for ScriptProbe {
    async fn is_loaded(&mut self, renderer: &dyn Renderer) -> Result<bool, RenderError> {
        Ok(renderer.evaluate(&self.script).await? == self.expected)
    }
}
