//! Whole-page prefetching.
//!
//! A page load renders the target URL, records every resource the load
//! pulls in, polls a [`LoadedPredicate`] until the page settles, then
//! commits the observed responses to the [`BoundedDiskStore`] as one unit.
//!
//! Each load runs on its own tokio task and is tracked by a [`Coordinator`]
//! in the shared [`CoordinatorRegistry`], which is how the router recognizes
//! responses that belong to it.

pub mod coordinator;
pub mod probe;
pub mod registry;
pub mod renderer;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

use crate::cache::{BoundedDiskStore, CacheRequest};
use crate::error::{AggregatedCommitFailure, CommitFailure};
use crate::Error;

pub use coordinator::{Coordinator, CoordinatorId, Phase};
pub use probe::{LoadedPredicate, ReadyStateProbe, ScriptProbe};
pub use registry::CoordinatorRegistry;
pub use renderer::{DisabledRenderer, RenderError, Renderer, RendererFactory, ResourceEvent, ResourceEvents};

/// Default interval between completion checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What a finished page load wrote to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageCacheUnit {
    /// The page that was loaded.
    pub target: String,
    /// URLs stored, in commit order.
    pub committed: Vec<String>,
    /// Sub-resources observed without a usable response.
    pub skipped: Vec<String>,
}

/// Starts page loads and commits them to the bounded store.
#[derive(Clone)]
pub struct PrefetchCoordinator {
    registry: Arc<CoordinatorRegistry>,
    store: Arc<BoundedDiskStore>,
    renderers: Arc<dyn RendererFactory>,
    poll_interval: Duration,
}

impl fmt::Debug for PrefetchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchCoordinator")
            .field("active", &self.registry.len())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl PrefetchCoordinator {
    pub fn new(
        registry: Arc<CoordinatorRegistry>, store: Arc<BoundedDiskStore>, renderers: Arc<dyn RendererFactory>,
    ) -> Self {
        Self { registry, store, renderers, poll_interval: DEFAULT_POLL_INTERVAL }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn registry(&self) -> &Arc<CoordinatorRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<BoundedDiskStore> {
        &self.store
    }

    /// Load `url` and cache it with everything it pulls in.
    ///
    /// The load runs on a spawned task, so this must be called from within a
    /// tokio runtime. Await [`CacheTask::wait`] for the outcome.
    ///
    /// # Errors
    ///
    /// `AlreadyInFlight` when an active load already owns `url`.
    pub fn cache_url(&self, url: &Url, predicate: impl LoadedPredicate + 'static) -> Result<CacheTask, Error> {
        let coordinator = self.register(url)?;
        Ok(self.spawn(coordinator, Box::new(predicate), |_| {}))
    }

    /// Handler form of [`cache_url`](Self::cache_url).
    ///
    /// Exactly one of `on_complete` and `on_failure` runs, exactly once,
    /// including when the load is refused up front.
    pub fn cache_url_with<C, F>(
        &self, url: &Url, predicate: impl LoadedPredicate + 'static, on_complete: C, on_failure: F,
    ) -> Result<CacheTask, Error>
    where
        C: FnOnce(&PageCacheUnit) + Send + 'static,
        F: FnOnce(&Error) + Send + 'static,
    {
        let coordinator = match self.register(url) {
            Ok(coordinator) => coordinator,
            Err(e) => {
                on_failure(&e);
                return Err(e);
            }
        };
        Ok(self.spawn(coordinator, Box::new(predicate), move |result| match result {
            Ok(unit) => on_complete(unit),
            Err(e) => on_failure(e),
        }))
    }

    fn register(&self, url: &Url) -> Result<Arc<Coordinator>, Error> {
        let target = CacheRequest::new(url).for_offline();
        self.registry
            .try_register(target.clone())
            .ok_or_else(|| Error::AlreadyInFlight(target.to_string()))
    }

    fn spawn(
        &self, coordinator: Arc<Coordinator>, predicate: Box<dyn LoadedPredicate>,
        finish: impl FnOnce(&Result<PageCacheUnit, Error>) + Send + 'static,
    ) -> CacheTask {
        let (cancel, cancel_rx) = watch::channel(false);
        let id = coordinator.id();
        let url = coordinator.target().url().clone();
        let guard = Deregister { registry: self.registry.clone(), id };
        let load = PageLoad {
            coordinator,
            store: self.store.clone(),
            renderers: self.renderers.clone(),
            poll_interval: self.poll_interval,
            predicate,
            cancel: cancel_rx,
        };

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let result = load.run().await;
            finish(&result);
            result
        });

        CacheTask { id, url, cancel, handle }
    }
}

/// Handle to a running page load.
///
/// Dropping the handle cancels the load, as [`CacheTask::cancel`] does.
#[derive(Debug)]
pub struct CacheTask {
    id: CoordinatorId,
    url: Url,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<Result<PageCacheUnit, Error>>,
}

impl CacheTask {
    pub fn id(&self) -> CoordinatorId {
        self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Ask the load to stop.
    ///
    /// Honoured until the commit starts; a commit already under way runs to
    /// completion.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the load to finish.
    ///
    /// Dropping the returned future before it resolves cancels the load.
    pub async fn wait(mut self) -> Result<PageCacheUnit, Error> {
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::Cancelled(self.url.to_string())),
            Err(e) => Err(Error::RenderFailed(format!("page load task failed: {e}"))),
        }
    }
}

impl Drop for CacheTask {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

/// Removes the coordinator from the registry however the task ends.
struct Deregister {
    registry: Arc<CoordinatorRegistry>,
    id: CoordinatorId,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

struct PageLoad {
    coordinator: Arc<Coordinator>,
    store: Arc<BoundedDiskStore>,
    renderers: Arc<dyn RendererFactory>,
    poll_interval: Duration,
    predicate: Box<dyn LoadedPredicate>,
    cancel: watch::Receiver<bool>,
}

impl PageLoad {
    async fn run(mut self) -> Result<PageCacheUnit, Error> {
        let target = self.coordinator.target().clone();
        tracing::info!(coordinator = %self.coordinator.id(), url = %target, "loading page for offline use");
        self.coordinator.set_phase(Phase::Loading);

        let started = tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => None,
            started = start(self.renderers.as_ref(), &self.coordinator) => Some(started),
        };
        let (renderer, mut events) = match started {
            None => return Err(self.abort()),
            Some(Err(e)) => {
                tracing::warn!(url = %target, error = %e, "page load failed to start");
                self.coordinator.discard();
                self.coordinator.set_phase(Phase::Failed);
                return Err(e.into());
            }
            Some(Ok(started)) => started,
        };

        self.coordinator.set_phase(Phase::AwaitingCompletion);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => {
                    close(renderer.as_ref(), &target).await;
                    return Err(self.abort());
                }
                event = events.recv(), if events_open => match event {
                    Some(event) => apply(&self.coordinator, event),
                    None => events_open = false,
                },
                _ = ticker.tick() => match self.predicate.is_loaded(renderer.as_ref()).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e @ RenderError::Unsupported(_)) => {
                        tracing::warn!(url = %target, error = %e, "completion check cannot run on this renderer");
                        close(renderer.as_ref(), &target).await;
                        self.coordinator.discard();
                        self.coordinator.set_phase(Phase::Failed);
                        return Err(e.into());
                    }
                    Err(e) => tracing::debug!(url = %target, error = %e, "completion check failed"),
                },
            }
        }

        close(renderer.as_ref(), &target).await;
        drop(renderer);
        while let Ok(event) = events.try_recv() {
            apply(&self.coordinator, event);
        }

        self.coordinator.set_phase(Phase::Finalizing);
        let (coordinator, store) = (self.coordinator.clone(), self.store.clone());
        let committing = tokio::task::spawn_blocking(move || commit(&coordinator, &store, &target));
        match committing.await {
            Ok(result) => result,
            Err(e) => {
                self.coordinator.set_phase(Phase::Failed);
                Err(Error::RenderFailed(format!("page commit task failed: {e}")))
            }
        }
    }

    fn abort(&self) -> Error {
        let target = self.coordinator.target();
        tracing::info!(coordinator = %self.coordinator.id(), url = %target, "page load cancelled");
        self.coordinator.discard();
        self.coordinator.set_phase(Phase::Cancelled);
        Error::Cancelled(target.to_string())
    }
}

/// Write every captured response of a finished load to the store.
///
/// Runs on the blocking pool; each store call syncs files to disk.
fn commit(coordinator: &Coordinator, store: &BoundedDiskStore, target: &CacheRequest) -> Result<PageCacheUnit, Error> {
    let mut committed = Vec::new();
    let mut skipped = Vec::new();
    let mut failures = Vec::new();

    for (request, response) in coordinator.take_unit() {
        let url = request.url().to_string();
        match response {
            Some(response) if response.is_valid() => {
                match store.key_for(request.url()).and_then(|key| store.store(&key, &response)) {
                    Ok(()) => committed.push(url),
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "failed to commit response");
                        failures.push(CommitFailure { url, reason: e.to_string() });
                    }
                }
            }
            _ if request.same_resource(target) => {
                failures.push(CommitFailure { url, reason: "no valid response for the page".into() });
            }
            _ => skipped.push(url),
        }
    }

    if failures.is_empty() {
        coordinator.set_phase(Phase::Completed);
        tracing::info!(url = %target, committed = committed.len(), skipped = skipped.len(), "page cached");
        Ok(PageCacheUnit { target: target.url().to_string(), committed, skipped })
    } else {
        coordinator.set_phase(Phase::Failed);
        tracing::warn!(url = %target, failed = failures.len(), committed = committed.len(), "page commit incomplete");
        Err(Error::AggregatedCommitFailure(AggregatedCommitFailure { failures, committed: committed.len() }))
    }
}

async fn start(
    renderers: &dyn RendererFactory, coordinator: &Coordinator,
) -> Result<(Box<dyn Renderer>, ResourceEvents), RenderError> {
    let renderer = renderers.launch().await?;
    let target = coordinator.target();
    coordinator.observe(target.clone());
    match renderer.load(target.url()).await {
        Ok(events) => Ok((renderer, events)),
        Err(e) => {
            close(renderer.as_ref(), target).await;
            Err(e)
        }
    }
}

async fn close(renderer: &dyn Renderer, target: &CacheRequest) {
    if let Err(e) = renderer.close().await {
        tracing::warn!(url = %target, error = %e, "failed to close renderer");
    }
}

fn apply(coordinator: &Coordinator, event: ResourceEvent) {
    match event {
        ResourceEvent::Requested(request) => {
            coordinator.observe(request);
        }
        ResourceEvent::Responded(request, response) => {
            coordinator.capture(request, response);
        }
    }
}

/// Resolves once cancellation is requested or the task handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}
