//! State of one in-flight page load.
//!
//! A [`Coordinator`] is shared between the task driving the load, the
//! registry and the router: the task moves it through its phases, the router
//! hands it responses for requests it owns.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::cache::{CacheRequest, CachedResponse};

/// Arena id of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CoordinatorId(pub(crate) u64);

impl fmt::Display for CoordinatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle phase of a page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    AwaitingCompletion,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl Phase {
    /// Observed requests and responses are only accepted before finalizing.
    pub fn accepts_resources(self) -> bool {
        matches!(self, Phase::Idle | Phase::Loading | Phase::AwaitingCompletion)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed | Phase::Cancelled)
    }
}

#[derive(Debug)]
struct State {
    phase: Phase,
    observed: Vec<CacheRequest>,
    captured: HashMap<String, CachedResponse>,
}

/// Transient bookkeeping for one page load.
#[derive(Debug)]
pub struct Coordinator {
    id: CoordinatorId,
    target: CacheRequest,
    state: Mutex<State>,
}

impl Coordinator {
    pub(crate) fn new(id: CoordinatorId, target: CacheRequest) -> Self {
        Self {
            id,
            target,
            state: Mutex::new(State { phase: Phase::Idle, observed: Vec::new(), captured: HashMap::new() }),
        }
    }

    pub fn id(&self) -> CoordinatorId {
        self.id
    }

    /// The primary request of this load.
    pub fn target(&self) -> &CacheRequest {
        &self.target
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        let mut state = self.state();
        tracing::debug!(coordinator = %self.id, from = ?state.phase, to = ?phase, "coordinator phase change");
        state.phase = phase;
    }

    /// True for the primary request and every sub-resource observed so far.
    pub fn owns(&self, request: &CacheRequest) -> bool {
        self.target.same_resource(request) || self.state().observed.iter().any(|r| r.same_resource(request))
    }

    /// Record a request caused by this load.
    ///
    /// Returns false when it was already known or the load no longer
    /// accepts resources.
    pub fn observe(&self, request: CacheRequest) -> bool {
        let mut state = self.state();
        if !state.phase.accepts_resources() || state.observed.iter().any(|r| r.same_resource(&request)) {
            return false;
        }
        state.observed.push(request);
        true
    }

    /// Record the response for a request of this load; the latest wins.
    ///
    /// Returns false once the load no longer accepts resources.
    pub fn capture(&self, request: CacheRequest, response: CachedResponse) -> bool {
        let mut state = self.state();
        if !state.phase.accepts_resources() {
            return false;
        }
        if !state.observed.iter().any(|r| r.same_resource(&request)) {
            state.observed.push(request.clone());
        }
        state.captured.insert(request.url().as_str().to_string(), response);
        true
    }

    pub fn captured_response(&self, request: &CacheRequest) -> Option<CachedResponse> {
        self.state().captured.get(request.url().as_str()).cloned()
    }

    /// Requests observed so far, in observation order.
    pub fn observed_requests(&self) -> Vec<CacheRequest> {
        self.state().observed.clone()
    }

    /// Take every observed request with its captured response, if any.
    pub(crate) fn take_unit(&self) -> Vec<(CacheRequest, Option<CachedResponse>)> {
        let mut state = self.state();
        let mut captured = std::mem::take(&mut state.captured);
        std::mem::take(&mut state.observed)
            .into_iter()
            .map(|request| {
                let response = captured.remove(request.url().as_str());
                (request, response)
            })
            .collect()
    }

    /// Drop everything observed without committing it.
    pub(crate) fn discard(&self) {
        let mut state = self.state();
        state.observed.clear();
        state.captured.clear();
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
