//! Arena of in-flight page loads.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::coordinator::{Coordinator, CoordinatorId};
use crate::cache::CacheRequest;

/// Tracks every active [`Coordinator`] so the router can find the one
/// owning a request.
///
/// Coordinators are kept in registration order; when several own the same
/// request the oldest one wins.
#[derive(Debug, Default)]
pub struct CoordinatorRegistry {
    next_id: AtomicU64,
    active: RwLock<BTreeMap<CoordinatorId, Arc<Coordinator>>>,
}

impl CoordinatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a load of `target`.
    pub fn register(&self, target: CacheRequest) -> Arc<Coordinator> {
        let mut active = self.write();
        self.insert(&mut active, target)
    }

    /// Like [`register`](Self::register), but refuses a target another
    /// active load already owns. The check and insert happen under one lock.
    pub fn try_register(&self, target: CacheRequest) -> Option<Arc<Coordinator>> {
        let mut active = self.write();
        if active.values().any(|c| c.owns(&target)) {
            return None;
        }
        Some(self.insert(&mut active, target))
    }

    /// Stop tracking a load. Removing an unknown id is a no-op.
    pub fn remove(&self, id: CoordinatorId) -> Option<Arc<Coordinator>> {
        let removed = self.write().remove(&id);
        if removed.is_some() {
            tracing::debug!(coordinator = %id, "removed page load");
        }
        removed
    }

    pub fn get(&self, id: CoordinatorId) -> Option<Arc<Coordinator>> {
        self.read().get(&id).cloned()
    }

    /// The oldest active coordinator that owns `request`, if any.
    pub fn coordinator_owning(&self, request: &CacheRequest) -> Option<Arc<Coordinator>> {
        self.read().values().find(|c| c.owns(request)).cloned()
    }

    pub fn active_ids(&self) -> Vec<CoordinatorId> {
        self.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn insert(&self, active: &mut BTreeMap<CoordinatorId, Arc<Coordinator>>, target: CacheRequest) -> Arc<Coordinator> {
        let id = CoordinatorId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let coordinator = Arc::new(Coordinator::new(id, target));
        active.insert(id, coordinator.clone());
        tracing::debug!(coordinator = %id, url = %coordinator.target(), "registered page load");
        coordinator
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<CoordinatorId, Arc<Coordinator>>> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<CoordinatorId, Arc<Coordinator>>> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }
}
