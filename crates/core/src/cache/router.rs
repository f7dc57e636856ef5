//! Arbitration between the standard cache and the bounded offline store.

use std::fmt;
use std::sync::Arc;

use super::archive::CachedResponse;
use super::request::CacheRequest;
use super::standard::StandardCache;
use super::store::BoundedDiskStore;
use crate::Error;
use crate::prefetch::CoordinatorRegistry;

type OfflineCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Where a stored response ended up, besides the standard cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Left to the standard cache only.
    Standard,
    /// Also written to the offline store.
    Offline,
    /// Held by an in-flight page load until it commits.
    Captured,
}

/// One cache-like surface over a standard cache and a [`BoundedDiskStore`].
#[derive(Clone)]
pub struct CacheRouter {
    standard: Arc<dyn StandardCache>,
    store: Arc<BoundedDiskStore>,
    registry: Arc<CoordinatorRegistry>,
    is_offline: OfflineCheck,
}

impl fmt::Debug for CacheRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRouter")
            .field("store", &self.store)
            .field("active_coordinators", &self.registry.len())
            .field("offline", &self.is_offline())
            .finish()
    }
}

impl CacheRouter {
    pub fn new(
        standard: Arc<dyn StandardCache>, store: Arc<BoundedDiskStore>, registry: Arc<CoordinatorRegistry>,
    ) -> Self {
        Self { standard, store, registry, is_offline: Arc::new(|| false) }
    }

    /// Install the predicate that reports whether the host is offline.
    pub fn with_offline_check(mut self, is_offline: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.is_offline = Arc::new(is_offline);
        self
    }

    pub fn is_offline(&self) -> bool {
        (self.is_offline)()
    }

    /// Offer a response to the caches.
    ///
    /// The standard cache always sees it. Responses belonging to an
    /// in-flight page load are captured by that load. Otherwise a valid
    /// response goes to the offline store when the request is marked for
    /// offline caching, or when an offline copy of the URL already exists.
    pub fn store_response(&self, request: &CacheRequest, response: &CachedResponse) -> Result<Routed, Error> {
        self.standard.store(request, response);

        if let Some(coordinator) = self.registry.coordinator_owning(request)
            && coordinator.capture(request.clone(), response.clone())
        {
            tracing::debug!(url = %request, coordinator = %coordinator.id(), "captured response for page load");
            return Ok(Routed::Captured);
        }

        if !response.is_valid() {
            return Ok(Routed::Standard);
        }

        let key = self.store.key_for(request.url())?;
        if request.is_marked_for_offline() || self.store.contains(&key) {
            self.store.store(&key, response)?;
            return Ok(Routed::Offline);
        }

        Ok(Routed::Standard)
    }

    /// Look a request up.
    ///
    /// An in-flight page load that owns the request answers first, then the
    /// offline store, then the standard cache. Unmarked requests made while
    /// online try the standard cache before the offline store.
    pub fn retrieve_response(&self, request: &CacheRequest) -> Option<CachedResponse> {
        if let Some(coordinator) = self.registry.coordinator_owning(request)
            && let Some(response) = coordinator.captured_response(request)
        {
            return Some(response);
        }

        if request.is_marked_for_offline() || self.is_offline() {
            self.retrieve_offline(request).or_else(|| self.standard.retrieve(request))
        } else {
            self.standard.retrieve(request).or_else(|| self.retrieve_offline(request))
        }
    }

    /// Remove every offline entry.
    pub fn clear_offline_cache(&self) -> Result<(), Error> {
        self.store.clear()
    }

    pub fn store(&self) -> &Arc<BoundedDiskStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<CoordinatorRegistry> {
        &self.registry
    }

    fn retrieve_offline(&self, request: &CacheRequest) -> Option<CachedResponse> {
        match self.store.key_for(request.url()) {
            Ok(key) => self.store.retrieve(&key),
            Err(e) => {
                tracing::debug!(url = %request, error = %e, "cannot fingerprint request");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::archive::ArchiveFormat;
    use crate::cache::persist::MemoryBlobStore;
    use crate::cache::standard::MemoryCache;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn router() -> (CacheRouter, Arc<MemoryCache>) {
        let standard = Arc::new(MemoryCache::default());
        let store = Arc::new(BoundedDiskStore::with_blob_store(
            Arc::new(MemoryBlobStore::new()),
            1024 * 1024,
            ArchiveFormat::SingleBlob,
        ));
        (CacheRouter::new(standard.clone(), store, Arc::new(CoordinatorRegistry::new())), standard)
    }

    fn valid(request: &CacheRequest, body: &'static str) -> CachedResponse {
        CachedResponse::new(request.url(), 200, body)
    }

    fn offline_key(router: &CacheRouter, request: &CacheRequest) -> crate::cache::CacheEntryKey {
        router.store().key_for(request.url()).unwrap()
    }

    #[test]
    fn test_marked_valid_response_goes_offline() {
        let (router, _) = router();
        let request = CacheRequest::parse("https://example.com/a").unwrap().for_offline();

        let routed = router.store_response(&request, &valid(&request, "hello, world")).unwrap();

        assert_eq!(routed, Routed::Offline);
        assert!(router.store().contains(&offline_key(&router, &request)));
    }

    #[test]
    fn test_marked_placeholder_stays_out() {
        let (router, _) = router();
        let request = CacheRequest::parse("https://example.com/a").unwrap().for_offline();

        let routed = router.store_response(&request, &CachedResponse::default()).unwrap();

        assert_eq!(routed, Routed::Standard);
        assert!(!router.store().contains(&offline_key(&router, &request)));
    }

    #[test]
    fn test_unmarked_placeholder_stays_out() {
        let (router, _) = router();
        let request = CacheRequest::parse("https://example.com/b").unwrap();

        router.store_response(&request, &CachedResponse::default()).unwrap();

        assert!(!router.store().contains(&offline_key(&router, &request)));
    }

    #[test]
    fn test_unmarked_response_goes_to_standard_only() {
        let (router, standard) = router();
        let request = CacheRequest::parse("https://example.com/b").unwrap();

        let routed = router.store_response(&request, &valid(&request, "standard")).unwrap();

        assert_eq!(routed, Routed::Standard);
        assert!(!router.store().contains(&offline_key(&router, &request)));
        assert_eq!(standard.retrieve(&request).unwrap().body, "standard");
    }

    #[test]
    fn test_unmarked_refetch_refreshes_offline_copy() {
        let (router, _) = router();
        let marked = CacheRequest::parse("https://example.com/a").unwrap().for_offline();
        router.store_response(&marked, &valid(&marked, "old")).unwrap();

        let plain = CacheRequest::parse("https://example.com/a").unwrap();
        let routed = router.store_response(&plain, &valid(&plain, "new")).unwrap();

        assert_eq!(routed, Routed::Offline);
        let key = offline_key(&router, &plain);
        assert_eq!(router.store().retrieve(&key).unwrap().body, "new");
    }

    #[test]
    fn test_retrieve_falls_back_to_offline_store() {
        let (router, standard) = router();
        let request = CacheRequest::parse("https://example.com/a").unwrap().for_offline();
        router.store_response(&request, &valid(&request, "offline copy")).unwrap();
        standard.clear();

        let plain = CacheRequest::parse("https://example.com/a").unwrap();
        assert_eq!(router.retrieve_response(&plain).unwrap().body, "offline copy");
    }

    #[test]
    fn test_marked_request_prefers_offline_store() {
        let (router, standard) = router();
        let request = CacheRequest::parse("https://example.com/a").unwrap().for_offline();
        router.store_response(&request, &valid(&request, "offline copy")).unwrap();
        standard.store(&request, &valid(&request, "standard copy"));

        assert!(!router.is_offline());
        assert_eq!(router.retrieve_response(&request).unwrap().body, "offline copy");
    }

    #[test]
    fn test_online_unmarked_prefers_standard_cache() {
        let (router, standard) = router();
        let marked = CacheRequest::parse("https://example.com/a").unwrap().for_offline();
        router.store_response(&marked, &valid(&marked, "offline copy")).unwrap();
        let plain = CacheRequest::parse("https://example.com/a").unwrap();
        standard.store(&plain, &valid(&plain, "standard copy"));

        assert_eq!(router.retrieve_response(&plain).unwrap().body, "standard copy");
    }

    #[test]
    fn test_offline_prefers_offline_store() {
        let (router, standard) = router();
        let offline = Arc::new(AtomicBool::new(true));
        let flag = offline.clone();
        let router = router.with_offline_check(move || flag.load(Ordering::SeqCst));

        let request = CacheRequest::parse("https://example.com/a").unwrap().for_offline();
        router.store_response(&request, &valid(&request, "offline copy")).unwrap();
        standard.store(&request, &valid(&request, "fresh copy"));

        let plain = CacheRequest::parse("https://example.com/a").unwrap();
        assert!(router.is_offline());
        assert_eq!(router.retrieve_response(&request).unwrap().body, "offline copy");
        assert_eq!(router.retrieve_response(&plain).unwrap().body, "offline copy");

        offline.store(false, Ordering::SeqCst);
        assert_eq!(router.retrieve_response(&request).unwrap().body, "offline copy");
        assert_eq!(router.retrieve_response(&plain).unwrap().body, "fresh copy");
    }

    #[test]
    fn test_owned_response_is_captured_not_stored() {
        let (router, _) = router();
        let page = CacheRequest::parse("https://example.com/").unwrap().for_offline();
        let coordinator = router.registry().register(page.clone());
        let style = CacheRequest::parse("https://example.com/style.css").unwrap();
        coordinator.observe(style.clone());

        let routed = router.store_response(&style, &valid(&style, "body {}")).unwrap();

        assert_eq!(routed, Routed::Captured);
        assert!(!router.store().contains(&offline_key(&router, &style)));
        assert_eq!(router.retrieve_response(&style).unwrap().body, "body {}");
        assert_eq!(coordinator.captured_response(&style).unwrap().body, "body {}");
    }

    #[test]
    fn test_clear_offline_cache() {
        let (router, _) = router();
        let request = CacheRequest::parse("https://example.com/a").unwrap().for_offline();
        router.store_response(&request, &valid(&request, "x")).unwrap();

        router.clear_offline_cache().unwrap();

        assert!(router.store().is_empty());
    }
}
