//! The caller-facing offline cache.
//!
//! [`OfflineCache`] wires a [`BoundedDiskStore`], a standard cache, the
//! coordinator registry, the router and the prefetcher together. Build one
//! per process and share it behind an `Arc`.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use url::Url;

use crate::Error;
use crate::cache::{
    ArchiveFormat, BoundedDiskStore, CacheRequest, CacheRouter, CachedResponse, MemoryCache, Routed, StandardCache,
    canonicalize,
};
use crate::config::AppConfig;
use crate::prefetch::{CacheTask, CoordinatorRegistry, LoadedPredicate, PageCacheUnit, PrefetchCoordinator, RendererFactory};

/// Snapshot of the offline store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct StoreStatus {
    pub entries: usize,
    pub current_size: u64,
    pub max_cache_size: u64,
    pub format: ArchiveFormat,
    pub active_coordinators: usize,
}

/// Offline page cache.
#[derive(Debug, Clone)]
pub struct OfflineCache {
    router: CacheRouter,
    prefetch: PrefetchCoordinator,
}

impl OfflineCache {
    /// Open the store named by `config` and wire everything around it.
    ///
    /// # Errors
    ///
    /// `Io` when the store directory cannot be created.
    pub fn open(config: &AppConfig, renderers: Arc<dyn RendererFactory>) -> Result<Self, Error> {
        let store = BoundedDiskStore::open(&config.store_dir, config.max_cache_size, config.archive_format)?;
        tracing::info!(
            store_dir = %config.store_dir.display(),
            entries = store.len(),
            current_size = store.current_size(),
            max_cache_size = config.max_cache_size,
            "opened offline cache"
        );

        let cache = Self::from_parts(Arc::new(store), Arc::new(MemoryCache::default()), renderers);
        let force_offline = config.force_offline;
        Ok(Self {
            router: cache.router.with_offline_check(move || force_offline),
            prefetch: cache.prefetch.with_poll_interval(config.poll_interval()),
        })
    }

    /// Assemble from already-built pieces.
    pub fn from_parts(
        store: Arc<BoundedDiskStore>, standard: Arc<dyn StandardCache>, renderers: Arc<dyn RendererFactory>,
    ) -> Self {
        let registry = Arc::new(CoordinatorRegistry::new());
        let router = CacheRouter::new(standard, store.clone(), registry.clone());
        let prefetch = PrefetchCoordinator::new(registry, store, renderers);
        Self { router, prefetch }
    }

    /// Install the predicate that reports whether the host is offline.
    pub fn with_offline_check(mut self, is_offline: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.router = self.router.with_offline_check(is_offline);
        self
    }

    /// Load `url` with everything it pulls in and keep it for offline use.
    ///
    /// # Errors
    ///
    /// - `InvalidUrl` when `url` cannot be parsed
    /// - `AlreadyInFlight` when the page is already being cached
    pub fn cache_url(&self, url: &str, predicate: impl LoadedPredicate + 'static) -> Result<CacheTask, Error> {
        let url = parse(url)?;
        self.prefetch.cache_url(&url, predicate)
    }

    /// Handler form of [`cache_url`](Self::cache_url); exactly one handler
    /// runs, exactly once.
    pub fn cache_url_with<C, F>(
        &self, url: &str, predicate: impl LoadedPredicate + 'static, on_complete: C, on_failure: F,
    ) -> Result<CacheTask, Error>
    where
        C: FnOnce(&PageCacheUnit) + Send + 'static,
        F: FnOnce(&Error) + Send + 'static,
    {
        match parse(url) {
            Ok(url) => self.prefetch.cache_url_with(&url, predicate, on_complete, on_failure),
            Err(e) => {
                on_failure(&e);
                Err(e)
            }
        }
    }

    pub fn store_response(&self, request: &CacheRequest, response: &CachedResponse) -> Result<Routed, Error> {
        self.router.store_response(request, response)
    }

    pub fn retrieve_response(&self, request: &CacheRequest) -> Option<CachedResponse> {
        self.router.retrieve_response(request)
    }

    pub fn clear_offline_cache(&self) -> Result<(), Error> {
        self.router.clear_offline_cache()
    }

    pub fn status(&self) -> StoreStatus {
        let store = self.router.store();
        StoreStatus {
            entries: store.len(),
            current_size: store.current_size(),
            max_cache_size: store.max_cache_size(),
            format: store.format(),
            active_coordinators: self.router.registry().len(),
        }
    }

    pub fn store(&self) -> &Arc<BoundedDiskStore> {
        self.router.store()
    }

    pub fn router(&self) -> &CacheRouter {
        &self.router
    }

    pub fn registry(&self) -> &Arc<CoordinatorRegistry> {
        self.router.registry()
    }

    pub fn prefetcher(&self) -> &PrefetchCoordinator {
        &self.prefetch
    }
}

fn parse(url: &str) -> Result<Url, Error> {
    Ok(canonicalize(url)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefetch::{DisabledRenderer, ReadyStateProbe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> AppConfig {
        AppConfig { store_dir: dir.to_path_buf(), max_cache_size: 1024 * 1024, ..Default::default() }
    }

    #[tokio::test]
    async fn test_open_and_status() {
        let dir = tempdir().unwrap();
        let cache = OfflineCache::open(&config(dir.path()), Arc::new(DisabledRenderer)).unwrap();

        let status = cache.status();
        assert_eq!(status.entries, 0);
        assert_eq!(status.current_size, 0);
        assert_eq!(status.max_cache_size, 1024 * 1024);
        assert_eq!(status.format, ArchiveFormat::SingleBlob);
        assert_eq!(status.active_coordinators, 0);
        assert_eq!(cache.prefetcher().poll_interval(), std::time::Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let request = CacheRequest::parse("https://example.com/a").unwrap().for_offline();
        {
            let cache = OfflineCache::open(&config(dir.path()), Arc::new(DisabledRenderer)).unwrap();
            let response = CachedResponse::new(request.url(), 200, "kept").with_mime_type("text/plain");
            assert_eq!(cache.store_response(&request, &response).unwrap(), Routed::Offline);
        }

        let cache = OfflineCache::open(&config(dir.path()), Arc::new(DisabledRenderer)).unwrap();
        let found = cache.retrieve_response(&request).unwrap();
        assert_eq!(found.body, "kept");
        assert_eq!(found.meta.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(cache.status().entries, 1);

        cache.clear_offline_cache().unwrap();
        assert_eq!(cache.status().entries, 0);
        assert!(cache.retrieve_response(&request).is_none());
    }

    #[tokio::test]
    async fn test_force_offline_prefers_store() {
        let dir = tempdir().unwrap();
        let config = AppConfig { force_offline: true, ..config(dir.path()) };
        let cache = OfflineCache::open(&config, Arc::new(DisabledRenderer)).unwrap();
        assert!(cache.router().is_offline());
    }

    #[tokio::test]
    async fn test_cache_url_rejects_bad_url_through_handler() {
        let dir = tempdir().unwrap();
        let cache = OfflineCache::open(&config(dir.path()), Arc::new(DisabledRenderer)).unwrap();
        let failures = Arc::new(AtomicUsize::new(0));
        let f = failures.clone();

        let result = cache.cache_url_with(
            "ftp://example.com/file",
            ReadyStateProbe,
            |_| panic!("bad url must not complete"),
            move |e| {
                assert!(matches!(e, Error::InvalidUrl(_)));
                f.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert!(matches!(result, Err(Error::InvalidUrl(_))));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_url_without_renderer_fails() {
        let dir = tempdir().unwrap();
        let cache = OfflineCache::open(&config(dir.path()), Arc::new(DisabledRenderer)).unwrap();

        let task = cache.cache_url("example.com", ReadyStateProbe).unwrap();
        assert_eq!(task.url().as_str(), "https://example.com/");

        assert!(matches!(task.wait().await, Err(Error::RenderFailed(_))));
        assert_eq!(cache.status().entries, 0);
    }
}
