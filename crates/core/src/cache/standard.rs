//! The ordinary, volatile response cache the router composes with.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::archive::CachedResponse;
use super::request::CacheRequest;

/// Any cache that can hold responses by request.
///
/// Implementations own their storage policy; the router offers every
/// response and lets the cache decide.
pub trait StandardCache: Send + Sync {
    fn store(&self, request: &CacheRequest, response: &CachedResponse);
    fn retrieve(&self, request: &CacheRequest) -> Option<CachedResponse>;
    fn clear(&self);
}

/// In-memory standard cache keyed by canonical URL.
///
/// Placeholder responses are never kept. A capacity of zero disables the
/// cache; past capacity, new URLs are refused until something is cleared.
#[derive(Debug)]
pub struct MemoryCache {
    capacity: usize,
    entries: RwLock<HashMap<String, CachedResponse>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: RwLock::new(HashMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl StandardCache for MemoryCache {
    fn store(&self, request: &CacheRequest, response: &CachedResponse) {
        if !response.is_valid() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let url = request.url().as_str();
        if entries.len() >= self.capacity && !entries.contains_key(url) {
            tracing::debug!(url, capacity = self.capacity, "standard cache full; not storing");
            return;
        }
        entries.insert(url.to_string(), response.clone());
    }

    fn retrieve(&self, request: &CacheRequest) -> Option<CachedResponse> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(request.url().as_str()).cloned()
    }

    fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> CacheRequest {
        CacheRequest::parse(url).unwrap()
    }

    #[test]
    fn test_store_and_retrieve() {
        let cache = MemoryCache::default();
        let req = request("https://example.com/");
        cache.store(&req, &CachedResponse::new(req.url(), 200, "hi"));
        assert_eq!(cache.retrieve(&req).unwrap().body, "hi");
    }

    #[test]
    fn test_ignores_placeholder() {
        let cache = MemoryCache::default();
        let req = request("https://example.com/");
        cache.store(&req, &CachedResponse::default());
        assert!(cache.retrieve(&req).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity() {
        let cache = MemoryCache::new(1);
        let a = request("https://a.example/");
        let b = request("https://b.example/");
        cache.store(&a, &CachedResponse::new(a.url(), 200, "a"));
        cache.store(&b, &CachedResponse::new(b.url(), 200, "b"));
        assert!(cache.retrieve(&b).is_none());

        cache.store(&a, &CachedResponse::new(a.url(), 200, "a2"));
        assert_eq!(cache.retrieve(&a).unwrap().body, "a2");

        cache.clear();
        assert!(cache.is_empty());
    }
}
