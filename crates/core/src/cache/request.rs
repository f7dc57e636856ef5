//! Requests as seen by the caches, with the offline opt-in marker.

use std::fmt;

use url::Url;

use super::canonical::{canonicalize, canonicalize_url};
use crate::Error;

/// A request for one URL.
///
/// The URL is canonical (no fragment), so two requests for the same page
/// compare equal and fingerprint to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheRequest {
    url: Url,
    cache_offline: bool,
}

impl CacheRequest {
    pub fn new(url: &Url) -> Self {
        Self { url: canonicalize_url(url), cache_offline: false }
    }

    /// Parse and canonicalize a URL string.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let url = canonicalize(input)?;
        Ok(Self { url, cache_offline: false })
    }

    /// Attach the "cache for offline" marker.
    pub fn for_offline(mut self) -> Self {
        self.cache_offline = true;
        self
    }

    pub fn is_marked_for_offline(&self) -> bool {
        self.cache_offline
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// True when both requests target the same canonical URL, marker aside.
    pub fn same_resource(&self, other: &CacheRequest) -> bool {
        self.url == other.url
    }
}

impl fmt::Display for CacheRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}
