//! Bounded, durable key → response store with FIFO eviction.
//!
//! The manifest is the single source of truth for which entries exist and in
//! what order they were inserted. Every mutation holds the write lock across
//! the whole read-modify-persist sequence, so readers never see a torn
//! manifest and total-size accounting stays exact.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use url::Url;

use super::archive::{ArchiveFormat, CachedResponse};
use super::hash::{CacheEntryKey, Fingerprinter};
use super::manifest::StoreManifest;
use super::persist::{BlobStore, FsBlobStore};
use crate::Error;

/// Suffix of blobs written but not yet moved into place.
const STAGING_SUFFIX: &str = ".staged";

/// Size-capped offline store.
pub struct BoundedDiskStore {
    blobs: Arc<dyn BlobStore>,
    fingerprinter: Fingerprinter,
    format: ArchiveFormat,
    max_cache_size: u64,
    manifest: RwLock<StoreManifest>,
}

impl fmt::Debug for BoundedDiskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let manifest = self.read_manifest();
        f.debug_struct("BoundedDiskStore")
            .field("format", &self.format)
            .field("max_cache_size", &self.max_cache_size)
            .field("current_size", &manifest.total_size)
            .field("entries", &manifest.ordered_keys.len())
            .finish()
    }
}

impl BoundedDiskStore {
    /// Open a store rooted at `dir`, loading its manifest if one exists.
    pub fn open(dir: impl AsRef<Path>, max_cache_size: u64, format: ArchiveFormat) -> Result<Self, Error> {
        let blobs = FsBlobStore::open(dir)?;
        Ok(Self::with_blob_store(Arc::new(blobs), max_cache_size, format))
    }

    /// Build a store over an injected persistence facility.
    pub fn with_blob_store(blobs: Arc<dyn BlobStore>, max_cache_size: u64, format: ArchiveFormat) -> Self {
        let manifest = StoreManifest::load(blobs.as_ref());
        tracing::debug!(
            entries = manifest.ordered_keys.len(),
            current_size = manifest.total_size,
            max_cache_size,
            "opened bounded store"
        );
        Self { blobs, fingerprinter: Fingerprinter::default(), format, max_cache_size, manifest: RwLock::new(manifest) }
    }

    /// Replace the key derivation.
    pub fn with_fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    /// Storage key for a request URL.
    pub fn key_for(&self, url: &Url) -> Result<CacheEntryKey, Error> {
        self.fingerprinter.key_for(url.as_str())
    }

    /// Write `response` under `key`, then evict oldest entries over budget.
    ///
    /// A key that is already present is refreshed and becomes the newest
    /// entry. The newest entry is never evicted by its own store call, so one
    /// oversize entry may sit above budget until the next store.
    ///
    /// New blobs are staged next to the live ones and only moved into place
    /// once the manifest has been persisted.
    ///
    /// # Errors
    ///
    /// - `CapacityExceeded` when the budget is zero
    /// - `Io` when a blob or the manifest cannot be written; the store keeps
    ///   its previous entries, including the one being refreshed
    pub fn store(&self, key: &CacheEntryKey, response: &CachedResponse) -> Result<(), Error> {
        let blobs = self.format.encode(key, response)?;
        let size: u64 = blobs.iter().map(|(_, bytes)| bytes.len() as u64).sum();

        if self.max_cache_size == 0 {
            return Err(Error::CapacityExceeded { size, max: self.max_cache_size });
        }

        let mut manifest = self.write_manifest();
        let previous = manifest.clone();

        let staged = self.stage(key, &blobs)?;

        if manifest.contains(key) {
            let old_size = self.recorded_size(&manifest, key);
            manifest.remove(key);
            manifest.total_size = manifest.total_size.saturating_sub(old_size);
        }
        manifest.push(key.clone(), size);

        let mut evicted = Vec::new();
        while manifest.total_size > self.max_cache_size && manifest.ordered_keys.len() > 1 {
            let oldest = manifest.ordered_keys[0].clone();
            let oldest_size = self.recorded_size(&manifest, &oldest);
            manifest.remove(&oldest);
            manifest.total_size = manifest.total_size.saturating_sub(oldest_size);
            evicted.push(oldest);
        }

        if let Err(e) = manifest.save(self.blobs.as_ref()) {
            tracing::warn!(key = %key, error = %e, "failed to persist manifest; rolling back store");
            *manifest = previous;
            self.discard(&staged);
            return Err(e);
        }

        if let Err((installed, e)) = self.install(&staged) {
            tracing::warn!(key = %key, error = %e, installed, "failed to move cache entry into place");
            *manifest = previous;
            if installed == 0 {
                if let Err(e) = manifest.save(self.blobs.as_ref()) {
                    tracing::warn!(key = %key, error = %e, "failed to restore manifest");
                }
            } else {
                self.remove_entry_files(key);
                self.forget(&mut manifest, key);
            }
            return Err(e);
        }

        for format in ArchiveFormat::ALL.into_iter().filter(|f| *f != self.format) {
            for name in format.blob_names(key) {
                if let Err(e) = self.blobs.remove(&name) {
                    tracing::warn!(blob = %name, error = %e, "failed to remove stale entry layout");
                }
            }
        }

        for evicted_key in &evicted {
            tracing::debug!(key = %evicted_key, "evicted cache entry");
            self.remove_entry_files(evicted_key);
        }

        tracing::debug!(
            key = %key,
            size,
            current_size = manifest.total_size,
            evicted = evicted.len(),
            "stored cache entry"
        );
        Ok(())
    }

    /// Read the entry for `key`.
    ///
    /// Missing and corrupt entries are both a miss.
    pub fn retrieve(&self, key: &CacheEntryKey) -> Option<CachedResponse> {
        let manifest = self.read_manifest();
        if !manifest.contains(key) {
            return None;
        }

        let format = ArchiveFormat::detect(key, self.blobs.as_ref())?;
        match format.decode(key, self.blobs.as_ref()) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(key = %key, ?format, error = %e, "unreadable cache entry treated as miss");
                None
            }
        }
    }

    pub fn contains(&self, key: &CacheEntryKey) -> bool {
        self.read_manifest().contains(key)
    }

    /// Delete every entry and reset the manifest.
    ///
    /// Per-file deletion failures are logged and skipped; only a failure to
    /// persist the empty manifest is returned.
    pub fn clear(&self) -> Result<(), Error> {
        let mut manifest = self.write_manifest();
        for key in &manifest.ordered_keys {
            self.remove_entry_files(key);
        }
        let cleared = manifest.ordered_keys.len();
        *manifest = StoreManifest::default();
        manifest.save(self.blobs.as_ref())?;

        tracing::info!(cleared, "cleared offline store");
        Ok(())
    }

    /// Bytes currently accounted to stored entries.
    pub fn current_size(&self) -> u64 {
        self.read_manifest().total_size
    }

    /// Entry keys, oldest first.
    pub fn ordered_keys(&self) -> Vec<CacheEntryKey> {
        self.read_manifest().ordered_keys.clone()
    }

    pub fn len(&self) -> usize {
        self.read_manifest().ordered_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_cache_size(&self) -> u64 {
        self.max_cache_size
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Size the manifest recorded for `key`.
    ///
    /// Manifests written before sizes were recorded fall back to the files.
    fn recorded_size(&self, manifest: &StoreManifest, key: &CacheEntryKey) -> u64 {
        manifest.size_of(key).unwrap_or_else(|| self.entry_size(key))
    }

    /// On-disk size of an entry in whichever layout it uses.
    fn entry_size(&self, key: &CacheEntryKey) -> u64 {
        ArchiveFormat::ALL
            .into_iter()
            .flat_map(|format| format.blob_names(key))
            .map(|name| match self.blobs.size(&name) {
                Ok(size) => size.unwrap_or(0),
                Err(e) => {
                    tracing::warn!(blob = %name, error = %e, "failed to stat cache entry");
                    0
                }
            })
            .sum()
    }

    /// Write `blobs` under staging names, returning `(staged, live)` pairs.
    fn stage(&self, key: &CacheEntryKey, blobs: &[(String, Vec<u8>)]) -> Result<Vec<(String, String)>, Error> {
        let mut staged = Vec::with_capacity(blobs.len());
        for (name, bytes) in blobs {
            let staging = format!("{name}{STAGING_SUFFIX}");
            if let Err(e) = self.blobs.write(&staging, bytes) {
                tracing::warn!(key = %key, blob = %name, error = %e, "failed to write cache entry");
                self.discard(&staged);
                self.discard(&[(staging, name.clone())]);
                return Err(e);
            }
            staged.push((staging, name.clone()));
        }
        Ok(staged)
    }

    /// Move staged blobs over the live names.
    ///
    /// On failure, reports how many were already moved; the rest are removed.
    fn install(&self, staged: &[(String, String)]) -> Result<(), (usize, Error)> {
        for (installed, (staging, name)) in staged.iter().enumerate() {
            if let Err(e) = self.blobs.rename(staging, name) {
                self.discard(&staged[installed..]);
                return Err((installed, e));
            }
        }
        Ok(())
    }

    fn discard(&self, staged: &[(String, String)]) {
        for (staging, _) in staged {
            if let Err(e) = self.blobs.remove(staging) {
                tracing::warn!(blob = %staging, error = %e, "failed to remove staged blob");
            }
        }
    }

    fn remove_entry_files(&self, key: &CacheEntryKey) {
        let names = ArchiveFormat::ALL.into_iter().flat_map(|format| format.blob_names(key));
        for name in names.flat_map(|name| [format!("{name}{STAGING_SUFFIX}"), name]) {
            if let Err(e) = self.blobs.remove(&name) {
                tracing::warn!(blob = %name, error = %e, "failed to remove cache entry file");
            }
        }
    }

    /// Drop a key whose files are gone and persist the result, best effort.
    fn forget(&self, manifest: &mut StoreManifest, key: &CacheEntryKey) {
        let size = self.recorded_size(manifest, key);
        if manifest.remove(key) {
            manifest.total_size = manifest.total_size.saturating_sub(size);
            if let Err(e) = manifest.save(self.blobs.as_ref()) {
                tracing::warn!(key = %key, error = %e, "failed to persist manifest after dropping entry");
            }
        }
    }

    fn read_manifest(&self) -> RwLockReadGuard<'_, StoreManifest> {
        self.manifest.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_manifest(&self) -> RwLockWriteGuard<'_, StoreManifest> {
        self.manifest.write().unwrap_or_else(PoisonError::into_inner)
    }
}
