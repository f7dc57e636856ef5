//! Durable record of a bounded store's size and insertion order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::hash::CacheEntryKey;
use super::persist::BlobStore;
use crate::Error;

/// Blob name of the manifest inside a store directory.
pub const MANIFEST_NAME: &str = "manifest.json";

/// Total bytes used and entry keys, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreManifest {
    pub total_size: u64,
    pub ordered_keys: Vec<CacheEntryKey>,
    /// Encoded size of each entry as it was written.
    #[serde(default)]
    pub sizes: BTreeMap<CacheEntryKey, u64>,
}

impl StoreManifest {
    /// Load the manifest, treating a missing one as an empty store.
    ///
    /// A manifest that cannot be read or parsed also yields an empty store.
    pub fn load(blobs: &dyn BlobStore) -> Self {
        let bytes = match blobs.read(MANIFEST_NAME) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read store manifest; starting empty");
                return Self::default();
            }
        };

        match serde_json::from_slice::<Self>(&bytes) {
            Ok(mut manifest) => {
                manifest.dedup();
                manifest
            }
            Err(e) => {
                tracing::warn!(error = %e, "store manifest is corrupt; starting empty");
                Self::default()
            }
        }
    }

    /// Persist the manifest with an atomic replace.
    pub fn save(&self, blobs: &dyn BlobStore) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::InvalidInput(format!("failed to encode manifest: {e}")))?;
        blobs.write(MANIFEST_NAME, &bytes)
    }

    pub fn contains(&self, key: &CacheEntryKey) -> bool {
        self.ordered_keys.contains(key)
    }

    /// Recorded size of `key`, if the manifest has one.
    pub fn size_of(&self, key: &CacheEntryKey) -> Option<u64> {
        self.sizes.get(key).copied()
    }

    /// Append `key` as the newest entry.
    pub fn push(&mut self, key: CacheEntryKey, size: u64) {
        self.ordered_keys.push(key.clone());
        self.sizes.insert(key, size);
        self.total_size += size;
    }

    /// Remove `key`, returning whether it was present.
    ///
    /// The caller subtracts the entry's size from `total_size`.
    pub fn remove(&mut self, key: &CacheEntryKey) -> bool {
        let before = self.ordered_keys.len();
        self.ordered_keys.retain(|k| k != key);
        self.sizes.remove(key);
        self.ordered_keys.len() != before
    }

    /// Keep only the first occurrence of each key and drop sizes of unknown keys.
    fn dedup(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.ordered_keys.retain(|k| seen.insert(k.clone()));
        self.sizes.retain(|k, _| seen.contains(k));
    }
}
