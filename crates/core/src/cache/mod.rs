//! Bounded offline storage and the router in front of it.
//!
//! This module provides the durable half of the offline cache:
//!
//! - Fingerprinting of canonical URLs into SHA-256 storage keys
//! - Versioned archive encodings (single blob and split layouts)
//! - A size-capped store with FIFO eviction and an atomically persisted manifest
//! - A router arbitrating between the offline store and a standard cache

pub mod archive;
pub mod canonical;
pub mod hash;
pub mod manifest;
pub mod persist;
pub mod request;
pub mod router;
pub mod standard;
pub mod store;

pub use crate::Error;

pub use archive::{ArchiveFormat, CachedResponse, ResponseMeta};
pub use canonical::{UrlError, canonicalize};
pub use hash::{CacheEntryKey, Fingerprinter, KeyHasher, Sha256Hasher, key_for};
pub use manifest::StoreManifest;
pub use persist::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use request::CacheRequest;
pub use router::{CacheRouter, Routed};
pub use standard::{MemoryCache, StandardCache};
pub use store::BoundedDiskStore;
