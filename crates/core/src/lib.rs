//! Core types and shared functionality for stowaway.
//!
//! This crate provides:
//! - A size-capped offline store with FIFO eviction
//! - A router composing it with a standard cache
//! - Whole-page prefetching over a pluggable renderer
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod offline;
pub mod prefetch;

pub use cache::{BoundedDiskStore, CacheRequest, CacheRouter, CachedResponse};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use offline::{OfflineCache, StoreStatus};
pub use prefetch::{CacheTask, LoadedPredicate, PageCacheUnit, PrefetchCoordinator, ReadyStateProbe, ScriptProbe};
