//! MCP tool implementations.
//!
//! This module contains all tools exposed by the stowaway server.

pub mod cache_page;
pub mod offline;

pub use cache_page::{CachePageParams, cache_page_impl};
