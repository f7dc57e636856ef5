//! Client code for stowaway.
//!
//! This crate provides the HTTP fetch pipeline, sub-resource discovery and
//! the renderers that drive page loads for the offline cache.

pub mod extract;
pub mod fetch;
pub mod render;

pub use extract::extract_subresources;
pub use fetch::{FetchClient, FetchConfig, FetchError};
#[cfg(feature = "headless")]
pub use render::{HeadlessLauncher, HeadlessRenderer};
pub use render::{FetchRenderer, FetchRendererFactory, ReadyState};
