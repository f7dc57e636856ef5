//! Offline store MCP tools.

pub mod clear;
pub mod get;
pub mod status;

pub use clear::clear_impl;
pub use get::{OfflineGetParams, get_impl};
pub use status::status_impl;
