//! What a loaded document pulls in.

mod resources;

pub use resources::extract_subresources;
