//! Core types - pure abstractions shared across the codebase.

mod link;
mod url;

pub use link::{LinkKind, split_suffix};
pub use url::AssetUrl;
