//! Built-in stages.
//!
//! Each stage is configured from a `[[pipeline]]` table and acts on the
//! assets its `query` selects (all assets when absent).
//!
//! # Modules
//!
//! - `load`: `loadAssets`, adds root assets by URL
//! - `populate`: `populate`, follows relations to a fixed point
//! - `css_images`: `postProcessCssImages`, derives processed background images
//! - `conditional`: `runJavaScriptConditionalBlocks`, applies inline script output
//! - `minify`: `minifyAssets`, shrinks CSS and JavaScript
//! - `prune`: `removeUnreferencedAssets`, drops assets nothing points at

mod conditional;
mod css_images;
mod load;
mod minify;
mod populate;
mod prune;

pub use conditional::RunJavaScriptConditionalBlocks;
pub use css_images::PostProcessCssImages;
pub use load::LoadAssets;
pub use minify::MinifyAssets;
pub use populate::PopulateStage;
pub use prune::RemoveUnreferencedAssets;

use crate::config::ConfigError;
use crate::query::{AssetQuery, QuerySpec};

/// Compile an optional query argument.
fn scope(transform: &str, query: Option<&QuerySpec>) -> Result<AssetQuery, ConfigError> {
    match query {
        Some(query) => query
            .to_query()
            .map_err(|e| ConfigError::args(transform, format!("invalid url_pattern: {e}"))),
        None => Ok(AssetQuery::All),
    }
}
