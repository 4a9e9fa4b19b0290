//! `minifyAssets`: shrink CSS and JavaScript in place.

use async_trait::async_trait;
use serde::Deserialize;

use super::scope;
use crate::asset::AssetId;
use crate::asset::minify::minify;
use crate::config::ConfigError;
use crate::error::{Result, TransformError};
use crate::graph::AssetGraph;
use crate::pipeline::registry::parse_args;
use crate::pipeline::{Stage, StageArgs};
use crate::query::{AssetQuery, QuerySpec};

const NAME: &str = "minifyAssets";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Args {
    query: Option<QuerySpec>,
}

/// Minifies every loaded asset in scope that has a minifier and is enabled
/// in `[minify]`. Inline assets are minified too and written back into
/// their container on serialization.
#[derive(Debug, Clone, Default)]
pub struct MinifyAssets {
    query: AssetQuery,
}

impl MinifyAssets {
    pub const NAME: &'static str = NAME;

    pub fn new(query: AssetQuery) -> Self {
        Self { query }
    }

    pub fn from_args(args: &StageArgs) -> std::result::Result<Self, ConfigError> {
        let args: Args = parse_args(NAME, args)?;
        Ok(Self::new(scope(NAME, args.query.as_ref())?))
    }
}

#[async_trait]
impl Stage for MinifyAssets {
    fn name(&self) -> &str {
        NAME
    }

    async fn apply(&self, graph: &mut AssetGraph) -> Result<()> {
        let section = graph.config().minify.clone();
        let targets: Vec<AssetId> = graph
            .find_assets(&self.query)
            .into_iter()
            .filter(|a| a.is_loaded() && section.enabled_for(a.asset_type))
            .map(|a| a.id)
            .collect();

        let mut saved = 0usize;
        for id in targets {
            let Some(asset_type) = graph.asset(id).map(|a| a.asset_type) else {
                continue;
            };
            let text = graph.text(id)?;
            let Some(result) = minify(asset_type, &text) else {
                continue;
            };
            let url = graph.asset(id).map(|a| a.url.to_string()).unwrap_or_default();
            let minified = result.map_err(|e| TransformError::new(NAME, format!("{url}: {e}")))?;
            if minified.len() < text.len() {
                saved += text.len() - minified.len();
                graph.replace_raw(id, minified.into_bytes())?;
            }
        }
        debug!("minify"; "saved {} bytes", saved);
        Ok(())
    }
}
