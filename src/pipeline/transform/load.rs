//! `loadAssets`: add root assets.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::error::Result;
use crate::graph::AssetGraph;
use crate::pipeline::registry::parse_args;
use crate::pipeline::{Stage, StageArgs};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Args {
    urls: Vec<String>,
}

/// Loads each location as a root asset.
///
/// Locations are URLs, absolute paths, or paths relative to the graph root.
#[derive(Debug, Clone)]
pub struct LoadAssets {
    urls: Vec<String>,
}

impl LoadAssets {
    pub const NAME: &'static str = "loadAssets";

    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_args(args: &StageArgs) -> std::result::Result<Self, ConfigError> {
        let args: Args = parse_args(Self::NAME, args)?;
        if args.urls.is_empty() {
            return Err(ConfigError::args(Self::NAME, "`urls` is empty"));
        }
        Ok(Self::new(args.urls))
    }
}

#[async_trait]
impl Stage for LoadAssets {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn apply(&self, graph: &mut AssetGraph) -> Result<()> {
        let urls: Vec<&str> = self.urls.iter().map(String::as_str).collect();
        let ids = graph.load_assets(&urls).await?;
        debug!("load"; "{} root assets", ids.len());
        Ok(())
    }
}
