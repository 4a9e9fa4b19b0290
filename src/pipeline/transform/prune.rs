//! `removeUnreferencedAssets`: drop assets nothing points at.

use async_trait::async_trait;
use serde::Deserialize;

use super::scope;
use crate::asset::AssetId;
use crate::config::ConfigError;
use crate::error::Result;
use crate::graph::AssetGraph;
use crate::pipeline::registry::parse_args;
use crate::pipeline::{Stage, StageArgs};
use crate::query::{AssetQuery, QuerySpec};

const NAME: &str = "removeUnreferencedAssets";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Args {
    query: Option<QuerySpec>,
}

/// Removes non-root assets in scope with no incoming relations.
///
/// Removal can orphan further assets, so it repeats until nothing changes.
#[derive(Debug, Clone, Default)]
pub struct RemoveUnreferencedAssets {
    query: AssetQuery,
}

impl RemoveUnreferencedAssets {
    pub const NAME: &'static str = NAME;

    pub fn new(query: AssetQuery) -> Self {
        Self { query }
    }

    pub fn from_args(args: &StageArgs) -> std::result::Result<Self, ConfigError> {
        let args: Args = parse_args(NAME, args)?;
        Ok(Self::new(scope(NAME, args.query.as_ref())?))
    }

    fn unreferenced(&self, graph: &AssetGraph) -> Vec<AssetId> {
        let roots = graph.roots();
        graph
            .find_assets(&self.query)
            .into_iter()
            .filter(|a| a.incoming().is_empty() && !roots.contains(&a.id))
            .map(|a| a.id)
            .collect()
    }
}

#[async_trait]
impl Stage for RemoveUnreferencedAssets {
    fn name(&self) -> &str {
        NAME
    }

    async fn apply(&self, graph: &mut AssetGraph) -> Result<()> {
        let mut removed = 0;
        loop {
            let orphans = self.unreferenced(graph);
            if orphans.is_empty() {
                break;
            }
            for id in orphans {
                if let Some(asset) = graph.remove_asset(id) {
                    debug!("prune"; "removed {}", asset.url.display_relative(graph.root()));
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            log!("prune"; "removed {} unreferenced asset(s)", removed);
        }
        Ok(())
    }
}
