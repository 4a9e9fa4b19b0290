//! `populate`: follow relations from the loaded assets.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::error::Result;
use crate::graph::{AssetGraph, CancelFlag, PopulateOptions};
use crate::pipeline::registry::parse_args;
use crate::pipeline::{Stage, StageArgs};
use crate::relation::RelationType;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Args {
    follow: Option<Vec<RelationType>>,
    concurrency: Option<usize>,
}

/// Population as a pipeline stage.
///
/// Unset arguments fall back to the graph's `[populate]` section. Without
/// an explicit flag, population watches the graph's cancel flag.
#[derive(Debug, Clone, Default)]
pub struct PopulateStage {
    follow: Option<Vec<RelationType>>,
    concurrency: Option<usize>,
    cancel: Option<CancelFlag>,
}

impl PopulateStage {
    pub const NAME: &'static str = "populate";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow(mut self, types: impl IntoIterator<Item = RelationType>) -> Self {
        self.follow = Some(types.into_iter().collect());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn from_args(args: &StageArgs) -> std::result::Result<Self, ConfigError> {
        let args: Args = parse_args(Self::NAME, args)?;
        if args.concurrency == Some(0) {
            return Err(ConfigError::args(Self::NAME, "`concurrency` must be at least 1"));
        }
        Ok(Self {
            follow: args.follow,
            concurrency: args.concurrency,
            cancel: None,
        })
    }

    fn options(&self, graph: &AssetGraph) -> PopulateOptions {
        let mut options = PopulateOptions::from_config(&graph.config().populate);
        if let Some(types) = &self.follow {
            options = options.follow(types.iter().copied());
        }
        if let Some(n) = self.concurrency {
            options = options.concurrency(n);
        }
        let cancel = self.cancel.as_ref().unwrap_or(graph.cancel_flag());
        options.with_cancel(cancel.clone())
    }
}

#[async_trait]
impl Stage for PopulateStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn apply(&self, graph: &mut AssetGraph) -> Result<()> {
        let options = self.options(graph);
        graph.populate(&options).await
    }
}
