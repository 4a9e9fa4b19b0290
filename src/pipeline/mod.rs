//! Transform pipelines.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s run strictly one after
//! another over a single [`AssetGraph`]. A stage may do concurrent work
//! internally, but it has settled before the next stage starts.
//!
//! # Architecture
//!
//! ```text
//! GraphConfig.pipeline ──> TransformRegistry::build ──> Box<dyn Stage>
//!                                                            │
//!   AssetGraph ──> stage 0 ──> stage 1 ──> ... ──> AssetGraph
//!                     │ error
//!                     └──> PipelineError { graph as before the stage }
//! ```
//!
//! - `registry`: name → stage factory lookup
//! - `transform`: built-in stages

mod registry;
pub mod transform;

#[cfg(test)]
mod tests;

pub use registry::{StageArgs, StageFactory, TransformRegistry};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{ConfigError, GraphConfig};
use crate::error::{AssetError, Result};
use crate::graph::{AssetGraph, CancelFlag};

// =============================================================================
// Stage
// =============================================================================

/// One named unit of work over the graph.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, graph: &mut AssetGraph) -> Result<()>;
}

// =============================================================================
// Pipeline
// =============================================================================

/// A stage failed. Carries the graph as it was before that stage ran.
#[derive(Debug, Error)]
#[error("pipeline stage {index} `{stage}` failed")]
pub struct PipelineError {
    pub stage: String,
    pub index: usize,
    #[source]
    pub source: AssetError,
    pub graph: Box<AssetGraph>,
}

impl PipelineError {
    /// The last successfully settled graph.
    pub fn into_graph(self) -> AssetGraph {
        *self.graph
    }
}

/// Ordered sequence of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    cancel: Option<CancelFlag>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Stop between stages, and inside stages that watch the graph's flag,
    /// once `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn push(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Build the `[[pipeline]]` stages of a config through a registry.
    pub fn from_config(config: &GraphConfig, registry: &TransformRegistry) -> std::result::Result<Self, ConfigError> {
        let mut pipeline = Self::new();
        for stage in &config.pipeline {
            pipeline.push(registry.build(&stage.transform, &stage.args)?);
        }
        Ok(pipeline)
    }

    /// Run every stage in order.
    ///
    /// The first failure stops the run; later stages never see a
    /// half-applied graph. Cancellation is a failure of the stage it
    /// interrupts, or of the next stage when set in between.
    pub async fn run(&self, mut graph: AssetGraph) -> std::result::Result<AssetGraph, PipelineError> {
        if let Some(cancel) = &self.cancel {
            graph = graph.with_cancel(cancel.clone());
        }

        for (index, stage) in self.stages.iter().enumerate() {
            let snapshot = graph.clone();
            debug!("pipeline"; "[{}] {}", index, stage.name());

            let applied = match graph.check_cancelled(stage.name()) {
                Ok(()) => stage.apply(&mut graph).await,
                Err(cancelled) => Err(cancelled),
            };
            if let Err(source) = applied {
                log!("error"; "{} failed: {}", stage.name(), source);
                return Err(PipelineError {
                    stage: stage.name().to_string(),
                    index,
                    source,
                    graph: Box::new(snapshot),
                });
            }
        }
        log!("pipeline"; "{} stages done, {} assets", self.stages.len(), graph.asset_count());
        Ok(graph)
    }
}
