//! assetgraph - a web asset dependency graph.
//!
//! Assets (HTML, CSS, JavaScript, JSON, SVG, raster images) are loaded into
//! an [`AssetGraph`], parsed by pluggable providers, and linked by typed
//! relations discovered in their parse trees. Population follows relations
//! until no unloaded targets remain, and transform [`Pipeline`]s rewrite the
//! graph in place.
//!
//! ```ignore
//! let graph = AssetGraph::from_dir(Path::new("site"))?;
//! let graph = Pipeline::new()
//!     .stage(LoadAssets::new(["style.css"]))
//!     .stage(PopulateStage::new())
//!     .stage(PostProcessCssImages::new())
//!     .run(graph)
//!     .await?;
//! ```

#[macro_use]
mod logger;

pub mod asset;
pub mod config;
pub mod core;
pub mod css;
pub mod error;
pub mod graph;
pub mod html;
pub mod image;
pub mod js;
pub mod pipeline;
pub mod query;
pub mod relation;
pub mod utils;

pub use asset::{Asset, AssetId, AssetType, LoadState};
pub use config::{ConfigError, GraphConfig};
pub use error::{AssetError, Result, TransformError};
pub use graph::{AssetGraph, CancelFlag, GraphState, PopulateOptions, Position};
pub use logger::{set_quiet, set_verbose};
pub use pipeline::transform::{
    LoadAssets, MinifyAssets, PopulateStage, PostProcessCssImages, RemoveUnreferencedAssets,
    RunJavaScriptConditionalBlocks,
};
pub use pipeline::{Pipeline, PipelineError, Stage, TransformRegistry};
pub use query::{AssetQuery, QuerySpec, RelationQuery};
pub use relation::{Relation, RelationId, RelationType};
