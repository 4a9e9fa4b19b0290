//! Name → stage factory registry.
//!
//! Built once at startup and handed to [`Pipeline::from_config`](super::Pipeline::from_config).

use std::fmt;

use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;

use super::Stage;
use super::transform::{
    LoadAssets, MinifyAssets, PopulateStage, PostProcessCssImages, RemoveUnreferencedAssets,
    RunJavaScriptConditionalBlocks,
};
use crate::config::ConfigError;

/// Arguments of one `[[pipeline]]` entry, without the `transform` key.
pub type StageArgs = toml::Table;

pub type StageFactory =
    Box<dyn Fn(&StageArgs) -> Result<Box<dyn Stage>, ConfigError> + Send + Sync>;

#[derive(Default)]
pub struct TransformRegistry {
    factories: FxHashMap<String, StageFactory>,
    /// Registration order, for listing.
    names: Vec<String>,
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.names).finish()
    }
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in transform.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(LoadAssets::NAME, |args| Ok(Box::new(LoadAssets::from_args(args)?)));
        registry.register(PopulateStage::NAME, |args| Ok(Box::new(PopulateStage::from_args(args)?)));
        registry.register(PostProcessCssImages::NAME, |args| {
            Ok(Box::new(PostProcessCssImages::from_args(args)?))
        });
        registry.register(RunJavaScriptConditionalBlocks::NAME, |args| {
            Ok(Box::new(RunJavaScriptConditionalBlocks::from_args(args)?))
        });
        registry.register(MinifyAssets::NAME, |args| Ok(Box::new(MinifyAssets::from_args(args)?)));
        registry.register(RemoveUnreferencedAssets::NAME, |args| {
            Ok(Box::new(RemoveUnreferencedAssets::from_args(args)?))
        });
        registry
    }

    /// Register a factory. A later registration replaces an earlier one.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&StageArgs) -> Result<Box<dyn Stage>, ConfigError> + Send + Sync + 'static,
    {
        if self.factories.insert(name.to_string(), Box::new(factory)).is_none() {
            self.names.push(name.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn build(&self, name: &str, args: &StageArgs) -> Result<Box<dyn Stage>, ConfigError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTransform(name.to_string()))?;
        factory(args)
    }
}

/// Deserialize stage arguments into a typed struct.
pub(crate) fn parse_args<T: DeserializeOwned>(transform: &str, args: &StageArgs) -> Result<T, ConfigError> {
    toml::Value::Table(args.clone())
        .try_into()
        .map_err(|e| ConfigError::args(transform, e))
}
