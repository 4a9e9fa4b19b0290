//! `[[pipeline]]` stage configuration.
//!
//! # Example
//!
//! ```toml
//! [[pipeline]]
//! transform = "loadAssets"
//! urls = ["index.html"]
//!
//! [[pipeline]]
//! transform = "runJavaScriptConditionalBlocks"
//! query = { type = "Html" }
//! environment = "theEnvironment"
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

/// One pipeline stage: a registered transform name plus its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub transform: String,

    /// Every other key of the table, handed to the transform factory.
    #[serde(flatten)]
    pub args: toml::Table,
}

impl StageConfig {
    pub fn new(transform: impl Into<String>) -> Self {
        Self {
            transform: transform.into(),
            args: toml::Table::new(),
        }
    }

    pub fn arg(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.args.insert(key.to_string(), value.into());
        self
    }

    pub fn validate(&self, index: usize, diag: &mut ConfigDiagnostics) {
        if self.transform.trim().is_empty() {
            diag.error(format!("pipeline[{index}].transform"), "must not be empty");
        }
    }
}
