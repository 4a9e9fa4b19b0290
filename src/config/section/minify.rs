//! `[minify]` section configuration.
//!
//! ```toml
//! [minify]
//! css = true
//! js = true
//! ```

use serde::{Deserialize, Serialize};

use crate::asset::AssetType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinifySection {
    pub css: bool,
    pub js: bool,
}

impl Default for MinifySection {
    fn default() -> Self {
        Self { css: true, js: true }
    }
}

impl MinifySection {
    pub fn enabled_for(&self, asset_type: AssetType) -> bool {
        match asset_type {
            AssetType::Css => self.css,
            AssetType::JavaScript => self.js,
            _ => false,
        }
    }
}
