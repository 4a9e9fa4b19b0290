//! `[graph]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [graph]
//! root = "public"     # Directory root-relative hrefs resolve against
//! verbose = false     # Print debug output
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    /// Graph root. Relative paths are resolved against the config file's
    /// directory; when unset the config file's directory is the root.
    pub root: Option<PathBuf>,

    pub verbose: bool,
}
