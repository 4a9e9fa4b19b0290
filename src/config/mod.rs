//! Graph configuration management.
//!
//! Handles loading and validating `assetgraph.toml`. Every section has
//! defaults, so an empty file is a valid configuration.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── mod.rs       # GraphConfig (root), loading and validation
//! ├── error.rs     # ConfigError, ConfigDiagnostics
//! └── section/     # [graph], [populate], [images], [minify], [[pipeline]]
//! ```
//!
//! # Example
//!
//! ```toml
//! [graph]
//! root = "public"
//!
//! [populate]
//! concurrency = 4
//!
//! [[pipeline]]
//! transform = "loadAssets"
//! urls = ["style.css"]
//!
//! [[pipeline]]
//! transform = "populate"
//!
//! [[pipeline]]
//! transform = "postProcessCssImages"
//! ```

mod error;
mod section;

pub use error::{ConfigDiagnostic, ConfigDiagnostics, ConfigError};
pub use section::{GraphSection, ImagesSection, MinifySection, PopulateSection, StageConfig};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default config file name.
pub const CONFIG_FILE: &str = "assetgraph.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing `assetgraph.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[serde(default)]
    pub graph: GraphSection,

    #[serde(default)]
    pub populate: PopulateSection,

    #[serde(default)]
    pub images: ImagesSection,

    #[serde(default)]
    pub minify: MinifySection,

    #[serde(default)]
    pub pipeline: Vec<StageConfig>,
}

impl GraphConfig {
    /// Parse configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from a file, warning about unknown fields.
    ///
    /// A relative `graph.root` is resolved against the file's directory.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (mut config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        let path = std::path::absolute(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.graph.root = Some(match config.graph.root.take() {
            Some(root) if root.is_relative() => base.join(root),
            Some(root) => root,
            None => base,
        });
        config.config_path = Some(path);

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring: {}", display_path, fields.join(", "));
    }

    /// Graph root directory, if one is configured or implied by the file.
    pub fn root_dir(&self) -> Option<&Path> {
        self.graph.root.as_deref()
    }

    /// Apply process-wide settings (currently verbosity).
    pub fn apply_logging(&self) {
        if self.graph.verbose {
            crate::logger::set_verbose(true);
        }
    }

    /// Validate every section.
    ///
    /// Collects all validation errors and returns them at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();

        if let Some(root) = self.root_dir()
            && self.config_path.is_some()
            && !root.is_dir()
        {
            diag.error("graph.root", format!("`{}` is not a directory", root.display()));
        }

        self.populate.validate(&mut diag);
        self.images.validate(&mut diag);
        for (index, stage) in self.pipeline.iter().enumerate() {
            stage.validate(index, &mut diag);
        }

        diag.into_result()
    }
}

// ============================================================================
// tests
// ============================================================================
