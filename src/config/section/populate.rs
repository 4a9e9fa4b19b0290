//! `[populate]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [populate]
//! concurrency = 8                     # Max in-flight fetches
//! follow = ["HtmlScript", "CssImage"] # Relation types to follow (default: all)
//! best_effort = ["HtmlAnchor"]        # Targets whose failures become warnings
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;
use crate::relation::RelationType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulateSection {
    pub concurrency: usize,

    /// `None` follows every relation type.
    pub follow: Option<Vec<RelationType>>,

    /// Relation types whose targets are optional.
    pub best_effort: Vec<RelationType>,
}

impl Default for PopulateSection {
    fn default() -> Self {
        Self {
            concurrency: 8,
            follow: None,
            best_effort: vec![RelationType::HtmlAnchor],
        }
    }
}

impl PopulateSection {
    pub fn is_best_effort(&self, relation_type: RelationType) -> bool {
        self.best_effort.contains(&relation_type)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.concurrency == 0 {
            diag.error("populate.concurrency", "must be greater than 0");
        }
        if let Some(follow) = &self.follow
            && follow.is_empty()
        {
            diag.error("populate.follow", "empty list follows nothing; remove it to follow all");
        }
    }
}
