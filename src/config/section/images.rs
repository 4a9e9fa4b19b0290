//! `[images]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [images]
//! directive = "-asset-image-postprocess"  # CSS property listing image operations
//! keep_directive = false                  # Leave the directive in the output CSS
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesSection {
    pub directive: String,
    pub keep_directive: bool,
}

impl Default for ImagesSection {
    fn default() -> Self {
        Self {
            directive: "-asset-image-postprocess".to_string(),
            keep_directive: false,
        }
    }
}

impl ImagesSection {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        let valid = self
            .directive
            .chars()
            .next()
            .is_some_and(|c| c == '-' || c.is_ascii_alphabetic())
            && self
                .directive
                .chars()
                .all(|c| c == '-' || c == '_' || c.is_ascii_alphanumeric());
        if !valid {
            diag.error(
                "images.directive",
                format!("`{}` is not a CSS property name", self.directive),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_validation() {
        let mut diag = ConfigDiagnostics::new();
        ImagesSection::default().validate(&mut diag);
        assert!(diag.is_empty());

        let section = ImagesSection {
            directive: "1bad name".into(),
            keep_directive: false,
        };
        section.validate(&mut diag);
        assert_eq!(diag.errors().len(), 1);
    }
}
