//! JavaScript assets and conditional block evaluation.

mod eval;
mod host;

pub use eval::{Child, DomHost, Value, run_script};
pub use host::HtmlDomHost;

use oxc::allocator::Allocator;
use oxc::parser::Parser;
use oxc::span::SourceType;
use regex::Regex;

use crate::asset::{AssetProvider, AssetType, ParseTree, Probe};
use crate::error::{AssetError, Result};

/// A JavaScript source that has passed a syntax check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub text: String,
}

impl Script {
    /// Check the source with oxc before accepting it.
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, text, SourceType::mjs()).parse();
        match ret.errors.first() {
            Some(err) => Err(err.to_string()),
            None => Ok(Self {
                text: text.to_string(),
            }),
        }
    }

    /// Whether the source refers to `name` as a whole identifier.
    pub fn mentions(&self, name: &str) -> bool {
        Regex::new(&format!(r"\b{}\b", regex::escape(name)))
            .map(|re| re.is_match(&self.text))
            .unwrap_or(false)
    }
}

/// Provider for `JavaScript` assets.
#[derive(Debug, Default)]
pub struct JsProvider;

impl AssetProvider for JsProvider {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn can_parse(&self, probe: &Probe<'_>) -> bool {
        probe.declared == AssetType::JavaScript
    }

    fn asset_type(&self, _probe: &Probe<'_>) -> AssetType {
        AssetType::JavaScript
    }

    fn parse(&self, probe: &Probe<'_>) -> Result<ParseTree> {
        let text = std::str::from_utf8(probe.bytes)
            .map_err(|e| AssetError::parse(probe.url, AssetType::JavaScript, e.to_string()))?;
        Script::parse(text)
            .map(ParseTree::JavaScript)
            .map_err(|e| AssetError::parse(probe.url, AssetType::JavaScript, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_syntax_errors() {
        assert!(Script::parse("const a = 1;").is_ok());
        assert!(Script::parse("const = ;").is_err());
    }

    #[test]
    fn test_mentions_whole_identifier() {
        let script = Script::parse("if (theEnvironment) { x(); }").unwrap();
        assert!(script.mentions("theEnvironment"));
        assert!(!script.mentions("theEnv"));
        assert!(!script.mentions("Environment"));
    }
}
