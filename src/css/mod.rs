//! Stylesheets: parsing, serialization and relation discovery.
//!
//! Parsing and printing are lightningcss; [`Stylesheet`] adds rule and
//! declaration ids that survive edits.

mod sheet;
mod visit;

pub use sheet::{Declaration, DeclarationId, Import, RuleId, Stylesheet};
pub use visit::url_value;

use crate::asset::{AssetProvider, AssetType, ParseTree, Probe};
use crate::error::{AssetError, Result};
use crate::relation::{Discovered, RelationType};

/// Provider for `Css` assets.
#[derive(Debug, Default)]
pub struct CssProvider;

impl AssetProvider for CssProvider {
    fn name(&self) -> &'static str {
        "css"
    }

    fn can_parse(&self, probe: &Probe<'_>) -> bool {
        probe.declared == AssetType::Css
    }

    fn asset_type(&self, _probe: &Probe<'_>) -> AssetType {
        AssetType::Css
    }

    fn parse(&self, probe: &Probe<'_>) -> Result<ParseTree> {
        let text = std::str::from_utf8(probe.bytes)
            .map_err(|e| AssetError::parse(probe.url, AssetType::Css, e.to_string()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        parse_stylesheet(text)
            .map(ParseTree::Css)
            .map_err(|e| AssetError::parse(probe.url, AssetType::Css, e))
    }

    fn discover(&self, tree: &ParseTree) -> Vec<Discovered> {
        match tree {
            ParseTree::Css(sheet) => discover(sheet),
            _ => Vec::new(),
        }
    }
}

pub fn parse_stylesheet(text: &str) -> std::result::Result<Stylesheet, String> {
    Stylesheet::parse(text)
}

pub fn to_css(sheet: &Stylesheet) -> String {
    sheet.code().to_string()
}

/// Outgoing references of a stylesheet. Imports come first, as CSS
/// requires them to.
pub fn discover(sheet: &Stylesheet) -> Vec<Discovered> {
    let mut found: Vec<Discovered> = sheet
        .imports()
        .iter()
        .filter(|import| !import.href.trim().is_empty())
        .map(|import| Discovered::css_import(import.rule, import.href.clone()))
        .collect();

    for decl in sheet.declarations() {
        let relation_type = if decl.font_face && decl.property == "src" {
            RelationType::CssFontFaceSrc
        } else {
            RelationType::CssImage
        };
        for (index, href) in decl.urls.iter().enumerate() {
            if href.trim().is_empty() {
                continue;
            }
            found.push(Discovered::css_url(relation_type, decl.rule, decl.id, index, href.clone()));
        }
    }

    found
}

/// Rewrite the `index`-th `url()` of a declaration.
pub(crate) fn write_url(
    sheet: &mut Stylesheet,
    rule: RuleId,
    declaration: DeclarationId,
    index: usize,
    href: &str,
) -> bool {
    sheet.set_url(rule, declaration, index, href).is_ok()
}

/// Rewrite the href of an `@import` rule.
pub(crate) fn write_import(sheet: &mut Stylesheet, rule: RuleId, href: &str) -> bool {
    sheet.set_import(rule, href).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AssetUrl;
    use crate::relation::Locator;

    const STYLE: &str = "@import url(base.css);\n\
        .header { background-image: url(gradient.png); -asset-image-postprocess: quantize(4); }\n\
        .footer { background-image: url('noise.png'); }\n\
        @font-face { font-family: Icons; src: url(icons.woff2) format(\"woff2\"); }";

    #[test]
    fn test_discover_css_relations() {
        let sheet = parse_stylesheet(STYLE).unwrap();
        let found = discover(&sheet);

        let summary: Vec<(RelationType, &str)> = found
            .iter()
            .map(|d| (d.relation_type, d.href.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(
            summary,
            [
                (RelationType::CssImport, "base.css"),
                (RelationType::CssImage, "gradient.png"),
                (RelationType::CssImage, "noise.png"),
                (RelationType::CssFontFaceSrc, "icons.woff2"),
            ]
        );

        let rules: Vec<_> = found.iter().map(|d| d.locator.css_rule()).collect();
        assert_ne!(rules[1], rules[2]);
        assert!(matches!(found[1].locator, Locator::CssUrl { index: 0, .. }));
    }

    #[test]
    fn test_discover_nested_rules() {
        let sheet = parse_stylesheet(
            ".a { color: red; &:hover { background-image: url(a.png); } }\n\
             @media (min-width: 600px) { .b { background: url(b.png); } }",
        )
        .unwrap();
        let hrefs: Vec<_> = discover(&sheet).into_iter().filter_map(|d| d.href).collect();
        assert_eq!(hrefs, ["a.png", "b.png"]);
    }

    #[test]
    fn test_provider_rejects_broken_css() {
        let url = AssetUrl::parse("file:///site/broken.css").unwrap();
        let probe = Probe {
            url: &url,
            declared: AssetType::Css,
            bytes: b"..a { color: red; }",
        };
        let err = CssProvider.parse(&probe).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_write_import() {
        let mut sheet = parse_stylesheet("@import \"a.css\" screen;").unwrap();
        let rule = sheet.imports()[0].rule;
        assert!(write_import(&mut sheet, rule, "b.css"));
        assert!(to_css(&sheet).starts_with("@import \"b.css\" screen;"));
    }
}
