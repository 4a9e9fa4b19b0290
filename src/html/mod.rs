//! HTML documents: parsing, serialization and relation discovery.

mod dom;
mod parse;
mod serialize;

pub use dom::{Element, HtmlDocument, Node, NodeId};
pub use parse::{parse_document, parse_fragment};
pub use serialize::{element_to_html, nodes_to_html, to_html};

use crate::asset::{AssetProvider, AssetType, ParseTree, Probe};
use crate::error::{AssetError, Result};
use crate::relation::{Discovered, Locator, RelationType};

/// Script `type` values that hold JavaScript.
const JS_SCRIPT_TYPES: &[&str] = &[
    "",
    "text/javascript",
    "application/javascript",
    "module",
    "text/ecmascript",
];

/// Provider for `Html` assets.
#[derive(Debug, Default)]
pub struct HtmlProvider;

impl AssetProvider for HtmlProvider {
    fn name(&self) -> &'static str {
        "html"
    }

    fn can_parse(&self, probe: &Probe<'_>) -> bool {
        probe.declared == AssetType::Html
    }

    fn asset_type(&self, _probe: &Probe<'_>) -> AssetType {
        AssetType::Html
    }

    fn parse(&self, probe: &Probe<'_>) -> Result<ParseTree> {
        let text = std::str::from_utf8(probe.bytes)
            .map_err(|e| AssetError::parse(probe.url, AssetType::Html, e.to_string()))?;
        parse_document(text)
            .map(ParseTree::Html)
            .map_err(|e| AssetError::parse(probe.url, AssetType::Html, e))
    }

    fn discover(&self, tree: &ParseTree) -> Vec<Discovered> {
        match tree {
            ParseTree::Html(doc) => discover(doc),
            _ => Vec::new(),
        }
    }
}

/// Outgoing references of a document, in document order.
pub fn discover(doc: &HtmlDocument) -> Vec<Discovered> {
    let mut found = Vec::new();

    doc.walk(&mut |elem| match elem.tag.as_str() {
        "script" => {
            if let Some(src) = non_empty_attr(elem, "src") {
                found.push(Discovered::attribute(RelationType::HtmlScript, elem.id, "src", src));
            } else if is_javascript(elem) {
                let body = elem.text_content();
                if !body.trim().is_empty() {
                    found.push(Discovered::inline(
                        RelationType::HtmlScript,
                        elem.id,
                        AssetType::JavaScript,
                        body,
                    ));
                }
            }
        }
        "style" => {
            found.push(Discovered::inline(
                RelationType::HtmlStyle,
                elem.id,
                AssetType::Css,
                elem.text_content(),
            ));
        }
        "link" if elem.has_rel("stylesheet") => {
            if let Some(href) = non_empty_attr(elem, "href") {
                found.push(Discovered::attribute(RelationType::HtmlStylesheet, elem.id, "href", href));
            }
        }
        "img" => {
            if let Some(src) = non_empty_attr(elem, "src") {
                found.push(Discovered::attribute(RelationType::HtmlImage, elem.id, "src", src));
            }
        }
        "a" => {
            if let Some(href) = non_empty_attr(elem, "href") {
                found.push(Discovered::attribute(RelationType::HtmlAnchor, elem.id, "href", href));
            }
        }
        _ => {}
    });

    found
}

fn non_empty_attr<'a>(elem: &'a Element, name: &str) -> Option<&'a str> {
    elem.get_attr(name).map(str::trim).filter(|v| !v.is_empty())
}

fn is_javascript(elem: &Element) -> bool {
    let ty = elem.get_attr("type").unwrap_or("").trim();
    JS_SCRIPT_TYPES.iter().any(|t| t.eq_ignore_ascii_case(ty))
}

/// Write an href into the attribute a locator points at.
pub(crate) fn write_attribute(doc: &mut HtmlDocument, node: NodeId, attr: &str, value: &str) -> bool {
    match doc.element_mut(node) {
        Some(elem) => {
            elem.set_attr(attr, value);
            true
        }
        None => false,
    }
}

/// Replace the body of an inline `<script>`/`<style>` element.
pub(crate) fn write_inline_body(doc: &mut HtmlDocument, node: NodeId, text: &str) -> bool {
    match doc.element_mut(node) {
        Some(elem) => {
            elem.set_text_content(text);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <link rel="stylesheet" href="style.css">
  <link rel="icon" href="favicon.ico">
  <style>body { color: red; }</style>
  <script src="app.js"></script>
</head>
<body>
  <img src="logo.png">
  <a href="about.html">About</a>
  <script>if (theEnvironment) { document.write('<div>Howdy</div>'); }</script>
  <script type="application/ld+json">{"a": 1}</script>
</body>
</html>"#;

    #[test]
    fn test_discover_in_document_order() {
        let doc = parse_document(PAGE).unwrap();
        let kinds: Vec<RelationType> = discover(&doc).iter().map(|d| d.relation_type).collect();

        assert_eq!(
            kinds,
            [
                RelationType::HtmlStylesheet,
                RelationType::HtmlStyle,
                RelationType::HtmlScript,
                RelationType::HtmlImage,
                RelationType::HtmlAnchor,
                RelationType::HtmlScript,
            ]
        );
    }

    #[test]
    fn test_inline_script_content() {
        let doc = parse_document(PAGE).unwrap();
        let found = discover(&doc);
        let inline = found.last().unwrap();

        assert!(inline.href.is_none());
        let (ty, text) = inline.inline.as_ref().unwrap();
        assert_eq!(*ty, AssetType::JavaScript);
        assert!(text.contains("document.write('<div>Howdy</div>')"));
        assert!(matches!(inline.locator, Locator::InlineElement { .. }));
    }

    #[test]
    fn test_write_attribute_through_locator() {
        let mut doc = parse_document(PAGE).unwrap();
        let found = discover(&doc);
        let Locator::Attribute { node, attr } = &found[0].locator else {
            panic!("expected attribute locator");
        };

        assert!(write_attribute(&mut doc, *node, attr, "style.min.css"));
        assert!(to_html(&doc).contains("href=\"style.min.css\""));
    }
}
