//! Reading and rewriting references through their locators.

use super::Locator;
use crate::asset::ParseTree;
use crate::{css, html};

/// Write `href` into the place the locator points at.
///
/// Returns false when the locator no longer matches the tree.
pub(crate) fn write_href(tree: &mut ParseTree, locator: &Locator, href: &str) -> bool {
    match (tree, locator) {
        (ParseTree::Html(doc), Locator::Attribute { node, attr }) => {
            html::write_attribute(doc, *node, attr, href)
        }
        (
            ParseTree::Css(sheet),
            Locator::CssUrl {
                rule,
                declaration,
                index,
            },
        ) => css::write_url(sheet, *rule, *declaration, *index, href),
        (ParseTree::Css(sheet), Locator::CssImport { rule }) => css::write_import(sheet, *rule, href),
        _ => false,
    }
}

/// Replace inline content held by the source tree.
pub(crate) fn write_inline(tree: &mut ParseTree, locator: &Locator, text: &str) -> bool {
    match (tree, locator) {
        (ParseTree::Html(doc), Locator::InlineElement { node }) => {
            html::write_inline_body(doc, *node, text)
        }
        _ => false,
    }
}

/// Current inline content at the locator.
pub(crate) fn read_inline(tree: &ParseTree, locator: &Locator) -> Option<String> {
    match (tree, locator) {
        (ParseTree::Html(doc), Locator::InlineElement { node }) => {
            doc.element(*node).map(html::Element::text_content)
        }
        _ => None,
    }
}
