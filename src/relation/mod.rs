//! Relations: typed, rewritable edges between assets.

mod locator;

pub(crate) use locator::{read_inline, write_href, write_inline};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::asset::{AssetId, AssetType};
use crate::css::{DeclarationId, RuleId};
use crate::html::NodeId;

/// Stable relation identifier within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(pub(crate) u32);

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Kind of reference an asset makes to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationType {
    /// `<script src>` or inline `<script>`.
    HtmlScript,
    /// Inline `<style>`.
    HtmlStyle,
    /// `<link rel="stylesheet">`.
    HtmlStylesheet,
    /// `<img src>`.
    HtmlImage,
    /// `<a href>`.
    HtmlAnchor,
    /// `url()` inside a declaration value.
    CssImage,
    /// `@import`.
    CssImport,
    /// `url()` inside the `src` of an `@font-face` block.
    CssFontFaceSrc,
}

impl RelationType {
    pub const ALL: [Self; 8] = [
        Self::HtmlScript,
        Self::HtmlStyle,
        Self::HtmlStylesheet,
        Self::HtmlImage,
        Self::HtmlAnchor,
        Self::CssImage,
        Self::CssImport,
        Self::CssFontFaceSrc,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HtmlScript => "HtmlScript",
            Self::HtmlStyle => "HtmlStyle",
            Self::HtmlStylesheet => "HtmlStylesheet",
            Self::HtmlImage => "HtmlImage",
            Self::HtmlAnchor => "HtmlAnchor",
            Self::CssImage => "CssImage",
            Self::CssImport => "CssImport",
            Self::CssFontFaceSrc => "CssFontFaceSrc",
        }
    }

    /// Asset type implied by the relation, used when the target's extension
    /// says nothing.
    pub const fn target_hint(self) -> Option<AssetType> {
        match self {
            Self::HtmlScript => Some(AssetType::JavaScript),
            Self::HtmlStyle | Self::HtmlStylesheet | Self::CssImport => Some(AssetType::Css),
            Self::HtmlAnchor => Some(AssetType::Html),
            Self::CssFontFaceSrc => Some(AssetType::Font),
            Self::HtmlImage | Self::CssImage => None,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown relation type `{s}`"))
    }
}

/// Where a reference lives inside the source asset's parse tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// An HTML attribute holding the href.
    Attribute { node: NodeId, attr: String },
    /// The body of an inline `<script>` or `<style>` element.
    InlineElement { node: NodeId },
    /// The `index`-th `url()` token of a declaration.
    CssUrl {
        rule: RuleId,
        declaration: DeclarationId,
        index: usize,
    },
    /// The prelude of an `@import` rule.
    CssImport { rule: RuleId },
}

impl Locator {
    /// Containing CSS rule, for relations found in stylesheets.
    pub const fn css_rule(&self) -> Option<RuleId> {
        match self {
            Self::CssUrl { rule, .. } | Self::CssImport { rule } => Some(*rule),
            Self::Attribute { .. } | Self::InlineElement { .. } => None,
        }
    }

    /// HTML element holding the reference.
    pub const fn html_node(&self) -> Option<NodeId> {
        match self {
            Self::Attribute { node, .. } | Self::InlineElement { node } => Some(*node),
            Self::CssUrl { .. } | Self::CssImport { .. } => None,
        }
    }
}

/// A reference found by a provider while scanning a parse tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovered {
    pub relation_type: RelationType,
    /// Href as written in the source, `None` for inline content.
    pub href: Option<String>,
    pub locator: Locator,
    /// Inline asset type and source text.
    pub inline: Option<(AssetType, String)>,
}

impl Discovered {
    pub fn attribute(relation_type: RelationType, node: NodeId, attr: &str, href: &str) -> Self {
        Self {
            relation_type,
            href: Some(href.to_string()),
            locator: Locator::Attribute {
                node,
                attr: attr.to_string(),
            },
            inline: None,
        }
    }

    pub fn inline(relation_type: RelationType, node: NodeId, asset_type: AssetType, text: String) -> Self {
        Self {
            relation_type,
            href: None,
            locator: Locator::InlineElement { node },
            inline: Some((asset_type, text)),
        }
    }

    pub fn css_url(
        relation_type: RelationType,
        rule: RuleId,
        declaration: DeclarationId,
        index: usize,
        href: String,
    ) -> Self {
        Self {
            relation_type,
            href: Some(href),
            locator: Locator::CssUrl {
                rule,
                declaration,
                index,
            },
            inline: None,
        }
    }

    pub fn css_import(rule: RuleId, href: String) -> Self {
        Self {
            relation_type: RelationType::CssImport,
            href: Some(href),
            locator: Locator::CssImport { rule },
            inline: None,
        }
    }
}

/// A directed edge owned by the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: RelationId,
    pub from: AssetId,
    pub to: AssetId,
    pub relation_type: RelationType,
    /// Href as currently written in the source asset, `None` when inline.
    pub href: Option<String>,
    pub locator: Locator,
}

impl Relation {
    #[inline]
    pub fn is_inline(&self) -> bool {
        self.href.is_none()
    }

    /// The CSS rule containing this reference.
    #[inline]
    pub fn css_rule(&self) -> Option<RuleId> {
        self.locator.css_rule()
    }
}
