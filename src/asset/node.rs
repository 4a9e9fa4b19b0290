//! Asset nodes and their parsed representations.

use std::fmt;

use super::AssetType;
use crate::core::AssetUrl;
use crate::css::{Stylesheet, to_css};
use crate::html::{HtmlDocument, to_html};
use crate::image::ImageInfo;
use crate::js::Script;
use crate::relation::RelationId;

/// Stable asset identifier within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub(crate) u32);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Structured representation of an asset's content.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseTree {
    Html(HtmlDocument),
    Css(Stylesheet),
    JavaScript(Script),
    Json(serde_json::Value),
    /// SVG and other text kept verbatim.
    Text(String),
    Image(ImageInfo),
    /// Opaque binary content, such as fonts.
    Binary { len: usize },
}

impl ParseTree {
    /// Serialize text trees. Images and binary assets have no serialized
    /// form here; their raw bytes are authoritative.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        Some(match self {
            Self::Html(doc) => to_html(doc).into_bytes(),
            Self::Css(sheet) => to_css(sheet).into_bytes(),
            Self::JavaScript(script) => script.text.clone().into_bytes(),
            Self::Json(value) => format!("{value:#}").into_bytes(),
            Self::Text(text) => text.clone().into_bytes(),
            Self::Image(_) | Self::Binary { .. } => return None,
        })
    }

    pub fn as_html(&self) -> Option<&HtmlDocument> {
        match self {
            Self::Html(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_html_mut(&mut self) -> Option<&mut HtmlDocument> {
        match self {
            Self::Html(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_css(&self) -> Option<&Stylesheet> {
        match self {
            Self::Css(sheet) => Some(sheet),
            _ => None,
        }
    }

    pub fn as_css_mut(&mut self) -> Option<&mut Stylesheet> {
        match self {
            Self::Css(sheet) => Some(sheet),
            _ => None,
        }
    }

    pub fn as_script(&self) -> Option<&Script> {
        match self {
            Self::JavaScript(script) => Some(script),
            _ => None,
        }
    }
}

/// Where an asset is in its load lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Known by URL only.
    Unloaded,
    Loaded,
    /// Fetching or parsing failed; the reason is kept for reporting.
    Failed(String),
}

/// One resource in the graph.
#[derive(Debug, Clone)]
pub struct Asset {
    pub id: AssetId,
    /// Identity. Inline assets carry their container's URL.
    pub url: AssetUrl,
    pub asset_type: AssetType,
    pub is_inline: bool,
    /// Failures on optional assets are downgraded to warnings.
    pub optional: bool,
    pub(crate) state: LoadState,
    pub(crate) raw: Option<Vec<u8>>,
    pub(crate) parsed: Option<ParseTree>,
    pub(crate) outgoing: Vec<RelationId>,
    pub(crate) incoming: Vec<RelationId>,
}

impl Asset {
    pub(crate) fn unloaded(id: AssetId, url: AssetUrl, asset_type: AssetType) -> Self {
        Self {
            id,
            url,
            asset_type,
            is_inline: false,
            optional: false,
            state: LoadState::Unloaded,
            raw: None,
            parsed: None,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    pub fn parse_tree(&self) -> Option<&ParseTree> {
        self.parsed.as_ref()
    }

    /// Mutable parse tree. Cached raw bytes of text assets are dropped and
    /// regenerated on the next serialization.
    pub fn parse_tree_mut(&mut self) -> Option<&mut ParseTree> {
        if self.asset_type.is_text() {
            self.raw = None;
        }
        self.parsed.as_mut()
    }

    /// Raw bytes, serializing the parse tree when the cache is stale.
    pub fn raw_src(&self) -> Option<Vec<u8>> {
        match &self.raw {
            Some(raw) => Some(raw.clone()),
            None => self.parsed.as_ref().and_then(ParseTree::to_bytes),
        }
    }

    /// Cached raw bytes, if still in sync with the parse tree.
    pub fn cached_raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    pub fn text(&self) -> Option<String> {
        self.raw_src().and_then(|b| String::from_utf8(b).ok())
    }

    pub fn outgoing(&self) -> &[RelationId] {
        &self.outgoing
    }

    pub fn incoming(&self) -> &[RelationId] {
        &self.incoming
    }

    /// Raw byte length, if known.
    pub fn size(&self) -> Option<usize> {
        match &self.raw {
            Some(raw) => Some(raw.len()),
            None => self.raw_src().map(|b| b.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::parse_stylesheet;

    #[test]
    fn test_mutation_drops_cached_raw() {
        let url = AssetUrl::parse("file:///site/a.css").unwrap();
        let mut asset = Asset::unloaded(AssetId(0), url, AssetType::Css);
        asset.raw = Some(b".a{color:red}".to_vec());
        asset.parsed = Some(ParseTree::Css(parse_stylesheet(".a{color:red}").unwrap()));
        asset.state = LoadState::Loaded;

        assert_eq!(asset.cached_raw(), Some(&b".a{color:red}"[..]));
        let sheet = asset.parse_tree_mut().and_then(ParseTree::as_css_mut).unwrap();
        let color = sheet.declarations()[0].clone();
        sheet.remove_declaration(color.rule, color.id).unwrap();

        assert!(asset.cached_raw().is_none());
        let text = asset.text().unwrap();
        assert!(text.starts_with(".a"));
        assert!(!text.contains("red"));
    }

    #[test]
    fn test_image_keeps_raw() {
        let url = AssetUrl::parse("file:///site/a.png").unwrap();
        let mut asset = Asset::unloaded(AssetId(1), url, AssetType::Png);
        asset.raw = Some(vec![1, 2, 3]);
        asset.parsed = Some(ParseTree::Image(ImageInfo {
            format: AssetType::Png,
            width: 1,
            height: 1,
        }));

        asset.parse_tree_mut();
        assert_eq!(asset.raw_src(), Some(vec![1, 2, 3]));
        assert_eq!(asset.size(), Some(3));
    }
}
