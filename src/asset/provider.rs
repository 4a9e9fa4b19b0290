//! Pluggable parse/serialize/discover capability per asset type.

use std::fmt;
use std::sync::Arc;

use super::{AssetType, ParseTree};
use crate::core::AssetUrl;
use crate::css::CssProvider;
use crate::error::{AssetError, Result};
use crate::html::HtmlProvider;
use crate::image::ImageProvider;
use crate::js::JsProvider;
use crate::relation::Discovered;

/// What a provider gets to look at before claiming an asset.
#[derive(Debug, Clone, Copy)]
pub struct Probe<'a> {
    pub url: &'a AssetUrl,
    /// Type guessed from the URL or the referring relation.
    pub declared: AssetType,
    pub bytes: &'a [u8],
}

/// Parses, serializes and scans one family of asset types.
pub trait AssetProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_parse(&self, probe: &Probe<'_>) -> bool;

    /// Final asset type once the provider has seen the bytes.
    fn asset_type(&self, probe: &Probe<'_>) -> AssetType;

    fn parse(&self, probe: &Probe<'_>) -> Result<ParseTree>;

    fn serialize(&self, tree: &ParseTree) -> Result<Vec<u8>> {
        tree.to_bytes()
            .ok_or_else(|| AssetError::unsupported(format!("{} parse tree", self.name())))
    }

    /// Outgoing references, in source order.
    fn discover(&self, _tree: &ParseTree) -> Vec<Discovered> {
        Vec::new()
    }
}

/// Ordered provider registry; the first provider that accepts a probe wins.
#[derive(Clone, Default)]
pub struct Providers {
    providers: Vec<Arc<dyn AssetProvider>>,
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in providers. Images come first so magic bytes beat extensions.
    pub fn standard() -> Self {
        Self::new()
            .with(ImageProvider)
            .with(HtmlProvider)
            .with(CssProvider)
            .with(JsProvider)
            .with(JsonProvider)
            .with(SvgProvider)
            .with(FontProvider)
    }

    pub fn with(mut self, provider: impl AssetProvider + 'static) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: impl AssetProvider + 'static) {
        self.providers.push(Arc::new(provider));
    }

    /// Provider willing to parse the probe.
    pub fn find(&self, probe: &Probe<'_>) -> Option<&dyn AssetProvider> {
        self.providers
            .iter()
            .find(|p| p.can_parse(probe))
            .map(|p| p.as_ref())
    }

    /// Provider for an already typed asset.
    pub fn for_type(&self, asset_type: AssetType, url: &AssetUrl) -> Option<&dyn AssetProvider> {
        self.find(&Probe {
            url,
            declared: asset_type,
            bytes: &[],
        })
    }
}

/// `Json` assets through serde_json.
#[derive(Debug, Default)]
pub struct JsonProvider;

impl AssetProvider for JsonProvider {
    fn name(&self) -> &'static str {
        "json"
    }

    fn can_parse(&self, probe: &Probe<'_>) -> bool {
        probe.declared == AssetType::Json
    }

    fn asset_type(&self, _probe: &Probe<'_>) -> AssetType {
        AssetType::Json
    }

    fn parse(&self, probe: &Probe<'_>) -> Result<ParseTree> {
        serde_json::from_slice(probe.bytes)
            .map(ParseTree::Json)
            .map_err(|e| AssetError::parse(probe.url, AssetType::Json, e.to_string()))
    }
}

/// `Svg` assets, kept as text.
#[derive(Debug, Default)]
pub struct SvgProvider;

impl AssetProvider for SvgProvider {
    fn name(&self) -> &'static str {
        "svg"
    }

    fn can_parse(&self, probe: &Probe<'_>) -> bool {
        probe.declared == AssetType::Svg
    }

    fn asset_type(&self, _probe: &Probe<'_>) -> AssetType {
        AssetType::Svg
    }

    fn parse(&self, probe: &Probe<'_>) -> Result<ParseTree> {
        let text = std::str::from_utf8(probe.bytes)
            .map_err(|e| AssetError::parse(probe.url, AssetType::Svg, e.to_string()))?;
        if !text.contains("<svg") {
            return Err(AssetError::parse(probe.url, AssetType::Svg, "missing <svg> element"));
        }
        Ok(ParseTree::Text(text.to_string()))
    }
}

/// `Font` assets. Bytes pass through untouched; a recognised signature or
/// a font extension is enough.
#[derive(Debug, Default)]
pub struct FontProvider;

impl AssetProvider for FontProvider {
    fn name(&self) -> &'static str {
        "font"
    }

    fn can_parse(&self, probe: &Probe<'_>) -> bool {
        probe.declared == AssetType::Font || AssetType::sniff_font(probe.bytes).is_some()
    }

    fn asset_type(&self, _probe: &Probe<'_>) -> AssetType {
        AssetType::Font
    }

    fn parse(&self, probe: &Probe<'_>) -> Result<ParseTree> {
        if probe.bytes.is_empty() {
            return Err(AssetError::parse(probe.url, AssetType::Font, "empty font file"));
        }
        Ok(ParseTree::Binary { len: probe.bytes.len() })
    }

    fn serialize(&self, _tree: &ParseTree) -> Result<Vec<u8>> {
        Err(AssetError::unsupported("font parse tree"))
    }
}
