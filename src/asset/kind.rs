//! Asset type definitions and detection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of asset types the graph knows about.
///
/// `Unknown` is only used for assets discovered through an href whose type
/// cannot be guessed yet; loading either resolves it or fails with
/// `UnsupportedType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetType {
    Html,
    Css,
    JavaScript,
    Json,
    Svg,
    Png,
    Jpeg,
    Webp,
    /// WOFF, WOFF2, TrueType and OpenType, kept as opaque bytes.
    Font,
    Unknown,
}

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const FONT_MAGIC: [&[u8]; 5] = [b"wOFF", b"wOF2", &[0x00, 0x01, 0x00, 0x00], b"OTTO", b"true"];

impl AssetType {
    /// Guess from a lowercased file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext {
            "html" | "htm" | "xhtml" => Self::Html,
            "css" => Self::Css,
            "js" | "mjs" | "cjs" => Self::JavaScript,
            "json" | "map" | "webmanifest" => Self::Json,
            "svg" => Self::Svg,
            "png" => Self::Png,
            "jpg" | "jpeg" => Self::Jpeg,
            "webp" => Self::Webp,
            "woff" | "woff2" | "ttf" | "otf" => Self::Font,
            _ => return None,
        })
    }

    /// Detect raster image formats from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(PNG_MAGIC) {
            Some(Self::Png)
        } else if bytes.starts_with(JPEG_MAGIC) {
            Some(Self::Jpeg)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    /// Detect font containers from their signature.
    pub fn sniff_font(bytes: &[u8]) -> Option<Self> {
        FONT_MAGIC
            .iter()
            .any(|magic| bytes.starts_with(magic))
            .then_some(Self::Font)
    }

    /// Canonical file extension for derived assets.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::JavaScript => "js",
            Self::Json => "json",
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Font => "woff2",
            Self::Unknown => "bin",
        }
    }

    pub const fn mime(self) -> &'static str {
        match self {
            Self::Html => "text/html; charset=utf-8",
            Self::Css => "text/css; charset=utf-8",
            Self::JavaScript => "text/javascript; charset=utf-8",
            Self::Json => "application/json",
            Self::Svg => "image/svg+xml",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Font => "font/woff2",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Raster images decoded through the `image` crate.
    #[inline]
    pub const fn is_raster(self) -> bool {
        matches!(self, Self::Png | Self::Jpeg | Self::Webp)
    }

    /// Text assets whose parse tree can be serialized back to bytes.
    #[inline]
    pub const fn is_text(self) -> bool {
        matches!(
            self,
            Self::Html | Self::Css | Self::JavaScript | Self::Json | Self::Svg
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "Html",
            Self::Css => "Css",
            Self::JavaScript => "JavaScript",
            Self::Json => "Json",
            Self::Svg => "Svg",
            Self::Png => "Png",
            Self::Jpeg => "Jpeg",
            Self::Webp => "Webp",
            Self::Font => "Font",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Html,
            Self::Css,
            Self::JavaScript,
            Self::Json,
            Self::Svg,
            Self::Png,
            Self::Jpeg,
            Self::Webp,
            Self::Font,
            Self::Unknown,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown asset type `{s}`"))
    }
}
