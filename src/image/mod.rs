//! Raster image assets and post-processing.
//!
//! Raw bytes stay authoritative for images; the parse tree only records
//! format and dimensions.

pub mod postprocess;

use std::io::Cursor;

use image::ImageReader;

use crate::asset::{AssetProvider, AssetType, ParseTree, Probe};
use crate::error::{AssetError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: AssetType,
    pub width: u32,
    pub height: u32,
}

/// Provider for `Png`, `Jpeg` and `Webp` assets.
///
/// Matches on magic bytes first, so a mislabelled image still parses.
#[derive(Debug, Default)]
pub struct ImageProvider;

impl AssetProvider for ImageProvider {
    fn name(&self) -> &'static str {
        "image"
    }

    fn can_parse(&self, probe: &Probe<'_>) -> bool {
        AssetType::sniff(probe.bytes).is_some() || probe.declared.is_raster()
    }

    fn asset_type(&self, probe: &Probe<'_>) -> AssetType {
        AssetType::sniff(probe.bytes).unwrap_or(probe.declared)
    }

    fn parse(&self, probe: &Probe<'_>) -> Result<ParseTree> {
        let format = self.asset_type(probe);
        let (width, height) = dimensions(probe.bytes)
            .map_err(|e| AssetError::parse(probe.url, format, e))?;
        Ok(ParseTree::Image(ImageInfo {
            format,
            width,
            height,
        }))
    }

    fn serialize(&self, _tree: &ParseTree) -> Result<Vec<u8>> {
        Err(AssetError::unsupported("image parse tree"))
    }
}

/// Read image dimensions from the header without decoding pixels.
pub fn dimensions(bytes: &[u8]) -> std::result::Result<(u32, u32), String> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .into_dimensions()
        .map_err(|e| e.to_string())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AssetUrl;

    #[test]
    fn test_provider_reads_dimensions() {
        let bytes = fixtures::gradient_png(16, 8);
        let url = AssetUrl::parse("file:///site/wrong.jpg").unwrap();
        let probe = Probe {
            url: &url,
            declared: AssetType::Jpeg,
            bytes: &bytes,
        };

        assert!(ImageProvider.can_parse(&probe));
        assert_eq!(ImageProvider.asset_type(&probe), AssetType::Png);
        let ParseTree::Image(info) = ImageProvider.parse(&probe).unwrap() else {
            panic!("expected image tree");
        };
        assert_eq!((info.width, info.height), (16, 8));
    }

    #[test]
    fn test_corrupt_image_is_parse_error() {
        let url = AssetUrl::parse("file:///site/broken.png").unwrap();
        let mut bytes = fixtures::gradient_png(4, 4);
        bytes.truncate(12);
        let probe = Probe {
            url: &url,
            declared: AssetType::Png,
            bytes: &bytes,
        };
        assert_eq!(ImageProvider.parse(&probe).unwrap_err().kind(), "parse");
    }
}
