//! Image post-processing operations requested from CSS.
//!
//! An operation list such as `quantize(4) grayscale` is parsed into
//! [`ImageOp`]s, applied in order, and the result is written as PNG.

use std::fmt;

use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder};

/// Largest width or height an operation may produce.
pub const MAX_DIMENSION: u32 = 16_384;
/// Largest `scale()` factor.
pub const MAX_SCALE: f64 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageOp {
    /// Reduce every color channel to `levels` values.
    Quantize(u16),
    Grayscale,
    Resize(u32, u32),
    Scale(f32),
    /// Re-encode only.
    Optimize,
}

impl fmt::Display for ImageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quantize(n) => write!(f, "quantize({n})"),
            Self::Grayscale => f.write_str("grayscale"),
            Self::Resize(w, h) => write!(f, "resize({w}, {h})"),
            Self::Scale(s) => write!(f, "scale({s})"),
            Self::Optimize => f.write_str("optimize"),
        }
    }
}

/// Parse a whitespace separated operation list.
pub fn parse_ops(value: &str) -> Result<Vec<ImageOp>, String> {
    let mut ops = Vec::new();
    let mut rest = value.trim();

    while !rest.is_empty() {
        let name_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
            .unwrap_or(rest.len());
        let name = rest[..name_len].to_ascii_lowercase();
        rest = &rest[name_len..];

        let args: Vec<&str> = if let Some(inner) = rest.strip_prefix('(') {
            let close = inner.find(')').ok_or_else(|| format!("unclosed `(` after `{name}`"))?;
            let args = inner[..close]
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .collect();
            rest = &inner[close + 1..];
            args
        } else {
            Vec::new()
        };
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');

        ops.push(parse_op(&name, &args)?);
    }

    if ops.is_empty() {
        return Err("empty operation list".to_string());
    }
    Ok(ops)
}

fn parse_op(name: &str, args: &[&str]) -> Result<ImageOp, String> {
    let num = |i: usize| -> Result<f64, String> {
        let arg = args.get(i).ok_or_else(|| format!("`{name}` needs {} argument(s)", i + 1))?;
        arg.parse::<f64>()
            .map_err(|_| format!("`{name}`: `{arg}` is not a number"))
    };

    match name {
        "quantize" | "posterize" => {
            let levels = num(0)?;
            if !(2.0..=256.0).contains(&levels) {
                return Err(format!("`{name}` levels must be between 2 and 256, got {levels}"));
            }
            Ok(ImageOp::Quantize(levels as u16))
        }
        "grayscale" | "greyscale" => Ok(ImageOp::Grayscale),
        "resize" => {
            let (w, h) = (num(0)?, num(1)?);
            if w < 1.0 || h < 1.0 {
                return Err(format!("`resize` needs positive dimensions, got {w}x{h}"));
            }
            if w > f64::from(MAX_DIMENSION) || h > f64::from(MAX_DIMENSION) {
                return Err(format!("`resize` dimensions must be at most {MAX_DIMENSION}, got {w}x{h}"));
            }
            Ok(ImageOp::Resize(w as u32, h as u32))
        }
        "scale" => {
            let factor = num(0)?;
            if factor <= 0.0 {
                return Err(format!("`scale` needs a positive factor, got {factor}"));
            }
            if factor > MAX_SCALE {
                return Err(format!("`scale` factor must be at most {MAX_SCALE}, got {factor}"));
            }
            Ok(ImageOp::Scale(factor as f32))
        }
        "optimize" => Ok(ImageOp::Optimize),
        other => Err(format!("unknown image operation `{other}`")),
    }
}

/// Decode, apply `ops` in order and encode the result as PNG.
pub fn process(bytes: &[u8], ops: &[ImageOp]) -> Result<Vec<u8>, String> {
    let mut img = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    for op in ops {
        img = apply(img, *op)?;
    }
    encode_png(&img)
}

fn apply(img: DynamicImage, op: ImageOp) -> Result<DynamicImage, String> {
    Ok(match op {
        ImageOp::Quantize(levels) => quantize(img, levels),
        ImageOp::Grayscale => img.grayscale(),
        ImageOp::Resize(w, h) => {
            check_dimensions(op, f64::from(w), f64::from(h))?;
            img.resize_exact(w, h, FilterType::Lanczos3)
        }
        ImageOp::Scale(factor) => {
            let (w, h) = img.dimensions();
            let scaled = |v: u32| (f64::from(v) * f64::from(factor)).round().max(1.0);
            let (w, h) = (scaled(w), scaled(h));
            check_dimensions(op, w, h)?;
            img.resize_exact(w as u32, h as u32, FilterType::Triangle)
        }
        ImageOp::Optimize => img,
    })
}

/// Reject output sizes above [`MAX_DIMENSION`]; ops built in code skip
/// the parse-time check.
fn check_dimensions(op: ImageOp, w: f64, h: f64) -> Result<(), String> {
    if w > f64::from(MAX_DIMENSION) || h > f64::from(MAX_DIMENSION) {
        return Err(format!("`{op}` would produce {w}x{h}, above the {MAX_DIMENSION} pixel limit"));
    }
    Ok(())
}

/// Posterize the color channels, leaving alpha alone.
fn quantize(img: DynamicImage, levels: u16) -> DynamicImage {
    let step = 255.0 / f32::from(levels - 1);
    let mut rgba = img.to_rgba8();
    for pixel in rgba.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = ((f32::from(*channel) / step).round() * step).round() as u8;
        }
    }
    DynamicImage::ImageRgba8(rgba)
}

/// Encode with the smallest color type that loses nothing.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, String> {
    let rgba = img.to_rgba8();
    let opaque = rgba.pixels().all(|p| p.0[3] == u8::MAX);
    let gray = rgba.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]);

    let reduced = match (opaque, gray) {
        (true, true) => DynamicImage::ImageLuma8(img.to_luma8()),
        (true, false) => DynamicImage::ImageRgb8(img.to_rgb8()),
        (false, true) => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
        (false, false) => DynamicImage::ImageRgba8(rgba),
    };

    let (width, height) = reduced.dimensions();
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilter::Adaptive)
        .write_image(
            reduced.as_bytes(),
            width,
            height,
            ExtendedColorType::from(reduced.color()),
        )
        .map_err(|e| e.to_string())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::gradient_png;
    use super::*;

    #[test]
    fn test_parse_ops() {
        assert_eq!(parse_ops("quantize(4)").unwrap(), [ImageOp::Quantize(4)]);
        assert_eq!(
            parse_ops("grayscale, resize(10, 20) optimize").unwrap(),
            [ImageOp::Grayscale, ImageOp::Resize(10, 20), ImageOp::Optimize]
        );
        assert!(parse_ops("").is_err());
        assert!(parse_ops("quantize(1)").is_err());
        assert!(parse_ops("blur(3)").is_err());
        assert!(parse_ops("resize(10)").is_err());
    }

    #[test]
    fn test_quantize_limits_levels() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_fn(16, 1, |x, _| {
            image::Rgba([(x * 16) as u8, 0, 255, 128])
        }));
        let out = quantize(img, 2).to_rgba8();
        for p in out.pixels() {
            assert!(p.0[0] == 0 || p.0[0] == 255);
            assert_eq!(p.0[3], 128);
        }
    }

    #[test]
    fn test_quantized_png_is_smaller() {
        let original = gradient_png(64, 64);
        let derived = process(&original, &[ImageOp::Quantize(4)]).unwrap();

        assert_eq!(&derived[..4], &[0x89, 0x50, 0x4E, 0x47]);
        assert!(derived.len() < original.len());
    }

    #[test]
    fn test_resize_and_scale() {
        let original = gradient_png(20, 10);
        let resized = process(&original, &[ImageOp::Resize(5, 5)]).unwrap();
        assert_eq!(super::super::dimensions(&resized).unwrap(), (5, 5));

        let scaled = process(&original, &[ImageOp::Scale(0.5)]).unwrap();
        assert_eq!(super::super::dimensions(&scaled).unwrap(), (10, 5));
    }

    #[test]
    fn test_oversized_output_is_rejected() {
        assert!(parse_ops("resize(16384, 16384)").is_ok());
        let err = parse_ops("resize(100000, 100000)").unwrap_err();
        assert!(err.contains("at most 16384"));
        assert!(parse_ops("scale(16)").is_ok());
        assert!(parse_ops("scale(1000)").is_err());

        let original = gradient_png(20, 10);
        let err = process(&original, &[ImageOp::Scale(1000.0)]).unwrap_err();
        assert!(err.contains("pixel limit"));
        assert!(process(&original, &[ImageOp::Resize(20_000, 1)]).is_err());
    }
}
