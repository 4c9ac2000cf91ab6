//! Preview thumbnails.
//!
//! Thumbnails are aspect-preserving downscales bounded by a box and always
//! JPEG-encoded, so a preview never carries the full-resolution asset.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::domain::{AppError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ThumbnailConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: 200,
            max_height: 200,
            quality: 80,
        }
    }
}

/// Target size that fits `width x height` inside the box without upscaling.
#[must_use]
pub fn bounded_size(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let width = width.max(1);
    let height = height.max(1);
    let max_width = max_width.max(1);
    let max_height = max_height.max(1);

    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let scale = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    let w = (f64::from(width) * scale).round().max(1.0) as u32;
    let h = (f64::from(height) * scale).round().max(1.0) as u32;
    (w.min(max_width), h.min(max_height))
}

/// Generates a JPEG thumbnail of an encoded image.
///
/// # Errors
/// Returns error if the source cannot be decoded or the thumbnail encoded.
pub fn generate_thumbnail(source: &[u8], config: ThumbnailConfig) -> Result<Vec<u8>> {
    let source_image = image::load_from_memory(source)
        .map_err(|e| AppError::image("Failed to decode source image", e))?;

    let (w, h) = bounded_size(
        source_image.width(),
        source_image.height(),
        config.max_width,
        config.max_height,
    );
    let thumbnail = source_image.resize_exact(w, h, FilterType::Triangle).to_rgb8();

    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, config.quality.clamp(1, 100));
    encoder
        .encode_image(&thumbnail)
        .map_err(|e| AppError::image("Failed to encode thumbnail", e))?;

    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use std::io::Cursor;

    #[test]
    fn test_bounded_size_landscape() {
        assert_eq!(bounded_size(1000, 500, 200, 200), (200, 100));
    }

    #[test]
    fn test_bounded_size_portrait() {
        assert_eq!(bounded_size(300, 1200, 200, 200), (50, 200));
    }

    #[test]
    fn test_bounded_size_never_upscales() {
        assert_eq!(bounded_size(40, 30, 200, 200), (40, 30));
    }

    #[test]
    fn test_thumbnail_is_bounded() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(800, 600));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .unwrap();

        let thumb = generate_thumbnail(&png, ThumbnailConfig::default()).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 150));
    }
}
