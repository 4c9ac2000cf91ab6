//! Compositing engine.
//!
//! Rasterizes image and text overlays onto a base image in source order,
//! then re-encodes. A directive that fails to load is skipped; the rest of
//! the stack is still applied.

use std::io::Cursor;

use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageOutputFormat, Pixel, Rgba, RgbaImage};

use crate::domain::{AppError, ImageOverlay, OverlayDirective, Result, TextOverlay};

use super::exif::read_orientation;
use super::overlay_fetch::OverlayResolver;

/// Glyph cell size of the built-in bitmap font.
const GLYPH_CELLS: f32 = 8.0;
/// Extra vertical space between wrapped lines.
const LINE_GAP: f32 = 5.0;
/// An overlay may be at most this many times the base in either dimension.
const MAX_OVERLAY_SCALE: f32 = 4.0;

/// Output of a compositing pass.
#[derive(Debug, Clone)]
pub struct Composited {
    pub bytes: Vec<u8>,
    /// Extension matching the encoding (`jpg` or `png`).
    pub extension: &'static str,
    /// Descriptions of directives that were skipped.
    pub skipped: Vec<String>,
}

/// Applies overlay directives to images.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    jpeg_quality: u8,
}

impl Compositor {
    #[must_use]
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Composites `directives` onto `base`.
    ///
    /// # Errors
    /// Returns error only if the base image cannot be decoded or the result
    /// cannot be encoded. Overlay failures are reported in `skipped`.
    pub async fn composite(
        &self,
        base: &[u8],
        directives: &[OverlayDirective],
        resolver: &OverlayResolver<'_>,
    ) -> Result<Composited> {
        let format = image::guess_format(base).ok();
        let decoded = image::load_from_memory(base)
            .map_err(|e| AppError::image("Failed to decode base image", e))?;
        // The re-encoded output carries no orientation tag, so bake it in.
        let decoded = match read_orientation(base) {
            Some(orientation) => apply_orientation(decoded, orientation),
            None => decoded,
        };
        let mut canvas = decoded.to_rgba8();
        tokio::task::yield_now().await;

        let mut skipped = Vec::new();
        for (index, directive) in directives.iter().enumerate() {
            match directive {
                OverlayDirective::Image(overlay) => {
                    if let Err(e) = apply_image_overlay(&mut canvas, overlay, resolver).await {
                        tracing::warn!(index, error = %e, "Skipping image overlay");
                        skipped.push(format!("overlay {index}: {e}"));
                    }
                }
                OverlayDirective::Text(overlay) => draw_text_overlay(&mut canvas, overlay),
            }
        }

        let (bytes, extension) = self.encode(canvas, format)?;
        Ok(Composited {
            bytes,
            extension,
            skipped,
        })
    }

    /// Re-encodes the canvas, lossy for JPEG sources and PNG otherwise.
    fn encode(
        &self,
        canvas: RgbaImage,
        source_format: Option<ImageFormat>,
    ) -> Result<(Vec<u8>, &'static str)> {
        let image = DynamicImage::ImageRgba8(canvas);
        let mut out = Vec::new();

        if source_format == Some(ImageFormat::Jpeg) {
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, self.jpeg_quality);
            encoder
                .encode_image(&rgb)
                .map_err(|e| AppError::image("Failed to encode JPEG", e))?;
            return Ok((out, "jpg"));
        }

        image
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .map_err(|e| AppError::image("Failed to encode PNG", e))?;
        Ok((out, "png"))
    }
}

/// Turns pixels stored in EXIF `orientation` into their upright layout.
#[must_use]
pub fn apply_orientation(image: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

async fn apply_image_overlay(
    canvas: &mut RgbaImage,
    overlay: &ImageOverlay,
    resolver: &OverlayResolver<'_>,
) -> Result<()> {
    let bytes = resolver.load(&overlay.source).await?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| AppError::image("Failed to decode overlay", e))?;

    let (base_w, base_h) = canvas.dimensions();
    let (x, y) = overlay.position.resolve(base_w, base_h);
    let scale = |v: f32, full: u32| {
        if overlay.position.relative {
            v * full as f32
        } else {
            v
        }
    };

    let target_w = overlay.width.map(|w| scale(w, base_w));
    let target_h = overlay.height.map(|h| scale(h, base_h));
    let mut layer = match (target_w, target_h) {
        (None, None) => decoded.to_rgba8(),
        (w, h) => {
            let w = w.map_or(Ok(decoded.width()), |w| target_pixels(w, base_w))?;
            let h = h.map_or(Ok(decoded.height()), |h| target_pixels(h, base_h))?;
            decoded.resize_exact(w, h, FilterType::Triangle).to_rgba8()
        }
    };

    let opacity = overlay.opacity.clamp(0.0, 1.0);
    if opacity < 1.0 {
        for pixel in layer.pixels_mut() {
            pixel[3] = (f32::from(pixel[3]) * opacity).round() as u8;
        }
    }

    imageops::overlay(canvas, &layer, x.round() as i64, y.round() as i64);
    Ok(())
}

/// Converts a requested overlay size to pixels, rejecting sizes that are
/// not finite, not positive or far larger than the base.
fn target_pixels(v: f32, base: u32) -> Result<u32> {
    let limit = base.max(1) as f32 * MAX_OVERLAY_SCALE;
    if !v.is_finite() || v <= 0.0 || v > limit {
        return Err(AppError::format(format!(
            "overlay size {v} is outside 0..={limit}"
        )));
    }
    Ok(v.round().max(1.0) as u32)
}

/// Rendered width of `text` at `font_size`.
#[must_use]
pub fn measure_text(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size
}

/// Greedy word-wrap: words accumulate until the line would exceed
/// `max_width`, then a new line starts.
#[must_use]
pub fn wrap_lines(text: &str, font_size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split(' ') {
        let candidate = format!("{line}{word} ");
        if measure_text(&candidate, font_size) > max_width && !line.is_empty() {
            lines.push(line.trim_end().to_string());
            line = format!("{word} ");
        } else {
            line = candidate;
        }
    }
    lines.push(line.trim_end().to_string());
    lines
}

fn draw_text_overlay(canvas: &mut RgbaImage, overlay: &TextOverlay) {
    let (base_w, base_h) = canvas.dimensions();
    let (x, y) = overlay.position.resolve(base_w, base_h);
    let color = parse_color(&overlay.color);
    let font_size = overlay.font_size.max(1.0);

    let lines = match overlay.max_width {
        Some(max) => wrap_lines(&overlay.text, font_size, max),
        None => vec![overlay.text.clone()],
    };

    let mut line_y = y;
    for line in &lines {
        draw_line(canvas, line, x, line_y, font_size, color);
        line_y += font_size + LINE_GAP;
    }
}

/// Draws one line with `y` as its baseline.
fn draw_line(canvas: &mut RgbaImage, text: &str, x: f32, y: f32, font_size: f32, color: Rgba<u8>) {
    let cell = font_size / GLYPH_CELLS;
    let top = y - font_size;

    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| LATIN_FONTS.get(ch)) else {
            continue;
        };
        let left = x + i as f32 * font_size;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8u8 {
                if (bits >> col) & 1 == 1 {
                    fill_cell(
                        canvas,
                        left + f32::from(col) * cell,
                        top + row as f32 * cell,
                        cell,
                        color,
                    );
                }
            }
        }
    }
}

fn fill_cell(canvas: &mut RgbaImage, x: f32, y: f32, size: f32, color: Rgba<u8>) {
    let (w, h) = canvas.dimensions();
    let x0 = x.floor().max(0.0) as u32;
    let y0 = y.floor().max(0.0) as u32;
    let x1 = ((x + size).ceil().max(0.0) as u32).min(w);
    let y1 = ((y + size).ceil().max(0.0) as u32).min(h);

    for py in y0..y1 {
        for px in x0..x1 {
            canvas.get_pixel_mut(px, py).blend(&color);
        }
    }
}

/// Parses a CSS-ish color; unknown values fall back to white.
#[must_use]
pub fn parse_color(value: &str) -> Rgba<u8> {
    let value = value.trim().to_ascii_lowercase();
    let named = match value.as_str() {
        "white" => Some([255, 255, 255, 255]),
        "black" => Some([0, 0, 0, 255]),
        "red" => Some([255, 0, 0, 255]),
        "green" => Some([0, 128, 0, 255]),
        "blue" => Some([0, 0, 255, 255]),
        "yellow" => Some([255, 255, 0, 255]),
        _ => None,
    };
    if let Some(rgba) = named {
        return Rgba(rgba);
    }

    let Some(hex) = value.strip_prefix('#') else {
        return Rgba([255, 255, 255, 255]);
    };
    let digits: Vec<u8> = hex
        .chars()
        .filter_map(|c| c.to_digit(16))
        .filter_map(|d| u8::try_from(d).ok())
        .collect();
    if digits.len() != hex.len() {
        return Rgba([255, 255, 255, 255]);
    }

    match digits.as_slice() {
        [r, g, b] => Rgba([r * 17, g * 17, b * 17, 255]),
        [r1, r2, g1, g2, b1, b2] => Rgba([r1 * 16 + r2, g1 * 16 + g2, b1 * 16 + b2, 255]),
        [r1, r2, g1, g2, b1, b2, a1, a2] => {
            Rgba([r1 * 16 + r2, g1 * 16 + g2, b1 * 16 + b2, a1 * 16 + a2])
        }
        _ => Rgba([255, 255, 255, 255]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OverlaySource, Position};
    use crate::infrastructure::overlay_fetch::OfflineFetcher;
    use image::RgbImage;

    fn jpeg_base() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 5) as u8, 120])
        }));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Jpeg(90))
            .unwrap();
        out
    }

    fn png_of(color: [u8; 4], w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(color)));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    fn data_url(png: &[u8]) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, png)
        )
    }

    fn white_rows(img: &RgbaImage) -> Vec<u32> {
        (0..img.height())
            .filter(|&y| (0..img.width()).any(|x| img.get_pixel(x, y)[0] > 200))
            .collect()
    }

    #[tokio::test]
    async fn test_no_directives_matches_plain_reencode() {
        let base = jpeg_base();
        let resolver = OverlayResolver::new(None, &OfflineFetcher);

        let out = Compositor::new(95).composite(&base, &[], &resolver).await.unwrap();
        assert_eq!(out.extension, "jpg");
        assert!(out.skipped.is_empty());

        let decoded = image::load_from_memory(&base).unwrap().to_rgb8();
        let mut reencoded = Vec::new();
        JpegEncoder::new_with_quality(&mut reencoded, 95)
            .encode_image(&decoded)
            .unwrap();

        let expected = image::load_from_memory(&reencoded).unwrap().to_rgb8();
        let actual = image::load_from_memory(&out.bytes).unwrap().to_rgb8();
        assert_eq!(actual.dimensions(), expected.dimensions());
        assert_eq!(actual.as_raw(), expected.as_raw());
    }

    #[tokio::test]
    async fn test_oversized_overlay_is_skipped() {
        let base = png_of([0, 0, 0, 255], 20, 20);
        let sticker = png_of([255, 0, 0, 255], 5, 5);
        let directives = vec![
            OverlayDirective::Image(ImageOverlay {
                source: OverlaySource::DataUrl(data_url(&sticker)),
                position: Position::absolute(0.0, 0.0),
                width: Some(1e12),
                height: Some(3.0),
                opacity: 1.0,
            }),
            OverlayDirective::Image(ImageOverlay {
                source: OverlaySource::DataUrl(data_url(&sticker)),
                position: Position::absolute(0.0, 0.0),
                width: Some(f32::NAN),
                height: None,
                opacity: 1.0,
            }),
            OverlayDirective::Image(ImageOverlay {
                source: OverlaySource::DataUrl(data_url(&sticker)),
                position: Position::absolute(10.0, 10.0),
                width: Some(4.0),
                height: Some(4.0),
                opacity: 1.0,
            }),
        ];

        let resolver = OverlayResolver::new(None, &OfflineFetcher);
        let out = Compositor::new(95)
            .composite(&base, &directives, &resolver)
            .await
            .unwrap();

        assert_eq!(out.skipped.len(), 2);
        let img = image::load_from_memory(&out.bytes).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (20, 20));
        assert_eq!(img.get_pixel(2, 2).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(12, 12).0, [255, 0, 0, 255]);
    }

    #[tokio::test]
    async fn test_orientation_is_applied_before_compositing() {
        let base = crate::infrastructure::exif::with_orientation(&jpeg_base(), 6);
        let directives = vec![OverlayDirective::Text(TextOverlay {
            text: "A".into(),
            position: Position::absolute(2.0, 10.0),
            font_size: 8.0,
            color: "white".into(),
            max_width: None,
        })];
        let resolver = OverlayResolver::new(None, &OfflineFetcher);
        let out = Compositor::new(95)
            .composite(&base, &directives, &resolver)
            .await
            .unwrap();

        let img = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((img.width(), img.height()), (48, 64));
    }

    #[test]
    fn test_apply_orientation_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 2));
        for (orientation, dims) in [(1, (4, 2)), (3, (4, 2)), (5, (2, 4)), (6, (2, 4)), (8, (2, 4))] {
            let oriented = apply_orientation(img.clone(), orientation);
            assert_eq!((oriented.width(), oriented.height()), dims, "orientation {orientation}");
        }
    }

    #[test]
    fn test_wrapped_lines_advance_by_font_size_plus_gap() {
        let mut canvas = RgbaImage::from_pixel(60, 60, Rgba([0, 0, 0, 255]));
        let font_size = 16.0;
        // "H " measures 32 > 20, so each word gets its own line.
        draw_text_overlay(
            &mut canvas,
            &TextOverlay {
                text: "H H".into(),
                position: Position::absolute(2.0, 20.0),
                font_size,
                color: "#ffffff".into(),
                max_width: Some(20.0),
            },
        );

        let rows = white_rows(&canvas);
        let first_top = rows[0];
        let second_top = rows
            .windows(2)
            .find(|w| w[1] > w[0] + 1)
            .map(|w| w[1])
            .unwrap();
        assert_eq!(first_top, 4);
        assert_eq!(second_top - first_top, (font_size + LINE_GAP) as u32);
    }

    #[tokio::test]
    async fn test_failed_remote_overlay_is_skipped() {
        let base = png_of([0, 0, 0, 255], 20, 20);
        let overlay = png_of([255, 0, 0, 255], 5, 5);
        let data_url = format!(
            "data:image/png;base64,{}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &overlay)
        );
        let directives = vec![
            OverlayDirective::Image(ImageOverlay {
                source: OverlaySource::Remote("https://unreachable.invalid/x.png".into()),
                position: Position::absolute(0.0, 0.0),
                width: None,
                height: None,
                opacity: 1.0,
            }),
            OverlayDirective::Image(ImageOverlay {
                source: OverlaySource::DataUrl(data_url),
                position: Position::absolute(10.0, 10.0),
                width: None,
                height: None,
                opacity: 1.0,
            }),
        ];

        let resolver = OverlayResolver::new(None, &OfflineFetcher);
        let out = Compositor::new(95)
            .composite(&base, &directives, &resolver)
            .await
            .unwrap();

        assert_eq!(out.skipped.len(), 1);
        let img = image::load_from_memory(&out.bytes).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(12, 12).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(2, 2).0, [0, 0, 0, 255]);
    }

    #[tokio::test]
    async fn test_text_overlay_changes_pixels() {
        let base = png_of([0, 0, 0, 255], 80, 40);
        let directives = vec![OverlayDirective::Text(TextOverlay {
            text: "HI".into(),
            position: Position::absolute(4.0, 20.0),
            font_size: 16.0,
            color: "#ffffff".into(),
            max_width: None,
        })];
        let resolver = OverlayResolver::new(None, &OfflineFetcher);
        let out = Compositor::new(95)
            .composite(&base, &directives, &resolver)
            .await
            .unwrap();

        let img = image::load_from_memory(&out.bytes).unwrap().to_rgba8();
        assert!(img.pixels().any(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn test_wrap_lines() {
        // Each char is font_size wide: "aa bb " is 6 * 10 = 60.
        let lines = wrap_lines("aa bb cc dd", 10.0, 60.0);
        assert_eq!(lines, vec!["aa bb", "cc dd"]);
    }

    #[test]
    fn test_wrap_keeps_long_single_word() {
        let lines = wrap_lines("supercalifragilistic", 10.0, 30.0);
        assert_eq!(lines, vec!["supercalifragilistic"]);
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#fff"), Rgba([255, 255, 255, 255]));
        assert_eq!(parse_color("#FF000080"), Rgba([255, 0, 0, 128]));
        assert_eq!(parse_color("black"), Rgba([0, 0, 0, 255]));
        assert_eq!(parse_color("nonsense"), Rgba([255, 255, 255, 255]));
    }
}
