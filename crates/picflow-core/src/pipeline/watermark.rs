//! Text and image watermarks.
//!
//! The mark is rendered once per image, scaled to a fraction of the image
//! width, rotated, then either anchored by gravity or tiled over the whole
//! image. The result is re-encoded in the source format.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};

use crate::config::{Gravity, WatermarkKind, WatermarkOptions, DEFAULT_WATERMARK_COLOR};
use crate::error::{PipelineError, PipelineResult};

use super::compress::rotate_expanded;
use super::decode;

/// Render size for text before scaling to the target width.
const TEXT_RENDER_PX: f32 = 96.0;

/// Apply the configured watermark to `bytes`.
///
/// `shared_font` is used for text marks without an explicit font path.
pub fn add_watermark(
    bytes: &[u8],
    options: &WatermarkOptions,
    raw_ext: &str,
    shared_font: Option<&Path>,
) -> PipelineResult<Vec<u8>> {
    let (base, format) = decode::decode(bytes, raw_ext)?;
    let (width, height) = base.dimensions();
    let mark = create_watermark(options, width, shared_font)?;

    let mut canvas = base.to_rgba8();
    if options.is_full_screen_watermark {
        tile(&mut canvas, &mark);
    } else {
        let (x, y) = anchor(options.watermark_position, (width, height), mark.dimensions());
        imageops::overlay(&mut canvas, &mark, x, y);
    }

    decode::encode(&DynamicImage::ImageRgba8(canvas), format, 100)
}

/// Render, scale and rotate the mark for an image `image_width` pixels wide.
pub fn create_watermark(
    options: &WatermarkOptions,
    image_width: u32,
    shared_font: Option<&Path>,
) -> PipelineResult<RgbaImage> {
    let raw = match options.watermark_type {
        WatermarkKind::Image => load_image_mark(Path::new(options.watermark_image_path.trim()))?,
        WatermarkKind::Text => {
            let font_path = if options.watermark_font_path.trim().is_empty() {
                shared_font.ok_or_else(|| PipelineError::Image {
                    message: "no font available for text watermark".to_string(),
                })?
            } else {
                Path::new(options.watermark_font_path.trim())
            };
            render_text(
                &options.watermark_text,
                &parse_color(&options.watermark_color),
                font_path,
            )?
        }
    };

    let (mark_w, mark_h) = raw.dimensions();
    let target_w = ((image_width as f32 * options.effective_scale_ratio()).floor() as u32).max(1);
    let target_h = ((target_w as u64 * mark_h as u64 / mark_w.max(1) as u64) as u32).max(1);
    let scaled = imageops::resize(&raw, target_w, target_h, FilterType::Triangle);

    if options.watermark_degree != 0.0 {
        let rotated = rotate_expanded(&DynamicImage::ImageRgba8(scaled), options.watermark_degree);
        Ok(rotated.to_rgba8())
    } else {
        Ok(scaled)
    }
}

fn load_image_mark(path: &Path) -> PipelineResult<RgbaImage> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (image, _) = decode::decode(&bytes, &ext)?;
    Ok(image.to_rgba8())
}

fn render_text(text: &str, color: &Rgba<u8>, font_path: &Path) -> PipelineResult<RgbaImage> {
    let font_bytes = std::fs::read(font_path).map_err(|e| PipelineError::Read {
        path: font_path.to_path_buf(),
        message: e.to_string(),
    })?;
    let font = FontVec::try_from_vec(font_bytes).map_err(|e| PipelineError::Image {
        message: format!("invalid font {}: {e}", font_path.display()),
    })?;

    let scale = PxScale::from(TEXT_RENDER_PX);
    let (text_w, text_h) = text_size(scale, &font, text);
    let pad = (TEXT_RENDER_PX / 8.0) as u32;
    let mut canvas = RgbaImage::from_pixel(
        text_w.max(1) + pad * 2,
        text_h.max(1) + pad * 2,
        Rgba([0, 0, 0, 0]),
    );
    draw_text_mut(&mut canvas, *color, pad as i32, pad as i32, scale, &font, text);
    Ok(canvas)
}

/// Top-left position of a mark anchored by `gravity`.
pub fn anchor(gravity: Gravity, image: (u32, u32), mark: (u32, u32)) -> (i64, i64) {
    let free_x = image.0 as i64 - mark.0 as i64;
    let free_y = image.1 as i64 - mark.1 as i64;
    let (x, y) = match gravity {
        Gravity::North => (free_x / 2, 0),
        Gravity::NorthEast => (free_x, 0),
        Gravity::East => (free_x, free_y / 2),
        Gravity::SouthEast => (free_x, free_y),
        Gravity::South => (free_x / 2, free_y),
        Gravity::SouthWest => (0, free_y),
        Gravity::West => (0, free_y / 2),
        Gravity::NorthWest => (0, 0),
        Gravity::Center => (free_x / 2, free_y / 2),
    };
    (x, y)
}

fn tile(canvas: &mut RgbaImage, mark: &RgbaImage) {
    let (width, height) = canvas.dimensions();
    let (mark_w, mark_h) = mark.dimensions();
    if mark_w == 0 || mark_h == 0 {
        return;
    }
    for y in (0..height).step_by(mark_h as usize) {
        for x in (0..width).step_by(mark_w as usize) {
            imageops::overlay(canvas, mark, x as i64, y as i64);
        }
    }
}

/// Parse `rgba(r, g, b, a)`, `rgb(r, g, b)`, `#rgb`, `#rrggbb` or `#rrggbbaa`.
///
/// Unparseable input falls back to the default watermark color.
pub fn parse_color(input: &str) -> Rgba<u8> {
    try_parse_color(input)
        .or_else(|| try_parse_color(DEFAULT_WATERMARK_COLOR))
        .unwrap_or(Rgba([204, 204, 204, 115]))
}

fn try_parse_color(input: &str) -> Option<Rgba<u8>> {
    let s = input.trim().to_ascii_lowercase();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    let (body, has_alpha) = if let Some(body) = s.strip_prefix("rgba(") {
        (body, true)
    } else if let Some(body) = s.strip_prefix("rgb(") {
        (body, false)
    } else {
        return None;
    };
    let parts: Vec<&str> = body.strip_suffix(')')?.split(',').map(str::trim).collect();
    if parts.len() != if has_alpha { 4 } else { 3 } {
        return None;
    }
    let channel = |p: &str| p.parse::<u8>().ok();
    let alpha = if has_alpha {
        let a = parts[3].parse::<f32>().ok()?.clamp(0.0, 1.0);
        (a * 255.0).round() as u8
    } else {
        255
    };
    Some(Rgba([channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, alpha]))
}

fn parse_hex(hex: &str) -> Option<Rgba<u8>> {
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => {
            let nibble = |i: usize| {
                let v = u8::from_str_radix(hex.get(i..i + 1)?, 16).ok()?;
                Some(v * 17)
            };
            Some(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, 255]))
        }
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::decode::test_support::solid_image;
    use image::ImageFormat;

    fn logo_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("logo.png");
        let logo = RgbaImage::from_pixel(10, 5, Rgba([0, 0, 255, 255]));
        logo.save(&path).unwrap();
        path
    }

    #[test]
    fn test_parse_color_forms() {
        assert_eq!(parse_color("rgba(204, 204, 204, 0.45)"), Rgba([204, 204, 204, 115]));
        assert_eq!(parse_color("rgb(1,2,3)"), Rgba([1, 2, 3, 255]));
        assert_eq!(parse_color("#ff0080"), Rgba([255, 0, 128, 255]));
        assert_eq!(parse_color("#FFF"), Rgba([255, 255, 255, 255]));
        assert_eq!(parse_color("#00000080"), Rgba([0, 0, 0, 128]));
        assert_eq!(parse_color("chartreuse"), Rgba([204, 204, 204, 115]));
    }

    #[test]
    fn test_anchor_positions() {
        assert_eq!(anchor(Gravity::SouthEast, (100, 50), (10, 5)), (90, 45));
        assert_eq!(anchor(Gravity::NorthWest, (100, 50), (10, 5)), (0, 0));
        assert_eq!(anchor(Gravity::Center, (100, 50), (10, 6)), (45, 22));
        assert_eq!(anchor(Gravity::North, (100, 50), (10, 5)), (45, 0));
    }

    #[test]
    fn test_image_watermark_scaled_and_placed_southeast() {
        let dir = tempfile::tempdir().unwrap();
        let options = WatermarkOptions {
            is_add_watermark: true,
            watermark_type: WatermarkKind::Image,
            watermark_image_path: logo_file(dir.path()).to_string_lossy().into_owned(),
            watermark_scale_ratio: 0.5,
            ..Default::default()
        };
        let source = solid_image(40, 40, ImageFormat::Png);

        let out = add_watermark(&source, &options, ".png", None).unwrap();
        let (image, format) = decode::decode(&out, ".png").unwrap();
        assert_eq!(format, ImageFormat::Png);
        let rgba = image.to_rgba8();
        assert_eq!(rgba.dimensions(), (40, 40));
        // 20x10 mark in the bottom-right corner
        assert_eq!(rgba.get_pixel(39, 39), &Rgba([0, 0, 255, 255]));
        assert_eq!(rgba.get_pixel(0, 0), &Rgba([200, 30, 30, 255]));
    }

    #[test]
    fn test_full_screen_tiles_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let options = WatermarkOptions {
            is_add_watermark: true,
            watermark_type: WatermarkKind::Image,
            is_full_screen_watermark: true,
            watermark_image_path: logo_file(dir.path()).to_string_lossy().into_owned(),
            watermark_scale_ratio: 0.25,
            ..Default::default()
        };
        let source = solid_image(40, 40, ImageFormat::Png);

        let out = add_watermark(&source, &options, ".png", None).unwrap();
        let rgba = decode::decode(&out, ".png").unwrap().0.to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(rgba.get_pixel(39, 39), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_text_watermark_without_font_fails() {
        let options = WatermarkOptions {
            is_add_watermark: true,
            watermark_text: "hello".to_string(),
            ..Default::default()
        };
        let err = create_watermark(&options, 100, None).unwrap_err();
        assert!(err.to_string().contains("no font"));
    }

    #[test]
    fn test_missing_watermark_image_is_read_error() {
        let options = WatermarkOptions {
            is_add_watermark: true,
            watermark_type: WatermarkKind::Image,
            watermark_image_path: "/no/such/logo.png".to_string(),
            ..Default::default()
        };
        let err = create_watermark(&options, 100, None).unwrap_err();
        assert!(matches!(err, PipelineError::Read { .. }));
    }
}
