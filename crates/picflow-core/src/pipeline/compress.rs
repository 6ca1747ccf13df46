//! Compression, resize, rotation and format conversion.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

use crate::config::CompressOptions;
use crate::error::{PipelineError, PipelineResult};

use super::decode::{self, bare_ext, is_raster, is_writable, same_format};

/// Format substituted when the uploader rejects the requested one.
pub const FALLBACK_FORMAT: &str = "png";

const TRANSPARENT: Rgba<u8> = Rgba([255, 255, 255, 0]);

/// Encoded result of [`image_process`].
#[derive(Debug, Clone)]
pub struct Processed {
    pub bytes: Vec<u8>,
    /// Output extension without dot
    pub ext: String,
}

/// Resize/rotate/convert `bytes` according to `options`.
///
/// Non-raster input is returned untouched. `rejected` lists formats the
/// destination uploader refuses; a rejected target becomes PNG.
pub fn image_process(
    bytes: &[u8],
    options: &CompressOptions,
    raw_ext: &str,
    rejected: &[&str],
) -> PipelineResult<Processed> {
    let raw = bare_ext(raw_ext);
    if !is_raster(&raw) {
        return Ok(Processed {
            bytes: bytes.to_vec(),
            ext: raw,
        });
    }

    let (mut image, _) = decode::decode(bytes, &raw)?;
    image = resize(image, options);
    if options.is_rotate && options.rotate_degree != 0.0 {
        image = rotate_expanded(&image, options.rotate_degree);
    }

    let ext = output_ext(options, &raw, rejected);
    let format = decode::format_from_ext(&ext).ok_or_else(|| PipelineError::Image {
        message: format!("unsupported output format '{ext}'"),
    })?;
    let bytes = decode::encode(&image, format, options.effective_quality())?;
    Ok(Processed { bytes, ext })
}

/// Output extension: convert target, else the source format when writable,
/// else jpg. Rejected targets fall back to [`FALLBACK_FORMAT`].
pub fn output_ext(options: &CompressOptions, raw_ext: &str, rejected: &[&str]) -> String {
    let target = if options.is_convert {
        options.target_format()
    } else if is_writable(raw_ext) {
        bare_ext(raw_ext)
    } else {
        "jpg".to_string()
    };
    if rejected.iter().any(|r| same_format(r, &target)) {
        tracing::debug!("Format {} rejected by uploader, using {}", target, FALLBACK_FORMAT);
        return FALLBACK_FORMAT.to_string();
    }
    target
}

fn resize(image: DynamicImage, options: &CompressOptions) -> DynamicImage {
    if !options.is_resize {
        return image;
    }
    let (width, height) = image.dimensions();

    if options.is_resize_by_percent {
        let percent = options.resize_percent;
        if percent <= 0.0 || percent > 100.0 {
            return image;
        }
        let scale = |v: u32| ((v as f64 * percent / 100.0).round() as u32).max(1);
        return image.resize_exact(scale(width), scale(height), FilterType::Lanczos3);
    }

    let (target_w, target_h) = (options.resize_width, options.resize_height);
    match (target_w, target_h) {
        (0, 0) => image,
        (w, h) if w > 0 && h > 0 => image.resize_exact(w, h, FilterType::Lanczos3),
        (w, 0) => {
            if options.skip_resize_of_small_img && width <= w {
                return image;
            }
            let h = ((height as f64 * w as f64 / width as f64).round() as u32).max(1);
            image.resize_exact(w, h, FilterType::Lanczos3)
        }
        (0, h) => {
            if options.skip_resize_of_small_img && height <= h {
                return image;
            }
            let w = ((width as f64 * h as f64 / height as f64).round() as u32).max(1);
            image.resize_exact(w, h, FilterType::Lanczos3)
        }
        _ => image,
    }
}

/// Rotate clockwise by `degrees`, growing the canvas to fit and filling the
/// exposed corners with transparent pixels.
pub fn rotate_expanded(image: &DynamicImage, degrees: f32) -> DynamicImage {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 {
        return image.clone();
    }
    if normalized == 90.0 {
        return image.rotate90();
    }
    if normalized == 180.0 {
        return image.rotate180();
    }
    if normalized == 270.0 {
        return image.rotate270();
    }

    let rgba = image.to_rgba8();
    DynamicImage::ImageRgba8(rotate_rgba(&rgba, normalized))
}

pub(crate) fn rotate_rgba(rgba: &RgbaImage, degrees: f32) -> RgbaImage {
    let (w, h) = rgba.dimensions();
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let out_w = ((w as f32 * cos + h as f32 * sin).ceil() as u32).max(1);
    let out_h = ((w as f32 * sin + h as f32 * cos).ceil() as u32).max(1);

    // Pad to the diagonal so no source pixel leaves the canvas while rotating.
    let side = ((w as f32).hypot(h as f32).ceil() as u32).max(out_w).max(out_h);
    let mut canvas = RgbaImage::from_pixel(side, side, TRANSPARENT);
    imageops::overlay(
        &mut canvas,
        rgba,
        ((side - w) / 2) as i64,
        ((side - h) / 2) as i64,
    );
    let rotated = rotate_about_center(&canvas, theta, Interpolation::Bilinear, TRANSPARENT);

    imageops::crop_imm(&rotated, (side - out_w) / 2, (side - out_h) / 2, out_w, out_h).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::decode::{probe_dimensions, test_support::solid_image};
    use image::ImageFormat;

    fn png(width: u32, height: u32) -> Vec<u8> {
        solid_image(width, height, ImageFormat::Png)
    }

    fn dims(processed: &Processed) -> (u32, u32) {
        probe_dimensions(&processed.bytes).unwrap()
    }

    #[test]
    fn test_percent_resize_rounds_both_axes() {
        let options = CompressOptions {
            is_resize: true,
            is_resize_by_percent: true,
            resize_percent: 33.0,
            ..Default::default()
        };
        let out = image_process(&png(200, 101), &options, ".png", &[]).unwrap();
        assert_eq!(dims(&out), (66, 33));
    }

    #[test]
    fn test_fractional_percent_resize() {
        let options = CompressOptions {
            is_resize: true,
            is_resize_by_percent: true,
            resize_percent: 12.5,
            ..Default::default()
        };
        let out = image_process(&png(200, 100), &options, ".png", &[]).unwrap();
        assert_eq!(dims(&out), (25, 13));
    }

    #[test]
    fn test_absolute_resize_both_dims_stretches() {
        let options = CompressOptions {
            is_resize: true,
            resize_width: 30,
            resize_height: 70,
            ..Default::default()
        };
        let out = image_process(&png(200, 100), &options, ".png", &[]).unwrap();
        assert_eq!(dims(&out), (30, 70));
    }

    #[test]
    fn test_height_only_keeps_aspect() {
        let options = CompressOptions {
            is_resize: true,
            resize_height: 50,
            ..Default::default()
        };
        let out = image_process(&png(200, 100), &options, ".png", &[]).unwrap();
        assert_eq!(dims(&out), (100, 50));
    }

    #[test]
    fn test_skip_resize_of_small_image() {
        let options = CompressOptions {
            is_resize: true,
            resize_width: 400,
            skip_resize_of_small_img: true,
            ..Default::default()
        };
        let out = image_process(&png(200, 100), &options, ".png", &[]).unwrap();
        assert_eq!(dims(&out), (200, 100));

        let options = CompressOptions {
            skip_resize_of_small_img: false,
            ..options
        };
        let out = image_process(&png(200, 100), &options, ".png", &[]).unwrap();
        assert_eq!(dims(&out), (400, 200));
    }

    #[test]
    fn test_rotate_quarter_turn_swaps_dims() {
        let options = CompressOptions {
            is_rotate: true,
            rotate_degree: 90.0,
            ..Default::default()
        };
        let out = image_process(&png(40, 10), &options, ".png", &[]).unwrap();
        assert_eq!(dims(&out), (10, 40));
    }

    #[test]
    fn test_rotate_arbitrary_expands_with_transparent_corners() {
        let source = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255])));
        let rotated = rotate_expanded(&source, 45.0).to_rgba8();
        assert!(rotated.width() > 20 && rotated.height() > 20);
        assert_eq!(rotated.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_convert_changes_format() {
        let options = CompressOptions {
            is_convert: true,
            convert_format: "jpg".to_string(),
            ..Default::default()
        };
        let out = image_process(&png(8, 8), &options, ".png", &[]).unwrap();
        assert_eq!(out.ext, "jpg");
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_rejected_target_falls_back_to_png() {
        let options = CompressOptions {
            is_convert: true,
            convert_format: "webp".to_string(),
            ..Default::default()
        };
        assert_eq!(output_ext(&options, ".jpg", &["webp"]), "png");
        assert_eq!(output_ext(&options, ".jpg", &[]), "webp");
    }

    #[test]
    fn test_non_raster_passthrough() {
        let options = CompressOptions {
            quality: 10,
            ..Default::default()
        };
        let out = image_process(b"<svg/>", &options, ".svg", &[]).unwrap();
        assert_eq!(out.bytes, b"<svg/>");
        assert_eq!(out.ext, "svg");
    }

    #[test]
    fn test_quality_shrinks_jpeg() {
        let noisy = {
            let mut img = RgbaImage::new(64, 64);
            for (x, y, px) in img.enumerate_pixels_mut() {
                *px = Rgba([(x * 7 % 255) as u8, (y * 13 % 255) as u8, ((x ^ y) % 255) as u8, 255]);
            }
            decode::encode(&DynamicImage::ImageRgba8(img), ImageFormat::Jpeg, 100).unwrap()
        };
        let options = CompressOptions {
            quality: 20,
            ..Default::default()
        };
        let out = image_process(&noisy, &options, ".jpg", &[]).unwrap();
        assert!(out.bytes.len() < noisy.len());
    }
}
