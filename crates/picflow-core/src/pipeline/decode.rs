//! Raster decode/encode helpers shared by the pre-processing steps.
//!
//! All functions here are synchronous and CPU-bound; async callers go
//! through [`run_blocking`].

use std::io::Cursor;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use tokio::time::timeout;

use crate::error::{PipelineError, PipelineResult};

/// Upper bound for one blocking image operation.
pub const IMAGE_OP_TIMEOUT: Duration = Duration::from_secs(120);

/// Extensions (without dot) the raster steps can decode.
pub const RASTER_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif", "ico",
];

/// Extensions (without dot) the raster steps can encode.
pub const WRITABLE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif", "ico",
];

/// Lowercase an extension and strip its leading dot.
pub fn bare_ext(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// `jpeg` and `jpg` name the same format.
pub fn same_format(a: &str, b: &str) -> bool {
    let canon = |ext: &str| match bare_ext(ext).as_str() {
        "jpeg" => "jpg".to_string(),
        "tif" => "tiff".to_string(),
        other => other.to_string(),
    };
    canon(a) == canon(b)
}

pub fn is_raster(ext: &str) -> bool {
    RASTER_EXTENSIONS.contains(&bare_ext(ext).as_str())
}

pub fn is_writable(ext: &str) -> bool {
    WRITABLE_EXTENSIONS.contains(&bare_ext(ext).as_str())
}

/// Map an extension to an `image` format.
pub fn format_from_ext(ext: &str) -> Option<ImageFormat> {
    ImageFormat::from_extension(bare_ext(ext))
}

/// Canonical extension (without dot) for a format.
pub fn format_to_ext(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Ico => "ico",
        ImageFormat::Avif => "avif",
        _ => "bin",
    }
}

/// Decode bytes, detecting the format from content and falling back to the
/// extension hint.
pub fn decode(bytes: &[u8], ext_hint: &str) -> PipelineResult<(DynamicImage, ImageFormat)> {
    let mut reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::Image {
            message: format!("cannot detect image format: {e}"),
        })?;
    let format = reader
        .format()
        .or_else(|| format_from_ext(ext_hint))
        .ok_or_else(|| PipelineError::Image {
            message: format!("unsupported image format '{}'", bare_ext(ext_hint)),
        })?;
    reader.set_format(format);
    let image = reader.decode().map_err(|e| PipelineError::Image {
        message: e.to_string(),
    })?;
    Ok((image, format))
}

/// Encode an image. `quality` (1-100) applies to JPEG only.
pub fn encode(image: &DynamicImage, format: ImageFormat, quality: u8) -> PipelineResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    let result = match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            image.to_rgb8().write_with_encoder(encoder)
        }
        _ => DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut out, format),
    };
    result.map_err(|e| PipelineError::Image {
        message: format!("encode {}: {e}", format_to_ext(format)),
    })?;
    Ok(out.into_inner())
}

/// Read pixel dimensions from the header without a full decode.
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Run CPU-bound image work off the async runtime, bounded by
/// [`IMAGE_OP_TIMEOUT`].
pub async fn run_blocking<T, F>(op: &str, f: F) -> PipelineResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> PipelineResult<T> + Send + 'static,
{
    match timeout(IMAGE_OP_TIMEOUT, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(PipelineError::Image {
            message: format!("{op}: task join error: {e}"),
        }),
        Err(_) => Err(PipelineError::Image {
            message: format!("{op}: timed out after {}s", IMAGE_OP_TIMEOUT.as_secs()),
        }),
    }
}
