//! Per-item pre-processing decision.
//!
//! A pure function of (compress options, watermark options, extension), so URL
//! and filesystem sources with the same extension always get the same plan.

use crate::config::{CompressOptions, WatermarkOptions};

use super::decode::{is_raster, same_format};

/// What pre-processing an item needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessDecision {
    Skip,
    WatermarkOnly,
    CompressOnly,
    Both,
    ExifStripOnly,
}

impl PreprocessDecision {
    pub fn watermark(self) -> bool {
        matches!(self, Self::WatermarkOnly | Self::Both)
    }

    pub fn compress(self) -> bool {
        matches!(self, Self::CompressOnly | Self::Both)
    }
}

/// Decide the plan for one item with extension `ext`.
pub fn decide(
    compress: Option<&CompressOptions>,
    watermark: Option<&WatermarkOptions>,
    ext: &str,
) -> PreprocessDecision {
    let watermark = needs_watermark(watermark, ext);
    let compress_needed = needs_compress(compress, ext);
    match (watermark, compress_needed) {
        (true, true) => PreprocessDecision::Both,
        (true, false) => PreprocessDecision::WatermarkOnly,
        (false, true) => PreprocessDecision::CompressOnly,
        (false, false) if compress.is_some_and(|c| c.is_remove_exif) => {
            PreprocessDecision::ExifStripOnly
        }
        (false, false) => PreprocessDecision::Skip,
    }
}

/// Watermark only enabled raster images that have a payload to draw.
pub fn needs_watermark(options: Option<&WatermarkOptions>, ext: &str) -> bool {
    options.is_some_and(|o| o.is_add_watermark && o.has_payload()) && is_raster(ext)
}

/// Compression/conversion is needed when any option would change the output.
pub fn needs_compress(options: Option<&CompressOptions>, ext: &str) -> bool {
    let Some(options) = options else {
        return false;
    };
    if !is_raster(ext) {
        return false;
    }
    if options.quality > 0 && options.quality < 100 {
        return true;
    }
    if options.is_resize {
        if options.is_resize_by_percent {
            if options.resize_percent > 0.0 && options.resize_percent <= 100.0 {
                return true;
            }
        } else if options.resize_width > 0 || options.resize_height > 0 {
            return true;
        }
    }
    if options.is_rotate && options.rotate_degree != 0.0 {
        return true;
    }
    options.is_convert && !same_format(&options.target_format(), ext)
}
