//! Sub-configuration structs with defaults.
//!
//! Keys are camelCase on disk (`buildIn.compress.isReSize`) so the key-path
//! lookup in [`super::Config::get_value`] uses the same names users write.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Transformer used when `picBed.transformer` is unset or unregistered.
pub const DEFAULT_TRANSFORMER: &str = "path";

/// Uploader used when neither `picBed.uploader` nor `picBed.current` resolves.
pub const DEFAULT_UPLOADER: &str = "local";

/// Default text watermark color.
pub const DEFAULT_WATERMARK_COLOR: &str = "rgba(204, 204, 204, 0.45)";

/// Default watermark width relative to the image width.
pub const DEFAULT_WATERMARK_SCALE_RATIO: f32 = 0.15;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneralConfig {
    /// Base directory for scratch files and shared assets
    pub base_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("~/.picflow"),
        }
    }
}

/// Built-in pre-processing and rename settings (`buildIn.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildInConfig {
    /// Compression, resize, rotation, conversion and exif stripping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<CompressOptions>,

    /// Text or image watermarking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark: Option<WatermarkOptions>,

    /// File name templating applied after transformation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename: Option<RenameOptions>,
}

/// Compression and conversion settings (`buildIn.compress`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressOptions {
    /// Output quality, 1-100. Values below 100 trigger re-encoding.
    pub quality: u32,

    /// Convert to `convert_format`
    pub is_convert: bool,

    /// Target format extension (without dot)
    pub convert_format: String,

    /// Enable resizing
    #[serde(rename = "isReSize")]
    pub is_resize: bool,

    /// Absolute target width (0 = unset)
    #[serde(rename = "reSizeWidth")]
    pub resize_width: u32,

    /// Absolute target height (0 = unset)
    #[serde(rename = "reSizeHeight")]
    pub resize_height: u32,

    /// Resize by percentage instead of absolute size
    #[serde(rename = "isReSizeByPercent")]
    pub is_resize_by_percent: bool,

    /// Percentage for percent-based resize, (0, 100] (0 = unset)
    #[serde(rename = "reSizePercent")]
    pub resize_percent: f64,

    /// Leave images alone when they are already within the requested size
    #[serde(rename = "skipReSizeOfSmallImg")]
    pub skip_resize_of_small_img: bool,

    /// Enable rotation
    pub is_rotate: bool,

    /// Rotation in degrees (clockwise)
    pub rotate_degree: f32,

    /// Strip metadata when no other transformation re-encodes the image
    pub is_remove_exif: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            quality: 100,
            is_convert: false,
            convert_format: "jpg".to_string(),
            is_resize: false,
            resize_width: 0,
            resize_height: 0,
            is_resize_by_percent: false,
            resize_percent: 0.0,
            skip_resize_of_small_img: false,
            is_rotate: false,
            rotate_degree: 0.0,
            is_remove_exif: false,
        }
    }
}

impl CompressOptions {
    /// Target format for conversion, lowercased and without a leading dot.
    pub fn target_format(&self) -> String {
        let format = self.convert_format.trim().trim_start_matches('.');
        if format.is_empty() {
            "jpg".to_string()
        } else {
            format.to_lowercase()
        }
    }

    /// Effective encoder quality (100 when unset or out of range).
    pub fn effective_quality(&self) -> u8 {
        if self.quality > 0 && self.quality < 100 {
            self.quality as u8
        } else {
            100
        }
    }
}

/// Watermark payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkKind {
    #[default]
    Text,
    Image,
}

/// Anchor position for a single (non-tiled) watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gravity {
    North,
    NorthEast,
    East,
    #[default]
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    #[serde(alias = "centre")]
    Center,
}

/// Watermark settings (`buildIn.watermark`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatermarkOptions {
    /// Enable watermarking
    pub is_add_watermark: bool,

    /// Text or image watermark
    pub watermark_type: WatermarkKind,

    /// Tile the watermark across the whole image
    pub is_full_screen_watermark: bool,

    /// Watermark rotation in degrees
    pub watermark_degree: f32,

    /// Text for text watermarks
    pub watermark_text: String,

    /// TTF font for text watermarks (empty = shared font asset)
    pub watermark_font_path: String,

    /// Watermark width relative to the image width, (0, 1]
    pub watermark_scale_ratio: f32,

    /// Text color: `rgba(r, g, b, a)`, `rgb(r, g, b)` or `#rrggbb[aa]`
    pub watermark_color: String,

    /// Image file for image watermarks
    pub watermark_image_path: String,

    /// Anchor position
    pub watermark_position: Gravity,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            is_add_watermark: false,
            watermark_type: WatermarkKind::Text,
            is_full_screen_watermark: false,
            watermark_degree: 0.0,
            watermark_text: String::new(),
            watermark_font_path: String::new(),
            watermark_scale_ratio: DEFAULT_WATERMARK_SCALE_RATIO,
            watermark_color: DEFAULT_WATERMARK_COLOR.to_string(),
            watermark_image_path: String::new(),
            watermark_position: Gravity::SouthEast,
        }
    }
}

impl WatermarkOptions {
    /// Whether a payload for the configured kind is present.
    pub fn has_payload(&self) -> bool {
        match self.watermark_type {
            WatermarkKind::Text => !self.watermark_text.trim().is_empty(),
            WatermarkKind::Image => !self.watermark_image_path.trim().is_empty(),
        }
    }

    /// Text watermark without an explicit font needs the shared font asset.
    pub fn needs_shared_font(&self) -> bool {
        self.watermark_type == WatermarkKind::Text && self.watermark_font_path.trim().is_empty()
    }

    /// Scale ratio clamped to (0, 1], falling back to the default.
    pub fn effective_scale_ratio(&self) -> f32 {
        if self.watermark_scale_ratio > 0.0 && self.watermark_scale_ratio <= 1.0 {
            self.watermark_scale_ratio
        } else {
            DEFAULT_WATERMARK_SCALE_RATIO
        }
    }
}

/// Rename settings (`buildIn.rename`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameOptions {
    /// Apply the template after transformation
    pub enable: bool,

    /// Template, e.g. `{Y}/{m}/{md5-16}`
    pub format: String,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            enable: false,
            format: "{filename}".to_string(),
        }
    }
}

/// Transformer/uploader selection plus per-backend tables (`picBed.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PicBedConfig {
    /// Transformer id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformer: Option<String>,

    /// Uploader id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,

    /// Legacy uploader id, consulted when `uploader` is unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,

    /// Backend-specific tables such as `picBed.local`
    #[serde(flatten)]
    pub backends: BTreeMap<String, serde_json::Value>,
}

impl PicBedConfig {
    /// Configured transformer id, defaulting to `path`.
    pub fn transformer_id(&self) -> &str {
        non_empty(&self.transformer).unwrap_or(DEFAULT_TRANSFORMER)
    }

    /// Configured uploader id: `uploader`, then `current`, then the default.
    pub fn uploader_id(&self) -> &str {
        non_empty(&self.uploader)
            .or_else(|| non_empty(&self.current))
            .unwrap_or(DEFAULT_UPLOADER)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Run-level settings (`settings.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsConfig {
    /// Percent-encode summary URLs that are not already encoded
    #[serde(rename = "encodeOutputURL")]
    pub encode_output_url: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uploader_id_fallback_chain() {
        let mut pic_bed = PicBedConfig::default();
        assert_eq!(pic_bed.uploader_id(), DEFAULT_UPLOADER);

        pic_bed.current = Some("github".to_string());
        assert_eq!(pic_bed.uploader_id(), "github");

        pic_bed.uploader = Some("sftp".to_string());
        assert_eq!(pic_bed.uploader_id(), "sftp");

        pic_bed.uploader = Some("  ".to_string());
        assert_eq!(pic_bed.uploader_id(), "github");
    }

    #[test]
    fn test_transformer_id_default() {
        let pic_bed = PicBedConfig::default();
        assert_eq!(pic_bed.transformer_id(), "path");
    }

    #[test]
    fn test_compress_target_format_normalized() {
        let options = CompressOptions {
            convert_format: ".WEBP".to_string(),
            ..Default::default()
        };
        assert_eq!(options.target_format(), "webp");

        let options = CompressOptions {
            convert_format: String::new(),
            ..Default::default()
        };
        assert_eq!(options.target_format(), "jpg");
    }

    #[test]
    fn test_effective_quality() {
        let mut options = CompressOptions::default();
        assert_eq!(options.effective_quality(), 100);
        options.quality = 75;
        assert_eq!(options.effective_quality(), 75);
        options.quality = 0;
        assert_eq!(options.effective_quality(), 100);
    }

    #[test]
    fn test_watermark_payload_by_kind() {
        let mut options = WatermarkOptions {
            watermark_text: "hello".to_string(),
            ..Default::default()
        };
        assert!(options.has_payload());
        assert!(options.needs_shared_font());

        options.watermark_type = WatermarkKind::Image;
        assert!(!options.has_payload());
        options.watermark_image_path = "/tmp/logo.png".to_string();
        assert!(options.has_payload());
        assert!(!options.needs_shared_font());
    }

    #[test]
    fn test_gravity_accepts_centre_alias() {
        let gravity: Gravity = serde_json::from_str("\"centre\"").unwrap();
        assert_eq!(gravity, Gravity::Center);
        let gravity: Gravity = serde_json::from_str("\"northwest\"").unwrap();
        assert_eq!(gravity, Gravity::NorthWest);
    }

    #[test]
    fn test_scale_ratio_out_of_range_falls_back() {
        let options = WatermarkOptions {
            watermark_scale_ratio: 3.0,
            ..Default::default()
        };
        assert_eq!(options.effective_scale_ratio(), DEFAULT_WATERMARK_SCALE_RATIO);
    }
}
