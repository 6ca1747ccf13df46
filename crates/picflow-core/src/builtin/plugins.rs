//! Config-only built-ins: `compress`, `watermark` and `rename`.
//!
//! Their work happens inside the orchestrator (pre-processing and the rename
//! stage). As handlers they only describe their options.

use async_trait::async_trait;

use crate::config::{Config, RenameOptions, WatermarkOptions};
use crate::context::SharedContext;
use crate::error::PipelineResult;
use crate::registry::Handler;
use crate::types::FieldDescriptor;

const GRAVITIES: &[&str] = &[
    "north",
    "northeast",
    "east",
    "southeast",
    "south",
    "southwest",
    "west",
    "northwest",
    "center",
];

#[derive(Debug, Default)]
pub struct CompressPlugin;

#[async_trait]
impl Handler for CompressPlugin {
    fn name(&self) -> &str {
        "compress"
    }

    async fn handle(&self, _ctx: &SharedContext) -> PipelineResult<()> {
        Ok(())
    }

    fn config(&self, config: &Config) -> Vec<FieldDescriptor> {
        let c = config.build_in.compress.clone().unwrap_or_default();
        let percent = if c.resize_percent == 0.0 { 50.0 } else { c.resize_percent };
        let degree = if c.rotate_degree == 0.0 { 90.0 } else { c.rotate_degree };
        vec![
            FieldDescriptor::input("quality", "Quality (1-100)", c.quality),
            FieldDescriptor::confirm("isConvert", "Convert format", c.is_convert),
            FieldDescriptor::list(
                "convertFormat",
                "Target format",
                &c.target_format(),
                &["jpg", "png", "webp", "gif", "bmp", "tiff", "ico"],
            ),
            FieldDescriptor::confirm("isReSize", "Resize", c.is_resize),
            FieldDescriptor::input("reSizeWidth", "Width", c.resize_width),
            FieldDescriptor::input("reSizeHeight", "Height", c.resize_height),
            FieldDescriptor::confirm(
                "skipReSizeOfSmallImg",
                "Skip images smaller than the target",
                c.skip_resize_of_small_img,
            ),
            FieldDescriptor::confirm("isReSizeByPercent", "Resize by percent", c.is_resize_by_percent),
            FieldDescriptor::input("reSizePercent", "Percent", percent),
            FieldDescriptor::confirm("isRotate", "Rotate", c.is_rotate),
            FieldDescriptor::input("rotateDegree", "Degree", degree),
            FieldDescriptor::confirm("isRemoveExif", "Remove EXIF", c.is_remove_exif),
        ]
    }
}

#[derive(Debug, Default)]
pub struct WatermarkPlugin;

#[async_trait]
impl Handler for WatermarkPlugin {
    fn name(&self) -> &str {
        "watermark"
    }

    async fn handle(&self, _ctx: &SharedContext) -> PipelineResult<()> {
        Ok(())
    }

    fn config(&self, config: &Config) -> Vec<FieldDescriptor> {
        let w: WatermarkOptions = config.build_in.watermark.clone().unwrap_or_default();
        let kind = serde_json::to_value(w.watermark_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "text".to_string());
        let position = serde_json::to_value(w.watermark_position)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "southeast".to_string());
        vec![
            FieldDescriptor::confirm("isAddWatermark", "Add watermark", w.is_add_watermark),
            FieldDescriptor::list("watermarkType", "Watermark type", &kind, &["text", "image"]),
            FieldDescriptor::confirm(
                "isFullScreenWatermark",
                "Tile across the image",
                w.is_full_screen_watermark,
            ),
            FieldDescriptor::input("watermarkDegree", "Rotation", w.watermark_degree),
            FieldDescriptor::input("watermarkText", "Text", w.watermark_text.clone()),
            FieldDescriptor::input("watermarkFontPath", "Font path", w.watermark_font_path.clone()),
            FieldDescriptor::input("watermarkScaleRatio", "Scale ratio", w.watermark_scale_ratio),
            FieldDescriptor::input("watermarkColor", "Text color", w.watermark_color.clone()),
            FieldDescriptor::input(
                "watermarkImagePath",
                "Image path",
                w.watermark_image_path.clone(),
            ),
            FieldDescriptor::list("watermarkPosition", "Position", &position, GRAVITIES),
        ]
    }
}

#[derive(Debug, Default)]
pub struct RenamePlugin;

#[async_trait]
impl Handler for RenamePlugin {
    fn name(&self) -> &str {
        "rename"
    }

    async fn handle(&self, _ctx: &SharedContext) -> PipelineResult<()> {
        Ok(())
    }

    fn config(&self, config: &Config) -> Vec<FieldDescriptor> {
        let r: RenameOptions = config.build_in.rename.clone().unwrap_or_default();
        let format = if r.format.trim().is_empty() {
            "{filename}".to_string()
        } else {
            r.format
        };
        vec![
            FieldDescriptor::input("format", "Rename template", format),
            FieldDescriptor::confirm("enable", "Enable rename", r.enable),
        ]
    }
}
