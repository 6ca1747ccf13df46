//! EXIF detection and removal.

use std::io::Cursor;

use exif::Reader;

use crate::error::PipelineResult;

use super::decode::{self, is_raster};

/// Whether `bytes` carry an EXIF block the reader understands.
pub fn has_exif(bytes: &[u8]) -> bool {
    Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .is_ok()
}

/// Strip metadata by decoding and re-encoding in the source format.
///
/// Returns `None` when there is nothing to strip, so the caller keeps the
/// original bytes and skips staging.
pub fn strip_exif(bytes: &[u8], raw_ext: &str) -> PipelineResult<Option<Vec<u8>>> {
    if !is_raster(raw_ext) || !has_exif(bytes) {
        return Ok(None);
    }
    let (image, format) = decode::decode(bytes, raw_ext)?;
    decode::encode(&image, format, 100).map(Some)
}
