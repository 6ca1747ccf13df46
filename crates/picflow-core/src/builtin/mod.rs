//! Built-in handlers registered by every environment.

mod local;
mod path;
mod plugins;

use std::sync::Arc;

pub use local::{LocalConfig, LocalUploader};
pub use path::PathTransformer;
pub use plugins::{CompressPlugin, RenamePlugin, WatermarkPlugin};

use crate::config::{DEFAULT_TRANSFORMER, DEFAULT_UPLOADER};
use crate::registry::{Handler, Helper};

/// Register the default transformer and uploader.
pub fn register(helper: &Helper) {
    helper
        .transformer
        .register(DEFAULT_TRANSFORMER, Arc::new(PathTransformer));
    helper
        .uploader
        .register(DEFAULT_UPLOADER, Arc::new(LocalUploader));
}

/// Config-only built-ins, looked up by id.
pub fn plugin(id: &str) -> Option<Arc<dyn Handler>> {
    match id {
        "compress" => Some(Arc::new(CompressPlugin)),
        "watermark" => Some(Arc::new(WatermarkPlugin)),
        "rename" => Some(Arc::new(RenamePlugin)),
        _ => None,
    }
}

/// Any built-in handler by id, without building an environment.
pub fn lookup(id: &str) -> Option<Arc<dyn Handler>> {
    match id {
        DEFAULT_TRANSFORMER => Some(Arc::new(PathTransformer)),
        DEFAULT_UPLOADER => Some(Arc::new(LocalUploader)),
        other => plugin(other),
    }
}
