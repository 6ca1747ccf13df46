//! Error types for the Picflow upload pipeline.
//!
//! Errors are organized by stage so a failed run reports where it stopped
//! (fetch, hook, transform, upload) along with the offending id or path.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Picflow operations.
#[derive(Error, Debug)]
pub enum PicflowError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pipeline errors, organized by stage.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// The run input was not an ordered list of string references
    #[error("Input must be an array of image references, got {found}")]
    InvalidInput { found: String },

    /// A remote source could not be fetched
    #[error("request {url} error, {message}")]
    Fetch { url: String, message: String },

    /// A remote source did not answer in time
    #[error("request {url} timeout after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    /// A local source could not be read
    #[error("read file {path} error: {message}")]
    Read { path: PathBuf, message: String },

    /// A stage hook failed
    #[error("{stage}: {hook} error: {message}")]
    StageHook {
        stage: String,
        hook: String,
        message: String,
    },

    /// The transformer failed to produce artifacts
    #[error("Transformer [{transformer}] failed: {message}")]
    Transform {
        transformer: String,
        message: String,
    },

    /// The uploader adapter failed
    #[error("Uploader [{uploader}] failed: {message}")]
    Upload { uploader: String, message: String },

    /// Raster decode/encode or compositing failed
    #[error("Image processing failed: {message}")]
    Image { message: String },

    /// A handler registry could not resolve anything usable
    #[error("Registry error: {message}")]
    Registry { message: String },
}

impl PipelineError {
    /// Whether this error came from resolving a remote source.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Timeout { .. })
    }
}

/// Convenience type alias for Picflow results.
pub type Result<T> = std::result::Result<T, PicflowError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
