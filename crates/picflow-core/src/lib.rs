//! Picflow Core - embeddable image upload pipeline.
//!
//! Picflow turns a batch of image references (local paths or URLs) into
//! uploaded, addressable images:
//!
//! ```text
//! preprocess → beforeTransform → transform → rename → beforeUpload → upload → afterUpload
//! ```
//!
//! Transformers, uploaders and stage hooks are pluggable handlers registered
//! on the environment's [`Helper`]. Progress and results are published on an
//! [`EventBus`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use picflow_core::{Config, Picflow};
//!
//! #[tokio::main]
//! async fn main() -> picflow_core::Result<()> {
//!     let config = Config::load()?;
//!     let picflow = Picflow::new(config)?;
//!
//!     let ctx = picflow.upload(vec!["./cat.png"]).await?;
//!     for artifact in &ctx.output {
//!         println!("{:?}", artifact.img_url);
//!     }
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod builtin;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod fetch;
pub mod lifecycle;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

// Re-exports for convenient access
pub use config::Config;
pub use context::{RunContext, SharedContext, Stage};
pub use error::{ConfigError, PicflowError, PipelineError, PipelineResult, Result};
pub use events::{EventBus, EventKind, RunEvent};
pub use fetch::{Fetcher, HttpFetcher};
pub use output::{OutputFormat, OutputWriter, RunReport};
pub use registry::{Handler, Helper, Registry};
pub use types::{Artifact, FieldDescriptor, FieldKind, Payload};

use context::SCRATCH_DIR_NAME;
use events::DEFAULT_EVENT_CAPACITY;
use pipeline::font::FontAsset;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Picflow environment - registries, configuration and the event channel
/// shared by every run.
pub struct Picflow {
    pub(crate) config: Arc<Config>,
    pub(crate) helper: Arc<Helper>,
    pub(crate) events: EventBus,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) base_dir: PathBuf,
    pub(crate) font: Arc<FontAsset>,
}

impl Picflow {
    /// Create a new environment that fetches URLs over HTTP.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_fetcher(config, Arc::new(HttpFetcher::new()))
    }

    /// Create a new environment with the default configuration.
    pub fn with_defaults() -> Result<Self> {
        let config = Config::load()?;
        Self::new(config)
    }

    /// Create a new environment with a custom [`Fetcher`].
    ///
    /// Empties and recreates the scratch directory and registers the
    /// built-in `path` transformer and `local` uploader.
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        tracing::debug!("Initializing Picflow v{}", VERSION);

        let base_dir = config.base_dir();
        let scratch = base_dir.join(SCRATCH_DIR_NAME);
        if scratch.exists() {
            std::fs::remove_dir_all(&scratch)?;
        }
        std::fs::create_dir_all(&scratch)?;

        let helper = Helper::new();
        builtin::register(&helper);

        Ok(Self {
            font: Arc::new(FontAsset::new(&base_dir, fetcher.clone())),
            config: Arc::new(config),
            helper: Arc::new(helper),
            events: EventBus::new(DEFAULT_EVENT_CAPACITY),
            fetcher,
            base_dir,
        })
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The five handler registries.
    pub fn helper(&self) -> &Helper {
        &self.helper
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to events of all subsequent runs.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Scratch directory for staged pre-processing output.
    pub fn scratch_dir(&self) -> PathBuf {
        self.base_dir.join(SCRATCH_DIR_NAME)
    }

    /// Field descriptors of a registered transformer/uploader or a
    /// config-only built-in (`compress`, `watermark`, `rename`).
    pub fn field_descriptors(&self, id: &str) -> Option<Vec<FieldDescriptor>> {
        self.helper
            .uploader
            .get(id)
            .or_else(|| self.helper.transformer.get(id))
            .or_else(|| builtin::plugin(id))
            .map(|handler| handler.config(&self.config))
    }

    /// Run the pipeline over `input`, a JSON array of path/URL strings.
    ///
    /// Malformed input is rejected before any work. Run failures are
    /// reported on the event channel and through the returned context's
    /// `error`; with `debug` enabled they are returned as errors instead.
    pub async fn upload(&self, input: impl Into<serde_json::Value>) -> Result<RunContext> {
        let input = input.into();
        let ctx = RunContext::create(self, &input)?;
        lifecycle::run(self, ctx).await
    }
}

impl std::fmt::Debug for Picflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Picflow")
            .field("base_dir", &self.base_dir)
            .field("helper", &self.helper)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.general.base_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_picflow_new_registers_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let picflow = Picflow::new(config_in(dir.path())).unwrap();
        assert!(picflow.helper().transformer.contains("path"));
        assert!(picflow.helper().uploader.contains("local"));
        assert!(picflow.scratch_dir().is_dir());
    }

    #[test]
    fn test_scratch_dir_is_emptied_on_init() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(SCRATCH_DIR_NAME).join("old.png");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, b"x").unwrap();

        let picflow = Picflow::new(config_in(dir.path())).unwrap();
        assert!(!stale.exists());
        assert!(picflow.scratch_dir().is_dir());
    }

    #[test]
    fn test_field_descriptors_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let picflow = Picflow::new(config_in(dir.path())).unwrap();
        assert_eq!(picflow.field_descriptors("local").unwrap().len(), 3);
        assert!(picflow.field_descriptors("rename").is_some());
        assert!(picflow.field_descriptors("nope").is_none());
    }

    #[tokio::test]
    async fn test_upload_rejects_non_list_input() {
        let dir = tempfile::tempdir().unwrap();
        let picflow = Picflow::new(config_in(dir.path())).unwrap();
        let err = picflow.upload("not-a-list").await.unwrap_err();
        assert!(matches!(
            err,
            PicflowError::Pipeline(PipelineError::InvalidInput { .. })
        ));
    }
}
