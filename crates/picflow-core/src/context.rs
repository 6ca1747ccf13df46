//! Per-run execution context.
//!
//! Every run gets its own [`RunContext`]: a private copy of the caller's
//! references plus handles to the shared (read-mostly) configuration,
//! registries and event bus. Handlers see it through [`SharedContext`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventBus, EventKind};
use crate::fetch::Fetcher;
use crate::registry::Helper;
use crate::types::Artifact;
use crate::Picflow;

/// Name of the scratch directory under the base directory.
pub const SCRATCH_DIR_NAME: &str = "picflowTemp";

/// Position of a run in the stage pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Created,
    PreTransform,
    Transform,
    Rename,
    PreUpload,
    Upload,
    PostUpload,
    Finished,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Created => "created",
            Stage::PreTransform => "beforeTransform",
            Stage::Transform => "transform",
            Stage::Rename => "rename",
            Stage::PreUpload => "beforeUpload",
            Stage::Upload => "upload",
            Stage::PostUpload => "afterUpload",
            Stage::Finished => "finished",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Isolated state of one invocation.
#[derive(Clone)]
pub struct RunContext {
    /// Unique id, attached to every event of this run
    pub run_id: Uuid,

    /// Working references; pre-processing may point entries at staged files
    pub input: Vec<String>,

    /// Resolved pre-staging path or URL per input, used by rename
    pub raw_input_path: Vec<String>,

    /// Artifacts produced by the transformer, in input order
    pub output: Vec<Artifact>,

    /// Current stage
    pub stage: Stage,

    /// Error that moved the run to `Failed`
    pub error: Option<PipelineError>,

    raw_input: Arc<[String]>,
    config: Arc<Config>,
    helper: Arc<Helper>,
    events: EventBus,
    fetcher: Arc<dyn Fetcher>,
    base_dir: PathBuf,
}

impl RunContext {
    /// Build a fresh context for `input`.
    ///
    /// `input` must be a JSON array of strings; anything else is rejected
    /// before any work happens.
    pub fn create(parent: &Picflow, input: &serde_json::Value) -> PipelineResult<Self> {
        let references = parse_input(input)?;
        Ok(Self::from_references(parent, references))
    }

    /// Build a fresh context from an already typed reference list.
    pub fn from_references(parent: &Picflow, references: Vec<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            raw_input: Arc::from(references.clone()),
            input: references,
            raw_input_path: Vec::new(),
            output: Vec::new(),
            stage: Stage::Created,
            error: None,
            config: parent.config.clone(),
            helper: parent.helper.clone(),
            events: parent.events.clone(),
            fetcher: parent.fetcher.clone(),
            base_dir: parent.base_dir.clone(),
        }
    }

    /// The caller's original references, never modified by the run.
    pub fn raw_input(&self) -> &[String] {
        &self.raw_input
    }

    /// Put the caller's references back into `input`.
    pub fn restore_input(&mut self) {
        self.input = self.raw_input.to_vec();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Typed key-path lookup against the configuration.
    pub fn get_config<T: DeserializeOwned>(&self, key_path: &str) -> Option<T> {
        self.config.get(key_path)
    }

    pub fn helper(&self) -> &Helper {
        &self.helper
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Publish an event tagged with this run's id.
    pub fn emit(&self, kind: EventKind) {
        self.events.emit(self.run_id, kind);
    }

    pub fn fetcher(&self) -> Arc<dyn Fetcher> {
        self.fetcher.clone()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Process-wide scratch directory for staged files.
    pub fn scratch_dir(&self) -> PathBuf {
        self.base_dir.join(SCRATCH_DIR_NAME)
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("stage", &self.stage)
            .field("input", &self.input)
            .field("raw_input", &self.raw_input)
            .field("output", &self.output.len())
            .finish()
    }
}

fn parse_input(input: &serde_json::Value) -> PipelineResult<Vec<String>> {
    let items = input.as_array().ok_or_else(|| PipelineError::InvalidInput {
        found: json_kind(input).to_string(),
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| PipelineError::InvalidInput {
                    found: format!("an array containing {}", json_kind(item)),
                })
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Handle to a run context shared between the orchestrator and handlers.
///
/// Hooks of one stage run concurrently, so access goes through an async
/// mutex. Hold the guard only for short, non-blocking sections.
#[derive(Clone)]
pub struct SharedContext {
    inner: Arc<Mutex<RunContext>>,
    run_id: Uuid,
    events: EventBus,
}

impl SharedContext {
    pub fn new(ctx: RunContext) -> Self {
        Self {
            run_id: ctx.run_id,
            events: ctx.events.clone(),
            inner: Arc::new(Mutex::new(ctx)),
        }
    }

    /// Lock the context.
    pub async fn lock(&self) -> MutexGuard<'_, RunContext> {
        self.inner.lock().await
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Publish an event without taking the lock.
    pub fn emit(&self, kind: EventKind) {
        self.events.emit(self.run_id, kind);
    }

    /// Take the context back. Detached hook tasks may still hold a handle,
    /// in which case a snapshot is returned.
    pub async fn into_inner(self) -> RunContext {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().await.clone(),
        }
    }
}

impl std::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedContext")
            .field("run_id", &self.run_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpFetcher;
    use serde_json::json;

    fn picflow(dir: &Path) -> Picflow {
        let mut config = Config::default();
        config.general.base_dir = dir.to_path_buf();
        Picflow::with_fetcher(config, Arc::new(HttpFetcher::new())).unwrap()
    }

    #[test]
    fn test_create_rejects_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let parent = picflow(dir.path());
        let err = RunContext::create(&parent, &json!("not-a-list")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput { .. }));
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn test_create_rejects_non_string_items() {
        let dir = tempfile::tempdir().unwrap();
        let parent = picflow(dir.path());
        let err = RunContext::create(&parent, &json!(["a.png", 3])).unwrap_err();
        assert!(err.to_string().contains("a number"));
    }

    #[test]
    fn test_contexts_do_not_alias() {
        let dir = tempfile::tempdir().unwrap();
        let parent = picflow(dir.path());
        let input = json!(["/a.png", "/b.png"]);

        let mut first = RunContext::create(&parent, &input).unwrap();
        let second = RunContext::create(&parent, &input).unwrap();
        first.input[0] = "/staged.png".to_string();

        assert_eq!(second.input[0], "/a.png");
        assert_eq!(first.raw_input()[0], "/a.png");
        assert_ne!(first.run_id, second.run_id);
        assert!(first.output.is_empty());
        assert!(first.raw_input_path.is_empty());
    }

    #[test]
    fn test_restore_input() {
        let dir = tempfile::tempdir().unwrap();
        let parent = picflow(dir.path());
        let mut ctx = RunContext::create(&parent, &json!(["/a.png"])).unwrap();
        ctx.input[0] = "/tmp/staged.png".to_string();
        ctx.restore_input();
        assert_eq!(ctx.input, vec!["/a.png".to_string()]);
    }

    #[tokio::test]
    async fn test_shared_context_into_inner_with_outstanding_handle() {
        let dir = tempfile::tempdir().unwrap();
        let parent = picflow(dir.path());
        let ctx = RunContext::create(&parent, &json!(["/a.png"])).unwrap();
        let shared = SharedContext::new(ctx);
        let detached = shared.clone();

        shared.lock().await.output.push(Artifact::default());
        let snapshot = shared.into_inner().await;
        assert_eq!(snapshot.output.len(), 1);
        drop(detached);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::PreTransform.to_string(), "beforeTransform");
        assert_eq!(Stage::PostUpload.to_string(), "afterUpload");
    }
}
