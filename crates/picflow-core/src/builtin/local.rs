//! Built-in `local` uploader: copies artifacts into a directory.
//!
//! Reads `picBed.local`:
//!
//! ```toml
//! [picBed.local]
//! path = "/srv/www/images"
//! customUrl = "https://img.example.com"   # optional
//! webPath = "images/2024"                  # optional
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::context::SharedContext;
use crate::error::{PipelineError, PipelineResult};
use crate::events::EventKind;
use crate::fetch::encode_component;
use crate::registry::Handler;
use crate::types::FieldDescriptor;

/// `picBed.local` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalConfig {
    pub path: String,
    pub custom_url: String,
    pub web_path: String,
}

impl LocalConfig {
    /// Public URL (or filesystem path) of an uploaded file.
    pub fn url_for(&self, file_name: &str) -> String {
        let custom_url = self.custom_url.trim().trim_end_matches('/');
        if custom_url.is_empty() {
            return Path::new(&self.path).join(file_name).to_string_lossy().into_owned();
        }
        let web_path = self.web_path.replace('\\', "/");
        let web_path = web_path.trim_matches('/');
        let encoded_name = encode_component(file_name).replace("%2F", "/");
        if web_path.is_empty() {
            format!("{custom_url}/{encoded_name}")
        } else {
            let encoded_dir = encode_component(web_path).replace("%2F", "/");
            format!("{custom_url}/{encoded_dir}/{encoded_name}")
        }
    }
}

/// Writes each artifact into `picBed.local.path`.
#[derive(Debug, Default)]
pub struct LocalUploader;

impl LocalUploader {
    fn error(message: impl Into<String>) -> PipelineError {
        PipelineError::Upload {
            uploader: "local".to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Handler for LocalUploader {
    fn name(&self) -> &str {
        "local"
    }

    async fn handle(&self, ctx: &SharedContext) -> PipelineResult<()> {
        let (config, pending) = {
            let guard = ctx.lock().await;
            let config: LocalConfig = guard
                .get_config("picBed.local")
                .ok_or_else(|| Self::error("Can not find local config!"))?;
            let mut pending = Vec::new();
            for (index, artifact) in guard.output.iter().enumerate() {
                if artifact.file_name.is_empty() {
                    continue;
                }
                if let Some(bytes) = artifact.bytes()? {
                    pending.push((index, artifact.file_name.clone(), bytes));
                }
            }
            (config, pending)
        };
        if config.path.trim().is_empty() {
            return Err(Self::error("picBed.local.path is not set"));
        }

        let dir = PathBuf::from(shellexpand::tilde(config.path.trim()).into_owned());
        let mut written = Vec::with_capacity(pending.len());
        for (index, file_name, bytes) in pending {
            let target = dir.join(&file_name);
            let result = async {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, &bytes).await
            }
            .await;
            if let Err(e) = result {
                tracing::error!("Write {} failed: {}", target.display(), e);
                ctx.emit(EventKind::Notification {
                    title: "Upload failed".to_string(),
                    body: "failed to upload image".to_string(),
                });
                return Err(Self::error(format!("failed to upload image: {e}")));
            }
            written.push((index, file_name, target));
        }

        let mut guard = ctx.lock().await;
        for (index, file_name, target) in written {
            if let Some(artifact) = guard.output.get_mut(index) {
                artifact.mark_uploaded(config.url_for(&file_name));
                artifact.extra.insert(
                    "hash".to_string(),
                    serde_json::Value::String(target.to_string_lossy().into_owned()),
                );
            }
        }
        Ok(())
    }

    fn config(&self, config: &Config) -> Vec<FieldDescriptor> {
        let current: LocalConfig = config.get("picBed.local").unwrap_or_default();
        vec![
            FieldDescriptor::input("path", "Local path", current.path).required(),
            FieldDescriptor::input("customUrl", "Custom URL", current.custom_url),
            FieldDescriptor::input("webPath", "Web path", current.web_path),
        ]
    }
}
