//! Default transformer: turns paths and URLs into artifacts.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;

use crate::context::SharedContext;
use crate::error::PipelineResult;
use crate::fetch::{resolve_source, Fetcher, FETCH_TIMEOUT};
use crate::registry::Handler;
use crate::types::Artifact;

/// Reads every input (local file or URL) into an [`Artifact`].
#[derive(Debug, Default)]
pub struct PathTransformer;

#[async_trait]
impl Handler for PathTransformer {
    fn name(&self) -> &str {
        "path"
    }

    async fn handle(&self, ctx: &SharedContext) -> PipelineResult<()> {
        let (input, fetcher) = {
            let guard = ctx.lock().await;
            (guard.input.clone(), guard.fetcher())
        };

        let artifacts = try_join_all(input.iter().map(|reference| load(fetcher.clone(), reference))).await?;

        ctx.lock().await.output.extend(artifacts);
        Ok(())
    }
}

async fn load(fetcher: Arc<dyn Fetcher>, reference: &str) -> PipelineResult<Artifact> {
    let source = resolve_source(fetcher, reference, FETCH_TIMEOUT).await?;
    let file_name = source.file_name.clone().unwrap_or_else(|| {
        format!("{}{}", chrono::Utc::now().timestamp_millis(), source.extname)
    });
    let mut artifact = Artifact::from_bytes(source.bytes, file_name, source.extname);
    artifact.ensure_dimensions();
    Ok(artifact)
}
