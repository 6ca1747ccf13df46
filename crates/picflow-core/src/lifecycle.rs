//! Run orchestration: pre-processing, then the stage pipeline.
//!
//! ```text
//! preprocess → beforeTransform → transform → rename → beforeUpload → upload → afterUpload
//! ```
//!
//! Hooks of one stage run concurrently; the first failure aborts the run.
//! Every fatal error goes through [`fail`], which reports it and either
//! returns the failed context (default) or the error itself (debug mode).

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::config::{DEFAULT_TRANSFORMER, DEFAULT_UPLOADER};
use crate::context::{RunContext, SharedContext, Stage};
use crate::error::{PicflowError, PipelineError, PipelineResult, Result};
use crate::events::{progress, EventKind};
use crate::fetch::{encode_url, is_url};
use crate::pipeline::preprocess::preprocess;
use crate::pipeline::rename::rename_artifacts;
use crate::registry::{Handler, Registry};
use crate::Picflow;

/// Drive one run to completion.
///
/// Returns the finished or failed context. In debug mode a failure is
/// returned as an error instead.
pub async fn run(env: &Picflow, mut ctx: RunContext) -> Result<RunContext> {
    let debug = env.config.debug;
    ctx.raw_input_path = ctx.input.iter().map(|r| resolve_reference(r)).collect();

    let rejected: Vec<&'static str> = env
        .helper
        .uploader
        .get(env.config.pic_bed.uploader_id())
        .map(|uploader| uploader.rejected_formats().to_vec())
        .unwrap_or_default();

    if let Err(e) = preprocess(&mut ctx, env.font.clone(), &rejected).await {
        return fail(ctx, e, debug);
    }

    let shared = SharedContext::new(ctx);
    let result = stages(env, &shared).await;
    let ctx = shared.into_inner().await;
    match result {
        Ok(()) => Ok(ctx),
        Err(e) => fail(ctx, e, debug),
    }
}

/// Absolute path of a filesystem reference; URLs are kept as given.
fn resolve_reference(reference: &str) -> String {
    if is_url(reference) {
        return reference.to_string();
    }
    let path = PathBuf::from(reference);
    std::path::absolute(&path)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

async fn stages(env: &Picflow, ctx: &SharedContext) -> PipelineResult<()> {
    let helper = env.helper.clone();
    let config = env.config.clone();

    // beforeTransform
    enter(ctx, Stage::PreTransform).await;
    ctx.emit(EventKind::Progress {
        value: progress::BEFORE_TRANSFORM,
    });
    ctx.emit(EventKind::BeforeTransform);
    tracing::info!("Before transform");
    run_hooks(Stage::PreTransform, &helper.before_transform, ctx).await?;

    // transform
    enter(ctx, Stage::Transform).await;
    ctx.emit(EventKind::Progress {
        value: progress::TRANSFORM,
    });
    let (transformer_id, transformer) = resolve(
        &helper.transformer,
        config.pic_bed.transformer_id(),
        DEFAULT_TRANSFORMER,
        ctx,
    )?;
    tracing::info!("Transforming... Current transformer is [{}]", transformer_id);
    transformer
        .handle(ctx)
        .await
        .map_err(|e| PipelineError::Transform {
            transformer: transformer_id.clone(),
            message: e.to_string(),
        })?;

    // rename
    if let Some(options) = config.build_in.rename.as_ref().filter(|r| r.enable) {
        enter(ctx, Stage::Rename).await;
        let mut guard = ctx.lock().await;
        let raw_paths = guard.raw_input_path.clone();
        rename_artifacts(&mut guard.output, &raw_paths, &options.format);
    }

    // beforeUpload
    enter(ctx, Stage::PreUpload).await;
    ctx.emit(EventKind::Progress {
        value: progress::BEFORE_UPLOAD,
    });
    tracing::info!("Before upload");
    ctx.emit(EventKind::BeforeUpload);
    run_hooks(Stage::PreUpload, &helper.before_upload, ctx).await?;

    // upload
    enter(ctx, Stage::Upload).await;
    let (uploader_id, uploader) = resolve(
        &helper.uploader,
        config.pic_bed.uploader_id(),
        DEFAULT_UPLOADER,
        ctx,
    )?;
    tracing::info!("Uploading... Current uploader is [{}]", uploader_id);
    uploader.handle(ctx).await?;
    {
        let mut guard = ctx.lock().await;
        for artifact in guard.output.iter_mut() {
            artifact.uploader_type = Some(uploader_id.clone());
        }
        guard.restore_input();
    }

    // afterUpload
    enter(ctx, Stage::PostUpload).await;
    ctx.emit(EventKind::AfterUpload);
    ctx.emit(EventKind::Progress {
        value: progress::AFTER_UPLOAD,
    });
    run_hooks(Stage::PostUpload, &helper.after_upload, ctx).await?;

    let (summary, output) = {
        let mut guard = ctx.lock().await;
        for artifact in guard.output.iter_mut() {
            artifact.clear_payload();
        }
        guard.stage = Stage::Finished;
        let summary = summarize(&guard.output, config.settings.encode_output_url);
        (summary, guard.output.clone())
    };
    ctx.emit(EventKind::Finished {
        summary: summary.clone(),
        output,
    });
    tracing::info!("\n{}", summary);
    Ok(())
}

async fn enter(ctx: &SharedContext, stage: Stage) {
    ctx.lock().await.stage = stage;
    tracing::debug!("Enter stage {}", stage);
}

/// Newline-joined URLs of every uploaded artifact.
pub fn summarize(output: &[crate::types::Artifact], encode: bool) -> String {
    output
        .iter()
        .filter_map(|artifact| artifact.img_url.as_deref())
        .filter(|url| !url.is_empty())
        .map(|url| if encode { encode_url(url) } else { url.to_string() })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Look up `requested`, falling back to `default` with a warning.
fn resolve(
    registry: &Registry,
    requested: &str,
    default: &str,
    ctx: &SharedContext,
) -> PipelineResult<(String, Arc<dyn Handler>)> {
    if let Some(handler) = registry.get(requested) {
        return Ok((requested.to_string(), handler));
    }

    let message = format!(
        "Can't find {kind} - {requested}, switch to default {kind} - {default}",
        kind = registry.name()
    );
    tracing::warn!("{}", message);
    ctx.emit(EventKind::Warning { message });

    registry
        .get(default)
        .map(|handler| (default.to_string(), handler))
        .ok_or_else(|| PipelineError::Registry {
            message: format!("no {} registered as {}", registry.name(), default),
        })
}

/// Run every hook of a stage concurrently, failing on the first error.
///
/// Hooks still running when another one fails are left detached.
async fn run_hooks(stage: Stage, registry: &Registry, ctx: &SharedContext) -> PipelineResult<()> {
    let entries = registry.entries();
    if entries.is_empty() {
        return Ok(());
    }

    let mut running: FuturesUnordered<_> = entries
        .into_iter()
        .map(|(id, hook)| {
            tracing::info!("{}: {} running", registry.name(), id);
            let ctx = ctx.clone();
            let handle = tokio::spawn(async move { hook.handle(&ctx).await });
            async move { (id, handle.await) }
        })
        .collect();

    while let Some((id, joined)) = running.next().await {
        let message = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(join_err) => join_err.to_string(),
        };
        tracing::error!("{}: {} error", registry.name(), id);
        return Err(PipelineError::StageHook {
            stage: stage.to_string(),
            hook: id,
            message,
        });
    }
    Ok(())
}

/// The single failure boundary of a run.
fn fail(mut ctx: RunContext, error: PipelineError, debug: bool) -> Result<RunContext> {
    ctx.stage = Stage::Failed;
    ctx.error = Some(error.clone());
    tracing::warn!("failed");
    ctx.emit(EventKind::Progress {
        value: progress::FAILED,
    });
    ctx.emit(EventKind::Failed {
        error: error.to_string(),
    });
    tracing::error!("{}", error);

    if debug {
        Err(PicflowError::Pipeline(error))
    } else {
        Ok(ctx)
    }
}
