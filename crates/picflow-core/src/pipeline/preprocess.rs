//! Built-in pre-processing: watermark, compress/convert, exif strip.
//!
//! Every input is handled concurrently and all items settle before the
//! result is inspected. A remote source that cannot be fetched fails the
//! whole run; a local file that cannot be read or processed only skips
//! staging for that item.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;

use crate::config::{CompressOptions, WatermarkOptions};
use crate::context::RunContext;
use crate::error::{PipelineError, PipelineResult};
use crate::fetch::{is_url, resolve_source, Fetcher, SourceFile, FETCH_TIMEOUT};

use super::compress::image_process;
use super::decision::decide;
use super::decode::{bare_ext, run_blocking};
use super::exif::strip_exif;
use super::font::FontAsset;
use super::watermark::add_watermark;

/// Shared inputs for one pre-processing pass.
#[derive(Clone)]
struct Job {
    compress: Option<CompressOptions>,
    watermark: Option<WatermarkOptions>,
    fetcher: Arc<dyn Fetcher>,
    font: Arc<FontAsset>,
    staging_dir: PathBuf,
    rejected: Arc<[&'static str]>,
}

/// Run pre-processing over `ctx.input`, replacing entries with staged paths.
///
/// A no-op when neither compress nor watermark options are configured.
/// `rejected` lists formats the destination uploader refuses.
pub async fn preprocess(
    ctx: &mut RunContext,
    font: Arc<FontAsset>,
    rejected: &[&'static str],
) -> PipelineResult<()> {
    let compress = ctx.config().build_in.compress.clone();
    let watermark = ctx.config().build_in.watermark.clone();
    if compress.is_none() && watermark.is_none() {
        return Ok(());
    }

    let job = Job {
        compress,
        watermark,
        fetcher: ctx.fetcher(),
        font,
        staging_dir: ctx.scratch_dir().join(ctx.run_id.to_string()),
        rejected: Arc::from(rejected.to_vec()),
    };

    let items = ctx
        .input
        .iter()
        .enumerate()
        .map(|(index, reference)| process_item(job.clone(), index, reference.clone()));
    let results = join_all(items).await;

    let mut fatal = None;
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(Some(staged)) => {
                tracing::debug!("Staged {} -> {}", ctx.input[index], staged.display());
                ctx.input[index] = staged.to_string_lossy().into_owned();
            }
            Ok(None) => {}
            Err(e) if is_url(&ctx.input[index]) => {
                tracing::error!("{}", e);
                if fatal.is_none() {
                    fatal = Some(e);
                }
            }
            Err(e) => {
                tracing::warn!("Skip pre-processing {}: {}", ctx.input[index], e);
            }
        }
    }

    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Process one reference. Returns the staged path if anything was produced.
async fn process_item(job: Job, index: usize, reference: String) -> PipelineResult<Option<PathBuf>> {
    let source = resolve_source(job.fetcher.clone(), &reference, FETCH_TIMEOUT).await?;
    let ext = source.extname.clone();
    let decision = decide(job.compress.as_ref(), job.watermark.as_ref(), &ext);

    let mut buffer: Option<Vec<u8>> = None;
    let mut out_ext = bare_ext(&ext);

    if decision.watermark() {
        if let Some(options) = job.watermark.clone() {
            buffer = watermark_step(&job, &source, options, &reference).await;
        }
    }

    if decision.compress() {
        if let Some(options) = job.compress.clone() {
            tracing::info!("Compress or convert image");
            let input = buffer.clone().unwrap_or_else(|| source.bytes.clone());
            let raw_ext = ext.clone();
            let rejected = job.rejected.clone();
            let result = run_blocking("compress", move || {
                image_process(&input, &options, &raw_ext, &rejected)
            })
            .await;
            match result {
                Ok(processed) => {
                    buffer = Some(processed.bytes);
                    out_ext = processed.ext;
                }
                Err(e) => tracing::warn!("Compress {} failed, keeping original: {}", reference, e),
            }
        }
    }

    let remove_exif = job.compress.as_ref().is_some_and(|c| c.is_remove_exif);
    if buffer.is_none() && remove_exif {
        tracing::info!("Remove exif info.");
        let bytes = source.bytes.clone();
        let raw_ext = ext.clone();
        match run_blocking("strip exif", move || strip_exif(&bytes, &raw_ext)).await {
            Ok(stripped) => buffer = stripped,
            Err(e) => tracing::warn!("Remove exif from {} failed: {}", reference, e),
        }
    }

    let Some(bytes) = buffer else {
        return Ok(None);
    };
    let staged = stage(&job.staging_dir, index, &source, &out_ext, &bytes).await?;
    Ok(Some(staged))
}

async fn watermark_step(
    job: &Job,
    source: &SourceFile,
    options: WatermarkOptions,
    reference: &str,
) -> Option<Vec<u8>> {
    let font_path = if options.needs_shared_font() {
        if !job.font.ensure().await {
            tracing::warn!("Download ttf file failed, skip add watermark.");
            return None;
        }
        Some(job.font.path().to_path_buf())
    } else {
        None
    };

    tracing::info!("Add watermark to image");
    let bytes = source.bytes.clone();
    let raw_ext = source.extname.clone();
    let result = run_blocking("watermark", move || {
        add_watermark(&bytes, &options, &raw_ext, font_path.as_deref())
    })
    .await;
    match result {
        Ok(marked) => Some(marked),
        Err(e) => {
            tracing::warn!("Add watermark to {} failed: {}", reference, e);
            None
        }
    }
}

/// Write `bytes` to `<staging_dir>/<index>/<basename>.<ext>`.
///
/// The per-run, per-index directory keeps concurrent runs and same-named
/// inputs from overwriting each other.
async fn stage(
    staging_dir: &Path,
    index: usize,
    source: &SourceFile,
    out_ext: &str,
    bytes: &[u8],
) -> PipelineResult<PathBuf> {
    let stem = source
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis().to_string());
    let ext = if out_ext.is_empty() {
        bare_ext(&source.extname)
    } else {
        out_ext.to_string()
    };
    let file_name = if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    };

    let dir = staging_dir.join(index.to_string());
    let path = dir.join(file_name);
    let io_err = |e: std::io::Error| PipelineError::Read {
        path: path.clone(),
        message: e.to_string(),
    };
    tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;
    tokio::fs::write(&path, bytes).await.map_err(io_err)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::PipelineResult;
    use crate::pipeline::decode::{probe_dimensions, test_support::solid_image};
    use crate::Picflow;
    use async_trait::async_trait;
    use image::ImageFormat;
    use serde_json::json;

    struct UnreachableFetcher;

    #[async_trait]
    impl Fetcher for UnreachableFetcher {
        async fn get_bytes(&self, url: &str) -> PipelineResult<Vec<u8>> {
            Err(PipelineError::Fetch {
                url: url.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    fn picflow(base: &Path, config: Config) -> Picflow {
        let mut config = config;
        config.general.base_dir = base.to_path_buf();
        Picflow::with_fetcher(config, Arc::new(UnreachableFetcher)).unwrap()
    }

    fn font(base: &Path) -> Arc<FontAsset> {
        Arc::new(FontAsset::new(base, Arc::new(UnreachableFetcher)))
    }

    #[tokio::test]
    async fn test_no_options_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let env = picflow(dir.path(), Config::default());
        let mut ctx = RunContext::create(&env, &json!(["https://unreachable.test/a.png"])).unwrap();

        preprocess(&mut ctx, font(dir.path()), &[]).await.unwrap();
        assert_eq!(ctx.input, vec!["https://unreachable.test/a.png"]);
    }

    #[tokio::test]
    async fn test_local_file_resized_and_staged() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("photo.png");
        std::fs::write(&src, solid_image(100, 50, ImageFormat::Png)).unwrap();

        let mut config = Config::default();
        config.build_in.compress = Some(CompressOptions {
            is_resize: true,
            is_resize_by_percent: true,
            resize_percent: 50.0,
            ..Default::default()
        });
        let env = picflow(dir.path(), config);
        let mut ctx =
            RunContext::create(&env, &json!([src.to_string_lossy()])).unwrap();

        preprocess(&mut ctx, font(dir.path()), &[]).await.unwrap();

        let staged = PathBuf::from(&ctx.input[0]);
        assert_ne!(staged, src);
        assert!(staged.starts_with(ctx.scratch_dir()));
        assert_eq!(staged.file_name().unwrap(), "photo.png");
        let bytes = std::fs::read(&staged).unwrap();
        assert_eq!(probe_dimensions(&bytes), Some((50, 25)));
        assert_eq!(ctx.raw_input()[0], src.to_string_lossy());
    }

    #[tokio::test]
    async fn test_convert_changes_staged_extension() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("photo.png");
        std::fs::write(&src, solid_image(8, 8, ImageFormat::Png)).unwrap();

        let mut config = Config::default();
        config.build_in.compress = Some(CompressOptions {
            is_convert: true,
            convert_format: "webp".to_string(),
            ..Default::default()
        });
        let env = picflow(dir.path(), config);
        let mut ctx = RunContext::create(&env, &json!([src.to_string_lossy()])).unwrap();

        preprocess(&mut ctx, font(dir.path()), &["webp"]).await.unwrap();
        assert!(ctx.input[0].ends_with("photo.png"));
        assert_ne!(ctx.input[0], src.to_string_lossy());
    }

    #[tokio::test]
    async fn test_missing_local_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.build_in.compress = Some(CompressOptions {
            quality: 50,
            ..Default::default()
        });
        let env = picflow(dir.path(), config);
        let mut ctx = RunContext::create(&env, &json!(["/no/such/file.jpg"])).unwrap();

        preprocess(&mut ctx, font(dir.path()), &[]).await.unwrap();
        assert_eq!(ctx.input, vec!["/no/such/file.jpg"]);
    }

    #[tokio::test]
    async fn test_unreachable_url_fails_after_siblings_settle() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("ok.png");
        std::fs::write(&src, solid_image(10, 10, ImageFormat::Png)).unwrap();

        let mut config = Config::default();
        config.build_in.compress = Some(CompressOptions {
            is_rotate: true,
            rotate_degree: 90.0,
            ..Default::default()
        });
        let env = picflow(dir.path(), config);
        let mut ctx = RunContext::create(
            &env,
            &json!([src.to_string_lossy(), "https://unreachable.test/b.png"]),
        )
        .unwrap();

        let err = preprocess(&mut ctx, font(dir.path()), &[]).await.unwrap_err();
        assert!(err.is_fetch());
        // The local sibling still completed.
        assert_ne!(ctx.input[0], src.to_string_lossy());
    }

    #[tokio::test]
    async fn test_text_watermark_skipped_when_font_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.png");
        std::fs::write(&src, solid_image(10, 10, ImageFormat::Png)).unwrap();

        let mut config = Config::default();
        config.build_in.watermark = Some(WatermarkOptions {
            is_add_watermark: true,
            watermark_text: "hello".to_string(),
            ..Default::default()
        });
        let env = picflow(dir.path(), config);
        let mut ctx = RunContext::create(&env, &json!([src.to_string_lossy()])).unwrap();

        preprocess(&mut ctx, font(dir.path()), &[]).await.unwrap();
        assert_eq!(ctx.input[0], src.to_string_lossy());
    }
}
