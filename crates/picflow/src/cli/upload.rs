//! The `picflow upload` command.

use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use picflow_core::output::OutputFormat as CoreOutputFormat;
use picflow_core::pipeline::FileDiscovery;
use picflow_core::{Config, EventKind, OutputWriter, Picflow, RunEvent, RunReport};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tokio::sync::broadcast::{error::RecvError, Receiver};

/// Arguments for the `upload` command.
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Image files, directories or URLs
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// Write a run report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Hide the progress bar
    #[arg(long)]
    pub quiet: bool,
}

/// Supported report formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// One report object
    Json,
    /// One artifact per line
    Jsonl,
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => CoreOutputFormat::Json,
            OutputFormat::Jsonl => CoreOutputFormat::JsonLines,
        }
    }
}

/// Execute the upload command.
pub async fn execute(args: UploadArgs, config: Config) -> anyhow::Result<()> {
    let inputs = FileDiscovery::new().expand_all(&args.inputs);
    if inputs.is_empty() {
        anyhow::bail!("No images found in the given inputs");
    }
    tracing::info!("Uploading {} image(s)", inputs.len());

    let encode_urls = config.settings.encode_output_url;
    let picflow = Picflow::new(config)?;

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        create_progress_bar()
    };
    let listener = tokio::spawn(follow_events(picflow.subscribe(), progress));

    let ctx = picflow.upload(inputs).await?;
    // The run always ends with Finished or Failed, which stops the listener.
    if let Err(e) = listener.await {
        tracing::debug!("Progress listener stopped: {e}");
    }

    let report = RunReport::from_context(&ctx, encode_urls);

    if let Some(path) = &args.output {
        let file = BufWriter::new(File::create(path)?);
        let mut writer = OutputWriter::new(file, args.format.into(), true);
        writer.write_report(&report)?;
        writer.flush()?;
        tracing::info!(
            "Wrote {} artifact(s) to {}",
            writer.artifacts_written(),
            path.display()
        );
    }

    if !report.succeeded() {
        anyhow::bail!(
            "Upload failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }

    if !report.summary.is_empty() {
        println!("{}", report.summary);
    }
    Ok(())
}

/// Mirror run events onto the progress bar until the run ends.
async fn follow_events(mut rx: Receiver<RunEvent>, progress: ProgressBar) {
    loop {
        match rx.recv().await {
            Ok(event) => match event.kind {
                EventKind::Progress { value } if value >= 0 => {
                    progress.set_position(value as u64);
                }
                EventKind::BeforeTransform => progress.set_message("transforming"),
                EventKind::BeforeUpload => progress.set_message("uploading"),
                EventKind::AfterUpload => progress.set_message("finishing"),
                EventKind::Warning { message } => progress.println(format!("warning: {message}")),
                EventKind::Notification { title, body } => {
                    progress.println(format!("{title}: {body}"))
                }
                EventKind::Finished { .. } | EventKind::Failed { .. } => break,
                EventKind::Progress { .. } => {}
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Progress listener skipped {skipped} event(s)");
            }
            Err(RecvError::Closed) => break,
        }
    }
    progress.finish_and_clear();
}

/// Create a progress bar tracking the run's 0-100 checkpoints.
fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
    {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message("starting...");
    pb
}
