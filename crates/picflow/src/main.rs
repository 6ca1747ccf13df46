//! Picflow CLI - watermark, compress, rename and upload images.
//!
//! Picflow takes local paths and URLs, runs the built-in pre-processing
//! configured under `buildIn`, and uploads the results with the configured
//! uploader. Uploaded URLs are printed one per line.
//!
//! # Usage
//!
//! ```bash
//! # Upload a single image
//! picflow upload cat.png
//!
//! # Upload a directory and a remote image, writing a JSON report
//! picflow upload ./photos/ https://example.com/dog.jpg --output report.json
//!
//! # View configuration
//! picflow config show
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Picflow - watermark, compress, rename and upload images.
#[derive(Parser, Debug)]
#[command(name = "picflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "PICFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload images and print their URLs
    Upload(cli::upload::UploadArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref().map(cli::expand_path);

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match cli::load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `picflow config path`."
            );
            picflow_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Picflow v{}", picflow_core::VERSION);

    match cli.command {
        Commands::Upload(args) => cli::upload::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, config_path).await,
    }
}
