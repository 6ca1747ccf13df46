//! Run reports written as JSON or JSON Lines.
//!
//! JSON writes one report object; JSONL writes one artifact per line, which
//! is handy for piping URLs into other tools.

use serde::Serialize;
use std::io::{self, Write};
use uuid::Uuid;

use crate::context::{RunContext, Stage};
use crate::lifecycle::summarize;
use crate::types::Artifact;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One report object
    Json,
    /// One artifact per line (newline-delimited JSON)
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Serializable outcome of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub stage: Stage,
    pub input: Vec<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub output: Vec<Artifact>,
}

impl RunReport {
    pub fn from_context(ctx: &RunContext, encode_urls: bool) -> Self {
        Self {
            run_id: ctx.run_id,
            stage: ctx.stage,
            input: ctx.raw_input().to_vec(),
            summary: summarize(&ctx.output, encode_urls),
            error: ctx.error.as_ref().map(|e| e.to_string()),
            output: ctx.output.clone(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.stage == Stage::Finished
    }
}

/// Writes run reports to any [`Write`] sink.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    artifacts_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// `pretty` only affects the JSON format.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            artifacts_written: 0,
        }
    }

    /// Write one run report.
    pub fn write_report(&mut self, report: &RunReport) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                if self.pretty {
                    serde_json::to_writer_pretty(&mut self.writer, report)
                        .map_err(io::Error::other)?;
                } else {
                    serde_json::to_writer(&mut self.writer, report).map_err(io::Error::other)?;
                }
                writeln!(self.writer)?;
                self.artifacts_written += report.output.len();
            }
            OutputFormat::JsonLines => {
                for artifact in &report.output {
                    serde_json::to_writer(&mut self.writer, artifact).map_err(io::Error::other)?;
                    writeln!(self.writer)?;
                    self.artifacts_written += 1;
                }
            }
        }
        Ok(())
    }

    pub fn artifacts_written(&self) -> usize {
        self.artifacts_written
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Consume the writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
