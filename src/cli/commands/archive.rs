//! `stemzip archive` - resolve stems in a directory and build one zip each

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

use crate::cli::Output;
use crate::config::ArchiverConfig;
use crate::engine::{Engine, ExecutionMode, OutcomeOrder, RunResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct ArchiveArgs {
    /// Stems to archive (each becomes <output-dir>/<stem>.zip)
    #[arg(required = true, value_name = "STEM")]
    pub stems: Vec<String>,

    /// Directory holding the files to group
    #[arg(short, long, value_name = "DIR")]
    pub input: PathBuf,

    /// Where archives are written
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Only include files with these extensions (comma-separated)
    #[arg(short, long, value_delimiter = ',', value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Worker count, or "auto" for one per CPU
    #[arg(short, long, value_name = "N|auto", conflicts_with = "sequential")]
    pub workers: Option<String>,

    /// Archive one stem at a time
    #[arg(long)]
    pub sequential: bool,

    /// Per-stem time limit in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Order of results
    #[arg(long, value_enum)]
    pub order: Option<OutcomeOrder>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Descend into subdirectories of the input directory
    #[arg(short, long)]
    pub recursive: bool,

    /// Write archive_errors.json to the output directory when stems fail
    #[arg(long)]
    pub error_report: bool,
}

impl ArchiveArgs {
    /// CLI flags as a config overlay. Only flags the user actually passed are
    /// included so they don't mask file or environment settings.
    pub fn overrides(&self) -> Value {
        let mut parallel = Map::new();
        let mut archive = Map::new();

        if self.sequential {
            parallel.insert("enabled".into(), json!(false));
        }
        if let Some(workers) = &self.workers {
            let value = workers
                .trim()
                .parse::<u64>()
                .map(Value::from)
                .unwrap_or_else(|_| json!(workers));
            parallel.insert("max_workers".into(), value);
        }
        if let Some(timeout) = self.timeout {
            parallel.insert("timeout_per_file".into(), json!(timeout));
        }
        if self.error_report {
            parallel.insert("save_error_reports".into(), json!(true));
        }

        if let Some(output) = &self.output {
            archive.insert("output_dir".into(), json!(output));
        }
        if !self.extensions.is_empty() {
            archive.insert("extensions".into(), json!(self.extensions));
        }
        if self.recursive {
            archive.insert("recursive".into(), json!(true));
        }
        if let Some(order) = self.order {
            archive.insert("order".into(), serde_json::to_value(order).unwrap_or(Value::Null));
        }

        json!({
            "parallel_processing": parallel,
            "archive": archive,
        })
    }
}

pub async fn execute(args: ArchiveArgs, config_path: Option<&Path>, output: &Output) -> Result<()> {
    let config = ArchiverConfig::load_with(config_path, Some(args.overrides()))?;
    let settings = config.archive_settings()?;
    let raw_policy = config.parallel_settings();

    tracing::info!(
        "Archiving {} stem(s) from {} into {}",
        args.stems.len(),
        args.input.display(),
        settings.output_dir.display()
    );

    let stems = args.stems;
    let input = args.input;
    let result = tokio::task::spawn_blocking(move || {
        Engine::from_settings(&settings).process(&stems, &input, &settings.extensions, &raw_policy)
    })
    .await
    .context("Archive task did not complete")??;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text(&result, output),
    }

    if result.has_failures() {
        bail!("{} of {} stems failed", result.failed, result.total());
    }

    Ok(())
}

fn print_text(result: &RunResult, output: &Output) {
    output.header("Archive Results");

    for outcome in &result.outcomes {
        match (outcome.archive_path(), outcome.error()) {
            (Some(path), _) => {
                output.action_result(outcome.stem().as_str(), &path.display().to_string(), true)
            }
            (None, Some(error)) => output.action_result(outcome.stem().as_str(), &error.message, false),
            (None, None) => {}
        }
        for file in outcome.files_included() {
            output.verbose(&format!("    {}", file.display()));
        }
    }

    output.category("Summary");
    output.key_value("Mode:", &result.mode.to_string(), false);
    output.key_value("Workers:", &result.workers.to_string(), false);
    output.key_value("Archived:", &result.succeeded.to_string(), result.succeeded > 0);
    output.key_value("Failed:", &result.failed.to_string(), false);
    output.key_value("Elapsed:", &format!("{} ms", result.elapsed_ms), false);

    if let Some(report) = &result.error_report {
        output.key_value("Error report:", &report.display().to_string(), false);
    }
    if result.mode == ExecutionMode::SequentialFallback {
        if let Some(reason) = &result.pool_error {
            output.warning(&format!("Worker pool unavailable, ran sequentially: {reason}"));
        }
    }
    output.blank_line();

    if !result.has_failures() {
        output.success(&format!("Archived {} stem(s)", result.succeeded));
    }
}
