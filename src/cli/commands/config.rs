//! Configuration command implementations

use anyhow::Result;
use clap::Subcommand;
use std::path::Path;

use crate::cli::Output;
use crate::config::{ArchiverConfig, ConfigValidator};

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the merged configuration and the policy it resolves to
    Show {
        /// Resolve the policy as if this many stems were requested
        #[arg(long, value_name = "N")]
        stems: Option<usize>,
    },
}

/// Execute config commands
pub async fn execute(cmd: ConfigCommands, config_path: Option<&Path>, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show { stems } => show(config_path, stems, output).await,
    }
}

async fn show(config_path: Option<&Path>, stems: Option<usize>, output: &Output) -> Result<()> {
    let config = ArchiverConfig::load_with(config_path, None)?;
    let merged = config.get_full_config()?;

    output.header("Current Configuration");
    if let Some(path) = config_path {
        output.key_value("Config file:", &path.display().to_string(), false);
    }
    output.blank_line();
    println!("{}", serde_json::to_string_pretty(&merged)?);

    let validator = ConfigValidator::new();
    let stem_count = stems.unwrap_or_else(|| validator.cpu_count());
    let policy = validator.validate(&config.parallel_settings(), stem_count);

    output.category(&format!("Resolved policy for {stem_count} stem(s)"));
    output.key_value("Parallel:", &policy.enabled.to_string(), policy.enabled);
    output.key_value("Requested workers:", &policy.requested_workers.to_string(), false);
    output.key_value("Effective workers:", &policy.max_workers.to_string(), true);
    output.key_value("CPUs:", &validator.cpu_count().to_string(), false);
    output.key_value(
        "Timeout per stem:",
        &policy
            .timeout_per_task
            .map(|t| format!("{:.3}s", t.as_secs_f64()))
            .unwrap_or_else(|| "none".to_string()),
        false,
    );
    output.key_value("Error reports:", &policy.save_error_reports.to_string(), false);
    output.key_value("Progress reporting:", &policy.progress_reporting.to_string(), false);
    output.blank_line();

    Ok(())
}
