use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::aggregate::RunResult;
use super::dispatcher::ExecutionMode;
use crate::archive::ErrorKind;

pub const ERROR_REPORT_FILE: &str = "archive_errors.json";

/// Failed stems of one run, persisted next to the archives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub generated_at: u64,
    pub mode: ExecutionMode,
    pub total: usize,
    pub failed: usize,
    pub failures: Vec<FailureEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEntry {
    pub stem: String,
    pub kind: ErrorKind,
    pub message: String,
    pub files: Vec<PathBuf>,
}

impl ErrorReport {
    pub fn from_result(result: &RunResult) -> Self {
        let failures = result
            .failures()
            .filter_map(|outcome| {
                outcome.error().map(|error| FailureEntry {
                    stem: outcome.stem().to_string(),
                    kind: error.kind,
                    message: error.message.clone(),
                    files: outcome.files_included().to_vec(),
                })
            })
            .collect();

        Self {
            generated_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            mode: result.mode,
            total: result.total(),
            failed: result.failed,
            failures,
        }
    }

    pub fn save(&self, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        let path = output_dir.join(ERROR_REPORT_FILE);
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        writer.flush()?;
        Ok(path)
    }

    /// Remove a report left behind by an earlier run. Returns whether one existed.
    pub fn clear(output_dir: &Path) -> Result<bool> {
        let path = output_dir.join(ERROR_REPORT_FILE);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Removed stale {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}
