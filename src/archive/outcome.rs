//! Per-stem outcome types
//!
//! An [`ArchiveOutcome`] stores a single `Result<PathBuf, ErrorRecord>`, so an
//! outcome either carries an archive path or an error, never both and never
//! neither.

use serde::{Deserialize, Serialize, Serializer};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::stems::Stem;

/// Failures that can occur while archiving a single stem.
///
/// These never cross the worker boundary as errors; the builder folds them
/// into an [`ErrorRecord`] carried by the stem's outcome.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no files found for stem '{stem}'")]
    NoFiles { stem: String },

    #[error("stem '{stem}' cannot be used as an archive name")]
    InvalidStem { stem: String },

    #[error("file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("{operation} failed for {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("compression failed for {}: {source}", path.display())]
    Compression {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u128, limit_ms: u128 },

    #[error("archive task panicked: {message}")]
    Panicked { message: String },
}

impl ArchiveError {
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ArchiveError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::NoFiles { .. } => ErrorKind::NoFiles,
            ArchiveError::InvalidStem { .. } => ErrorKind::InvalidStem,
            ArchiveError::MissingFile { .. } => ErrorKind::MissingFile,
            ArchiveError::Io { .. } => ErrorKind::Io,
            ArchiveError::Compression { .. } => ErrorKind::Compression,
            ArchiveError::Timeout { .. } => ErrorKind::Timeout,
            ArchiveError::Panicked { .. } => ErrorKind::Panicked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoFiles,
    InvalidStem,
    MissingFile,
    Io,
    Compression,
    Timeout,
    Panicked,
}

/// Serializable, clonable snapshot of an [`ArchiveError`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<ArchiveError> for ErrorRecord {
    fn from(err: ArchiveError) -> Self {
        ErrorRecord {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of archiving exactly one stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    stem: Stem,
    files_included: Vec<PathBuf>,
    result: Result<PathBuf, ErrorRecord>,
}

impl ArchiveOutcome {
    pub fn success(stem: Stem, archive_path: PathBuf, files_included: Vec<PathBuf>) -> Self {
        Self {
            stem,
            files_included,
            result: Ok(archive_path),
        }
    }

    pub fn failure(stem: Stem, files_included: Vec<PathBuf>, error: impl Into<ErrorRecord>) -> Self {
        Self {
            stem,
            files_included,
            result: Err(error.into()),
        }
    }

    pub fn stem(&self) -> &Stem {
        &self.stem
    }

    /// Files that belong to this stem (what was, or would have been, archived)
    pub fn files_included(&self) -> &[PathBuf] {
        &self.files_included
    }

    pub fn archive_path(&self) -> Option<&Path> {
        self.result.as_ref().ok().map(PathBuf::as_path)
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        self.result.as_ref().err()
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Caller-facing record: `{stem, zip_file_path, files, error}`
    pub fn to_record(&self) -> OutcomeRecord {
        OutcomeRecord {
            stem: self.stem.to_string(),
            zip_file_path: self.archive_path().map(Path::to_path_buf),
            files: self.files_included.clone(),
            error: self.error().map(|e| e.message.clone()),
        }
    }
}

impl Serialize for ArchiveOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub stem: String,
    pub zip_file_path: Option<PathBuf>,
    pub files: Vec<PathBuf>,
    pub error: Option<String>,
}
