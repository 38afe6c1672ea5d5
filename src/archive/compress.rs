use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use zip::CompressionMethod;
use zip::write::FileOptions;

use super::outcome::ArchiveError;

/// Per-task time budget, checked cooperatively.
///
/// Work already in progress is never interrupted; callers check between
/// steps and give up once the budget is spent.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn unlimited() -> Self {
        Self::start(None)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check(&self) -> Result<(), ArchiveError> {
        match self.limit {
            Some(limit) if self.elapsed() > limit => Err(ArchiveError::Timeout {
                elapsed_ms: self.elapsed().as_millis(),
                limit_ms: limit.as_millis(),
            }),
            _ => Ok(()),
        }
    }
}

/// The compression primitive invoked once per stem.
///
/// Implementations write a single archive holding `files` to `destination`.
/// They must not assume anything about other stems being processed at the
/// same time.
pub trait Compressor: Send + Sync {
    fn compress(
        &self,
        files: &[PathBuf],
        destination: &Path,
        deadline: &Deadline,
    ) -> Result<(), ArchiveError>;
}

/// Zip writer backed by the `zip` crate
#[derive(Debug, Clone, Copy)]
pub struct ZipCompressor {
    method: CompressionMethod,
}

impl Default for ZipCompressor {
    fn default() -> Self {
        Self {
            method: CompressionMethod::Deflated,
        }
    }
}

impl Compressor for ZipCompressor {
    fn compress(
        &self,
        files: &[PathBuf],
        destination: &Path,
        deadline: &Deadline,
    ) -> Result<(), ArchiveError> {
        let zip_err = |source| ArchiveError::Compression {
            path: destination.to_path_buf(),
            source,
        };

        let out = File::create(destination)
            .map_err(|e| ArchiveError::io("create archive", destination, e))?;
        let mut writer = zip::ZipWriter::new(out);
        let options = FileOptions::default().compression_method(self.method);
        let base = common_parent(files);

        for file in files {
            deadline.check()?;

            let name = entry_name(file, base.as_deref());
            writer.start_file(name, options).map_err(zip_err)?;
            let mut input = File::open(file).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ArchiveError::MissingFile { path: file.clone() },
                _ => ArchiveError::io("open input", file, e),
            })?;
            io::copy(&mut input, &mut writer).map_err(|e| ArchiveError::io("write entry", file, e))?;
        }

        writer.finish().map_err(zip_err)?;
        Ok(())
    }
}

/// Deepest directory containing every file
fn common_parent(files: &[PathBuf]) -> Option<PathBuf> {
    let mut parents = files.iter().filter_map(|f| f.parent());
    let mut common = parents.next()?.to_path_buf();
    for parent in parents {
        while !parent.starts_with(&common) {
            if !common.pop() {
                return None;
            }
        }
    }
    Some(common)
}

/// Archive entry name, relative to the group's common directory with `/`
/// separators so files from nested folders never collide.
fn entry_name(file: &Path, base: Option<&Path>) -> String {
    let relative = base
        .and_then(|b| file.strip_prefix(b).ok())
        .unwrap_or(file);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
