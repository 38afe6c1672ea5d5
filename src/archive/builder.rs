use std::any::Any;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::compress::{Compressor, Deadline, ZipCompressor};
use super::outcome::{ArchiveError, ArchiveOutcome};
use crate::stems::FileGroup;

pub const ARCHIVE_EXTENSION: &str = "zip";

/// Builds one archive for one stem.
///
/// A builder holds only immutable settings and can be shared freely across
/// worker threads. [`ArchiveBuilder::build`] never returns an error and never
/// unwinds: every failure, including a panicking compressor, becomes the
/// `error` of the returned outcome.
#[derive(Clone)]
pub struct ArchiveBuilder {
    output_dir: PathBuf,
    timeout: Option<Duration>,
    compressor: Arc<dyn Compressor>,
}

impl std::fmt::Debug for ArchiveBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBuilder")
            .field("output_dir", &self.output_dir)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ArchiveBuilder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            timeout: None,
            compressor: Arc::new(ZipCompressor::default()),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Final archive location for a stem
    pub fn archive_path_for(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{stem}.{ARCHIVE_EXTENSION}"))
    }

    pub fn build(&self, group: &FileGroup) -> ArchiveOutcome {
        let deadline = Deadline::start(self.timeout);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.try_build(group, &deadline)))
            .unwrap_or_else(|payload| {
                Err(ArchiveError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });

        match result {
            Ok(path) => ArchiveOutcome::success(group.stem.clone(), path, group.files.clone()),
            Err(err) => ArchiveOutcome::failure(group.stem.clone(), group.files.clone(), err),
        }
    }

    fn try_build(&self, group: &FileGroup, deadline: &Deadline) -> Result<PathBuf, ArchiveError> {
        let stem = group.stem.as_str();
        validate_stem(stem)?;

        if group.is_empty() {
            return Err(ArchiveError::NoFiles {
                stem: stem.to_string(),
            });
        }

        for file in &group.files {
            ensure_file(file)?;
        }

        fs::create_dir_all(&self.output_dir)
            .map_err(|e| ArchiveError::io("create output directory", &self.output_dir, e))?;

        let target = self.archive_path_for(stem);
        let staging = StagingFile::new(&self.output_dir, stem);

        self.compressor.compress(&group.files, staging.path(), deadline)?;
        deadline.check()?;

        staging.persist(&target)?;
        Ok(target)
    }
}

fn validate_stem(stem: &str) -> Result<(), ArchiveError> {
    let invalid = stem.trim().is_empty()
        || stem == "."
        || stem == ".."
        || stem.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ArchiveError::InvalidStem {
            stem: stem.to_string(),
        });
    }
    Ok(())
}

fn ensure_file(path: &Path) -> Result<(), ArchiveError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(ArchiveError::MissingFile {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ArchiveError::MissingFile {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(ArchiveError::io("stat input", path, e)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Uniquely named sibling of the final archive; removed on drop unless persisted
struct StagingFile {
    path: PathBuf,
    persisted: bool,
}

impl StagingFile {
    fn new(dir: &Path, stem: &str) -> Self {
        let name = format!(".{stem}.{}.{ARCHIVE_EXTENSION}.partial", uuid::Uuid::new_v4());
        Self {
            path: dir.join(name),
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persist(mut self, target: &Path) -> Result<(), ArchiveError> {
        fs::rename(&self.path, target).map_err(|e| ArchiveError::io("finalize archive", target, e))?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ErrorKind;
    use tempfile::TempDir;

    struct PanickingCompressor;

    impl Compressor for PanickingCompressor {
        fn compress(&self, _: &[PathBuf], _: &Path, _: &Deadline) -> Result<(), ArchiveError> {
            panic!("compressor blew up");
        }
    }

    struct SlowCompressor(Duration);

    impl Compressor for SlowCompressor {
        fn compress(&self, files: &[PathBuf], dest: &Path, _: &Deadline) -> Result<(), ArchiveError> {
            std::thread::sleep(self.0);
            ZipCompressor::default().compress(files, dest, &Deadline::unlimited())
        }
    }

    fn fixture() -> (TempDir, FileGroup) {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in");
        fs::create_dir(&input).unwrap();
        let file = input.join("a_1.txt");
        fs::write(&file, "hello").unwrap();
        (temp, FileGroup::new("a", vec![file]))
    }

    fn leftover_files(dir: &Path) -> Vec<PathBuf> {
        match fs::read_dir(dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_build_success_writes_archive() {
        let (temp, group) = fixture();
        let out = temp.path().join("out");
        let outcome = ArchiveBuilder::new(&out).build(&group);

        assert!(outcome.is_success(), "{:?}", outcome.error());
        assert_eq!(outcome.archive_path(), Some(out.join("a.zip").as_path()));
        assert_eq!(outcome.files_included(), group.files.as_slice());
        assert_eq!(leftover_files(&out), vec![out.join("a.zip")]);
    }

    #[test]
    fn test_empty_group_reports_no_files() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let outcome = ArchiveBuilder::new(&out).build(&FileGroup::new("b", Vec::new()));

        assert_eq!(outcome.error().unwrap().kind, ErrorKind::NoFiles);
        assert!(outcome.archive_path().is_none());
        assert!(!out.exists());
    }

    #[test]
    fn test_missing_file_is_contained() {
        let (temp, mut group) = fixture();
        group.files.push(temp.path().join("in").join("a_gone.txt"));
        let out = temp.path().join("out");

        let outcome = ArchiveBuilder::new(&out).build(&group);
        assert_eq!(outcome.error().unwrap().kind, ErrorKind::MissingFile);
        assert!(leftover_files(&out).is_empty());
    }

    #[test]
    fn test_invalid_stem_rejected() {
        let (temp, group) = fixture();
        let group = FileGroup::new("../escape", group.files);
        let outcome = ArchiveBuilder::new(temp.path().join("out")).build(&group);
        assert_eq!(outcome.error().unwrap().kind, ErrorKind::InvalidStem);
    }

    #[test]
    fn test_panic_becomes_error_outcome() {
        let (temp, group) = fixture();
        let out = temp.path().join("out");
        let outcome = ArchiveBuilder::new(&out)
            .with_compressor(Arc::new(PanickingCompressor))
            .build(&group);

        let error = outcome.error().unwrap();
        assert_eq!(error.kind, ErrorKind::Panicked);
        assert!(error.message.contains("compressor blew up"));
        assert!(leftover_files(&out).is_empty());
    }

    #[test]
    fn test_timeout_flags_outcome_and_discards_archive() {
        let (temp, group) = fixture();
        let out = temp.path().join("out");
        let outcome = ArchiveBuilder::new(&out)
            .with_timeout(Some(Duration::from_millis(10)))
            .with_compressor(Arc::new(SlowCompressor(Duration::from_millis(50))))
            .build(&group);

        assert_eq!(outcome.error().unwrap().kind, ErrorKind::Timeout);
        assert!(leftover_files(&out).is_empty());
    }
}
