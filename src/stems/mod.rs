//! Stem resolution: grouping a directory listing into per-stem file groups
//!
//! Grouping is purely by file name. A file belongs to stem `S` when its
//! extension is accepted and its file stem is either exactly `S` or starts
//! with `S` followed by a separator (`_`, `-`, `.` or a space). A file that
//! matches several stems goes to the longest one, so `sales_eu_q1.csv` lands
//! in `sales_eu` rather than `sales` when both are requested.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const STEM_SEPARATORS: [char; 4] = ['_', '-', '.', ' '];

/// Grouping key shared by all files archived together
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stem(String);

impl Stem {
    pub fn new(value: impl Into<String>) -> Self {
        Stem(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Stem {
    fn from(value: &str) -> Self {
        Stem(value.to_string())
    }
}

impl From<String> for Stem {
    fn from(value: String) -> Self {
        Stem(value)
    }
}

/// Files resolved for one stem in one run. Never mutated after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroup {
    pub stem: Stem,
    pub files: Vec<PathBuf>,
}

impl FileGroup {
    pub fn new(stem: impl Into<Stem>, files: Vec<PathBuf>) -> Self {
        Self {
            stem: stem.into(),
            files,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Groups candidate files by stem and extension
#[derive(Debug, Clone, Default)]
pub struct StemResolver {
    extensions: Vec<String>,
    recursive: bool,
    excluded: Vec<PathBuf>,
}

impl StemResolver {
    /// `extensions` may be given with or without a leading dot; an empty list
    /// accepts every extension. Multi-part extensions such as `tar.gz` are
    /// matched against the end of the file name.
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        let extensions = extensions
            .iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            extensions,
            recursive: false,
            excluded: Vec::new(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Never descend into `dir`. Used to keep the output directory, and the
    /// archives from earlier runs inside it, out of the listing.
    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    /// Resolve one [`FileGroup`] per unique stem, in the order stems were given.
    ///
    /// Stems with no matching files still get an (empty) group. The only
    /// error is an unreadable input directory.
    pub fn resolve<S: AsRef<str>>(&self, input_dir: &Path, stems: &[S]) -> Result<Vec<FileGroup>> {
        let root = input_dir
            .canonicalize()
            .with_context(|| format!("Input directory not found: {}", input_dir.display()))?;
        if !root.is_dir() {
            bail!("Input path is not a directory: {}", root.display());
        }

        let stems = unique_stems(stems);
        let mut buckets: Vec<Vec<PathBuf>> = vec![Vec::new(); stems.len()];

        for path in self.list_candidates(&root)? {
            if path.file_name().and_then(|n| n.to_str()).is_none() {
                tracing::warn!("Skipping file with non UTF-8 name: {}", path.display());
                continue;
            }
            if !self.accepts_extension(&path) {
                continue;
            }
            let Some(file_stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(index) = best_match(file_stem, &stems) {
                buckets[index].push(path);
            }
        }

        let groups: Vec<FileGroup> = stems
            .into_iter()
            .zip(buckets)
            .map(|(stem, mut files)| {
                files.sort();
                FileGroup { stem, files }
            })
            .collect();

        for group in &groups {
            tracing::debug!("Resolved stem '{}' -> {} file(s)", group.stem, group.files.len());
        }

        Ok(groups)
    }

    fn list_candidates(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        // Directories that don't exist yet can't hold anything to skip
        let excluded: Vec<PathBuf> = self
            .excluded
            .iter()
            .filter_map(|dir| dir.canonicalize().ok())
            .filter(|dir| dir != root)
            .collect();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let skip = entry.file_type().is_dir() && excluded.iter().any(|dir| entry.path() == dir);
                if skip {
                    tracing::debug!("Not descending into {}", entry.path().display());
                }
                !skip
            });

        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.path().is_file() {
                        files.push(entry.into_path());
                    }
                }
                Err(e) if e.depth() == 0 => {
                    return Err(e).with_context(|| format!("Failed to read {}", root.display()));
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                }
            }
        }
        Ok(files)
    }

    fn accepts_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name.to_lowercase();
        self.extensions.iter().any(|ext| {
            name.strip_suffix(ext.as_str())
                .and_then(|rest| rest.strip_suffix('.'))
                .is_some_and(|base| !base.is_empty())
        })
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

fn unique_stems<S: AsRef<str>>(stems: &[S]) -> Vec<Stem> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(stems.len());
    for stem in stems {
        let stem = stem.as_ref();
        if seen.insert(stem.to_string()) {
            unique.push(Stem::from(stem));
        } else {
            tracing::warn!("Duplicate stem '{}' ignored", stem);
        }
    }
    unique
}

fn stem_matches(file_stem: &str, stem: &str) -> bool {
    if stem.is_empty() {
        return false;
    }
    match file_stem.strip_prefix(stem) {
        Some("") => true,
        Some(rest) => rest.starts_with(STEM_SEPARATORS),
        None => false,
    }
}

/// Index of the longest stem matching `file_stem`
fn best_match(file_stem: &str, stems: &[Stem]) -> Option<usize> {
    stems
        .iter()
        .enumerate()
        .filter(|(_, stem)| stem_matches(file_stem, stem.as_str()))
        .max_by_key(|(_, stem)| stem.as_str().len())
        .map(|(index, _)| index)
}
