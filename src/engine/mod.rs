//! The archiving engine
//!
//! One run flows through four stages:
//!
//! ```text
//! RawParallelConfig ──▶ ConfigValidator ──▶ ProcessingPolicy
//!                                                  │
//! stems + dir ──▶ StemResolver ──▶ [FileGroup] ──▶ ParallelDispatcher ──▶ ResultAggregator ──▶ RunResult
//!                                                  │ (ArchiveBuilder per stem)
//! ```
//!
//! The engine never fails because of a single stem or because the worker pool
//! could not be started. Failures show up in the `error` of individual
//! outcomes and in [`RunResult::failed`]. The only `Err` from
//! [`Engine::process`] is an input directory that cannot be listed.
//!
//! ```rust,no_run
//! use stemzip::config::RawParallelConfig;
//! use stemzip::engine::Engine;
//! use std::path::Path;
//!
//! let engine = Engine::new("archives");
//! let result = engine.process(
//!     &["sales", "inventory"],
//!     Path::new("exports"),
//!     &["csv", "xlsx"],
//!     &RawParallelConfig::default(),
//! )?;
//! println!("{} of {} stems archived", result.succeeded, result.total());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod aggregate;
pub mod dispatcher;
pub mod report;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::archive::{ArchiveBuilder, Compressor, ZipCompressor};
use crate::config::{ArchiveSettings, ConfigValidator, ProcessingPolicy, RawParallelConfig};
use crate::parallel::{ParallelExecutor, WorkerPool};
use crate::stems::{FileGroup, StemResolver};

pub use aggregate::{OutcomeOrder, ResultAggregator, RunResult};
pub use dispatcher::{Dispatch, DispatchState, ExecutionMode, ParallelDispatcher};
pub use report::{ERROR_REPORT_FILE, ErrorReport};

pub struct Engine<P = ParallelExecutor> {
    output_dir: PathBuf,
    recursive: bool,
    order: OutcomeOrder,
    validator: ConfigValidator,
    compressor: Arc<dyn Compressor>,
    pool: P,
}

impl Engine<ParallelExecutor> {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            recursive: false,
            order: OutcomeOrder::default(),
            validator: ConfigValidator::new(),
            compressor: Arc::new(ZipCompressor::default()),
            pool: ParallelExecutor::default(),
        }
    }

    pub fn from_settings(settings: &ArchiveSettings) -> Self {
        Self::new(&settings.output_dir)
            .recursive(settings.recursive)
            .order(settings.order)
    }
}

impl<P: WorkerPool> Engine<P> {
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn order(mut self, order: OutcomeOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_validator(mut self, validator: ConfigValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Swap the worker pool implementation
    pub fn with_pool<Q: WorkerPool>(self, pool: Q) -> Engine<Q> {
        Engine {
            output_dir: self.output_dir,
            recursive: self.recursive,
            order: self.order,
            validator: self.validator,
            compressor: self.compressor,
            pool,
        }
    }

    /// Resolve stems in `input_directory`, validate the policy, and archive
    /// every stem.
    pub fn process<S, E>(
        &self,
        stems: &[S],
        input_directory: &Path,
        extensions: &[E],
        raw_policy: &RawParallelConfig,
    ) -> Result<RunResult>
    where
        S: AsRef<str>,
        E: AsRef<str>,
    {
        let groups = StemResolver::new(extensions)
            .recursive(self.recursive)
            .exclude(&self.output_dir)
            .resolve(input_directory, stems)?;
        let policy = self.validator.validate(raw_policy, groups.len());
        Ok(self.run(&groups, &policy))
    }

    /// Archive already-resolved groups under an already-validated policy
    pub fn run(&self, groups: &[FileGroup], policy: &ProcessingPolicy) -> RunResult {
        let started = Instant::now();
        let builder = ArchiveBuilder::new(&self.output_dir)
            .with_timeout(policy.timeout_per_task)
            .with_compressor(Arc::clone(&self.compressor));

        let dispatch = ParallelDispatcher::with_pool(&self.pool).dispatch(groups, &builder, policy);
        let mut result = ResultAggregator::new(self.order).aggregate(dispatch, groups, started.elapsed());

        if policy.save_error_reports {
            if result.has_failures() {
                match ErrorReport::from_result(&result).save(&self.output_dir) {
                    Ok(path) => {
                        tracing::info!("Error report written to {}", path.display());
                        result.error_report = Some(path);
                    }
                    Err(e) => tracing::warn!("Could not save error report: {:#}", e),
                }
            } else if let Err(e) = ErrorReport::clear(&self.output_dir) {
                tracing::warn!("Could not remove stale error report: {:#}", e);
            }
        }

        result
    }
}
