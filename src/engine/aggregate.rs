use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::dispatcher::{Dispatch, ExecutionMode};
use crate::archive::{ArchiveOutcome, OutcomeRecord};
use crate::stems::{FileGroup, Stem};

/// Order in which outcomes are returned.
///
/// Parallel runs naturally produce completion order. Callers that need a
/// stable order ask for `Input` explicitly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeOrder {
    /// As results were collected (input order for sequential runs)
    #[default]
    Completion,
    /// Same order as the stems were requested
    Input,
}

/// Everything a caller gets back from one engine run
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub outcomes: Vec<ArchiveOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub mode: ExecutionMode,
    pub workers: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_report: Option<PathBuf>,
}

impl RunResult {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn outcome(&self, stem: &str) -> Option<&ArchiveOutcome> {
        self.outcomes.iter().find(|o| o.stem().as_str() == stem)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ArchiveOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Client-side ordering helper for callers that want alphabetical output
    pub fn sort_by_stem(&mut self) {
        self.outcomes.sort_by(|a, b| a.stem().cmp(b.stem()));
    }

    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.outcomes.iter().map(ArchiveOutcome::to_record).collect()
    }
}

/// Folds dispatcher output into a [`RunResult`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator {
    order: OutcomeOrder,
}

impl ResultAggregator {
    pub fn new(order: OutcomeOrder) -> Self {
        Self { order }
    }

    pub fn aggregate(&self, dispatch: Dispatch, groups: &[FileGroup], elapsed: Duration) -> RunResult {
        let mut outcomes = dispatch.outcomes;

        if self.order == OutcomeOrder::Input {
            let positions: HashMap<&Stem, usize> =
                groups.iter().enumerate().map(|(i, g)| (&g.stem, i)).collect();
            outcomes.sort_by_key(|o| positions.get(o.stem()).copied().unwrap_or(usize::MAX));
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        let succeeded = outcomes.len() - failed;

        if failed > 0 {
            tracing::warn!("{} of {} stems failed", failed, outcomes.len());
        } else {
            tracing::debug!("All {} stems archived", outcomes.len());
        }

        RunResult {
            outcomes,
            succeeded,
            failed,
            mode: dispatch.mode,
            workers: dispatch.workers,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            pool_error: dispatch.pool_error,
            error_report: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveError;

    fn ok(stem: &str) -> ArchiveOutcome {
        ArchiveOutcome::success(Stem::from(stem), PathBuf::from(format!("/out/{stem}.zip")), Vec::new())
    }

    fn failed(stem: &str) -> ArchiveOutcome {
        ArchiveOutcome::failure(
            Stem::from(stem),
            Vec::new(),
            ArchiveError::NoFiles {
                stem: stem.to_string(),
            },
        )
    }

    fn dispatch(outcomes: Vec<ArchiveOutcome>) -> Dispatch {
        Dispatch {
            outcomes,
            mode: ExecutionMode::Parallel,
            workers: 2,
            pool_error: None,
        }
    }

    fn groups(stems: &[&str]) -> Vec<FileGroup> {
        stems.iter().map(|s| FileGroup::new(*s, Vec::new())).collect()
    }

    #[test]
    fn test_counts() {
        let result = ResultAggregator::default().aggregate(
            dispatch(vec![ok("a"), failed("b"), ok("c")]),
            &groups(&["a", "b", "c"]),
            Duration::from_millis(12),
        );
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.total(), 3);
        assert_eq!(result.elapsed_ms, 12);
        assert_eq!(result.failures().next().unwrap().stem().as_str(), "b");
    }

    #[test]
    fn test_completion_order_is_kept_by_default() {
        let result = ResultAggregator::default().aggregate(
            dispatch(vec![ok("c"), ok("a"), ok("b")]),
            &groups(&["a", "b", "c"]),
            Duration::ZERO,
        );
        let stems: Vec<_> = result.outcomes.iter().map(|o| o.stem().as_str()).collect();
        assert_eq!(stems, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_input_order_on_request() {
        let result = ResultAggregator::new(OutcomeOrder::Input).aggregate(
            dispatch(vec![ok("c"), ok("a"), ok("b")]),
            &groups(&["b", "c", "a"]),
            Duration::ZERO,
        );
        let stems: Vec<_> = result.outcomes.iter().map(|o| o.stem().as_str()).collect();
        assert_eq!(stems, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_by_stem_and_lookup() {
        let mut result = ResultAggregator::default().aggregate(
            dispatch(vec![ok("c"), failed("a")]),
            &groups(&["a", "c"]),
            Duration::ZERO,
        );
        result.sort_by_stem();
        assert_eq!(result.outcomes[0].stem().as_str(), "a");
        assert!(result.outcome("a").unwrap().error().is_some());
        assert!(result.outcome("missing").is_none());
        assert_eq!(result.records()[1].zip_file_path, Some(PathBuf::from("/out/c.zip")));
    }
}
