use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;

use crate::archive::{ArchiveBuilder, ArchiveOutcome};
use crate::config::ProcessingPolicy;
use crate::parallel::{ExecutionStrategy, ParallelExecutor, SequentialExecutor, WorkerPool};
use crate::stems::FileGroup;

/// How a run was actually executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
    /// The pool failed and every stem was re-run inline
    SequentialFallback,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => f.write_str("sequential"),
            ExecutionMode::Parallel => f.write_str("parallel"),
            ExecutionMode::SequentialFallback => f.write_str("sequential (fallback)"),
        }
    }
}

/// Dispatcher lifecycle.
///
/// `Idle -> Dispatching -> Collecting -> Done`, or on pool failure
/// `Idle -> Dispatching -> PoolSetupFailed -> SequentialFallback -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching,
    Collecting,
    PoolSetupFailed,
    SequentialFallback,
    Done,
}

/// Raw dispatcher output, before aggregation
#[derive(Debug)]
pub struct Dispatch {
    pub outcomes: Vec<ArchiveOutcome>,
    pub mode: ExecutionMode,
    pub workers: usize,
    pub pool_error: Option<String>,
}

/// Runs one [`ArchiveBuilder`] invocation per [`FileGroup`], inline or on a
/// worker pool, and falls back to a full sequential run if the pool fails.
pub struct ParallelDispatcher<P = ParallelExecutor> {
    pool: P,
    state: DispatchState,
    history: Vec<DispatchState>,
}

impl ParallelDispatcher<ParallelExecutor> {
    pub fn new() -> Self {
        Self::with_pool(ParallelExecutor::default())
    }
}

impl Default for ParallelDispatcher<ParallelExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: WorkerPool> ParallelDispatcher<P> {
    pub fn with_pool(pool: P) -> Self {
        Self {
            pool,
            state: DispatchState::Idle,
            history: vec![DispatchState::Idle],
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Every state visited during the last dispatch, starting with `Idle`
    pub fn history(&self) -> &[DispatchState] {
        &self.history
    }

    pub fn dispatch(
        &mut self,
        groups: &[FileGroup],
        builder: &ArchiveBuilder,
        policy: &ProcessingPolicy,
    ) -> Dispatch {
        self.state = DispatchState::Idle;
        self.history = vec![DispatchState::Idle];
        self.transition(DispatchState::Dispatching);

        let strategy = ExecutionStrategy::choose(policy.enabled, groups.len(), policy.max_workers.get());
        let log_progress = |outcome: &ArchiveOutcome, current: usize, total: usize| {
            log_outcome(outcome, current, total, policy.progress_reporting);
        };

        let dispatch = match strategy {
            ExecutionStrategy::Sequential => {
                tracing::debug!("Archiving {} stem(s) sequentially", groups.len());
                self.transition(DispatchState::Collecting);
                Dispatch {
                    outcomes: run_sequential(groups, builder, &log_progress),
                    mode: ExecutionMode::Sequential,
                    workers: 1,
                    pool_error: None,
                }
            }
            ExecutionStrategy::Parallel { workers } => {
                tracing::info!("Archiving {} stems with {} workers", groups.len(), workers);
                let collected = Cell::new(0usize);
                let result = self.pool.execute(
                    workers,
                    groups,
                    |group: &FileGroup, _worker_id: usize| builder.build(group),
                    Some(|outcome: &ArchiveOutcome, current: usize, total: usize| {
                        collected.set(current);
                        log_progress(outcome, current, total);
                    }),
                );

                match result {
                    Ok(outcomes) => {
                        self.transition(DispatchState::Collecting);
                        Dispatch {
                            outcomes,
                            mode: ExecutionMode::Parallel,
                            workers,
                            pool_error: None,
                        }
                    }
                    Err(e) => {
                        self.transition(DispatchState::PoolSetupFailed);
                        if collected.get() > 0 {
                            tracing::warn!("Discarding {} partially collected outcome(s)", collected.get());
                        }
                        tracing::warn!(
                            "Worker pool failed ({}); re-running all {} stems sequentially",
                            e,
                            groups.len()
                        );
                        self.transition(DispatchState::SequentialFallback);
                        Dispatch {
                            outcomes: run_sequential(groups, builder, &log_progress),
                            mode: ExecutionMode::SequentialFallback,
                            workers: 1,
                            pool_error: Some(e.to_string()),
                        }
                    }
                }
            }
        };

        self.transition(DispatchState::Done);
        dispatch
    }

    fn transition(&mut self, next: DispatchState) {
        tracing::debug!("Dispatcher: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

fn run_sequential<F>(groups: &[FileGroup], builder: &ArchiveBuilder, progress: &F) -> Vec<ArchiveOutcome>
where
    F: Fn(&ArchiveOutcome, usize, usize),
{
    SequentialExecutor::execute(groups, |group, _| builder.build(group), Some(progress))
}

fn log_outcome(outcome: &ArchiveOutcome, current: usize, total: usize, progress_reporting: bool) {
    match (outcome.archive_path(), outcome.error()) {
        (Some(path), _) if progress_reporting => {
            tracing::info!("[{}/{}] {} -> {}", current, total, outcome.stem(), path.display());
        }
        (Some(path), _) => {
            tracing::debug!("[{}/{}] {} -> {}", current, total, outcome.stem(), path.display());
        }
        (None, Some(error)) => {
            tracing::warn!("[{}/{}] {} failed: {}", current, total, outcome.stem(), error);
        }
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::PoolError;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Pool that refuses to start
    struct BrokenPool;

    impl WorkerPool for BrokenPool {
        fn execute<T, R, F, P>(&self, _: usize, _: &[T], _: F, _: Option<P>) -> Result<Vec<R>, PoolError>
        where
            T: Sync,
            R: Send,
            F: Fn(&T, usize) -> R + Sync,
            P: Fn(&R, usize, usize),
        {
            Err(PoolError::Unavailable("simulated".to_string()))
        }
    }

    /// Pool that delivers the first result and then fails
    struct HalfPool;

    impl WorkerPool for HalfPool {
        fn execute<T, R, F, P>(&self, _: usize, items: &[T], processor: F, progress: Option<P>) -> Result<Vec<R>, PoolError>
        where
            T: Sync,
            R: Send,
            F: Fn(&T, usize) -> R + Sync,
            P: Fn(&R, usize, usize),
        {
            let first = processor(&items[0], 0);
            if let Some(report) = &progress {
                report(&first, 1, items.len());
            }
            Err(PoolError::Incomplete {
                collected: 1,
                expected: items.len(),
            })
        }
    }

    fn groups(dir: &Path, stems: &[&str]) -> Vec<FileGroup> {
        stems
            .iter()
            .map(|stem| {
                let file = dir.join(format!("{stem}_1.txt"));
                fs::write(&file, stem).unwrap();
                FileGroup::new(*stem, vec![file])
            })
            .collect()
    }

    #[test]
    fn test_parallel_path_states() {
        let temp = TempDir::new().unwrap();
        let groups = groups(temp.path(), &["a", "b", "c"]);
        let builder = ArchiveBuilder::new(temp.path().join("out"));

        let mut dispatcher = ParallelDispatcher::new();
        let dispatch = dispatcher.dispatch(&groups, &builder, &ProcessingPolicy::parallel(2));

        assert_eq!(dispatch.mode, ExecutionMode::Parallel);
        assert_eq!(dispatch.workers, 2);
        assert_eq!(dispatch.outcomes.len(), 3);
        assert_eq!(
            dispatcher.history(),
            &[
                DispatchState::Idle,
                DispatchState::Dispatching,
                DispatchState::Collecting,
                DispatchState::Done
            ]
        );
    }

    #[test]
    fn test_single_stem_runs_inline() {
        let temp = TempDir::new().unwrap();
        let groups = groups(temp.path(), &["solo"]);
        let builder = ArchiveBuilder::new(temp.path().join("out"));

        let mut dispatcher = ParallelDispatcher::with_pool(BrokenPool);
        let dispatch = dispatcher.dispatch(&groups, &builder, &ProcessingPolicy::parallel(4));

        // The broken pool is never touched for a single stem
        assert_eq!(dispatch.mode, ExecutionMode::Sequential);
        assert!(dispatch.outcomes[0].is_success());
    }

    #[test]
    fn test_disabled_policy_is_sequential_in_input_order() {
        let temp = TempDir::new().unwrap();
        let groups = groups(temp.path(), &["z", "m", "a"]);
        let builder = ArchiveBuilder::new(temp.path().join("out"));

        let dispatch = ParallelDispatcher::new().dispatch(&groups, &builder, &ProcessingPolicy::sequential());
        assert_eq!(dispatch.mode, ExecutionMode::Sequential);
        let stems: Vec<_> = dispatch.outcomes.iter().map(|o| o.stem().as_str()).collect();
        assert_eq!(stems, vec!["z", "m", "a"]);
    }

    #[test]
    fn test_pool_failure_falls_back_to_sequential() {
        let temp = TempDir::new().unwrap();
        let groups = groups(temp.path(), &["a", "b"]);
        let builder = ArchiveBuilder::new(temp.path().join("out"));

        let mut dispatcher = ParallelDispatcher::with_pool(BrokenPool);
        let dispatch = dispatcher.dispatch(&groups, &builder, &ProcessingPolicy::parallel(2));

        assert_eq!(dispatch.mode, ExecutionMode::SequentialFallback);
        assert!(dispatch.pool_error.unwrap().contains("simulated"));
        assert_eq!(dispatch.outcomes.len(), 2);
        assert!(dispatch.outcomes.iter().all(ArchiveOutcome::is_success));
        assert_eq!(
            dispatcher.history(),
            &[
                DispatchState::Idle,
                DispatchState::Dispatching,
                DispatchState::PoolSetupFailed,
                DispatchState::SequentialFallback,
                DispatchState::Done
            ]
        );
        assert_eq!(dispatcher.state(), DispatchState::Done);
    }

    #[test]
    fn test_mid_run_failure_discards_partial_results() {
        let temp = TempDir::new().unwrap();
        let groups = groups(temp.path(), &["a", "b", "c"]);
        let builder = ArchiveBuilder::new(temp.path().join("out"));

        let mut dispatcher = ParallelDispatcher::with_pool(HalfPool);
        let recovered = dispatcher.dispatch(&groups, &builder, &ProcessingPolicy::parallel(3));

        assert_eq!(recovered.mode, ExecutionMode::SequentialFallback);
        assert!(recovered.pool_error.as_deref().unwrap().contains("collected 1 of 3"));
        assert_eq!(
            dispatcher.history(),
            &[
                DispatchState::Idle,
                DispatchState::Dispatching,
                DispatchState::PoolSetupFailed,
                DispatchState::SequentialFallback,
                DispatchState::Done
            ]
        );

        // One outcome per stem, same as a plain sequential run
        let sequential = ParallelDispatcher::new().dispatch(&groups, &builder, &ProcessingPolicy::sequential());
        let profile = |d: &Dispatch| -> Vec<(String, bool, Option<std::path::PathBuf>)> {
            d.outcomes
                .iter()
                .map(|o| (o.stem().to_string(), o.is_success(), o.archive_path().map(Path::to_path_buf)))
                .collect()
        };
        assert_eq!(recovered.outcomes.len(), 3);
        assert_eq!(profile(&recovered), profile(&sequential));
    }
}
