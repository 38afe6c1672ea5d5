use crossbeam::channel::{Receiver, Sender, bounded};
use thiserror::Error;

/// Failures of the pool itself, as opposed to failures of the work it runs
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: String,
        source: std::io::Error,
    },

    #[error("a worker thread panicked during parallel execution")]
    WorkerPanicked,

    #[error("collected {collected} of {expected} results")]
    Incomplete { collected: usize, expected: usize },

    #[error("worker pool unavailable: {0}")]
    Unavailable(String),
}

/// A bounded pool that runs `processor` once per item.
///
/// Results come back in completion order. `progress` is invoked from the
/// collecting thread as `(result, completed, total)` after every item.
pub trait WorkerPool {
    fn execute<T, R, F, P>(
        &self,
        workers: usize,
        items: &[T],
        processor: F,
        progress: Option<P>,
    ) -> Result<Vec<R>, PoolError>
    where
        T: Sync,
        R: Send,
        F: Fn(&T, usize) -> R + Sync,
        P: Fn(&R, usize, usize);
}

impl<W: WorkerPool + ?Sized> WorkerPool for &W {
    fn execute<T, R, F, P>(
        &self,
        workers: usize,
        items: &[T],
        processor: F,
        progress: Option<P>,
    ) -> Result<Vec<R>, PoolError>
    where
        T: Sync,
        R: Send,
        F: Fn(&T, usize) -> R + Sync,
        P: Fn(&R, usize, usize),
    {
        (**self).execute(workers, items, processor, progress)
    }
}

/// Scoped-thread producer/consumer pool built on crossbeam channels
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    buffer_multiplier: usize,
    thread_name: String,
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self {
            buffer_multiplier: 2,
            thread_name: "stemzip-worker".to_string(),
        }
    }
}

/// Context for worker threads to avoid too many function parameters
struct WorkerContext<'a, T, R, F> {
    worker_id: usize,
    work_rx: Receiver<&'a T>,
    result_tx: Sender<R>,
    processor: &'a F,
}

impl<'a, T, R, F> WorkerContext<'a, T, R, F>
where
    F: Fn(&T, usize) -> R,
{
    fn run(self) {
        while let Ok(item) = self.work_rx.recv() {
            let result = (self.processor)(item, self.worker_id);
            if self.result_tx.send(result).is_err() {
                break; // Collector dropped
            }
        }
    }
}

impl ParallelExecutor {
    fn collect_results<R, P>(
        result_rx: Receiver<R>,
        total_items: usize,
        progress: Option<&P>,
    ) -> Vec<R>
    where
        P: Fn(&R, usize, usize),
    {
        let mut results = Vec::with_capacity(total_items);

        while let Ok(result) = result_rx.recv() {
            if let Some(report) = progress {
                report(&result, results.len() + 1, total_items);
            }
            results.push(result);

            if results.len() >= total_items {
                break;
            }
        }

        results
    }
}

impl WorkerPool for ParallelExecutor {
    fn execute<T, R, F, P>(
        &self,
        workers: usize,
        items: &[T],
        processor: F,
        progress: Option<P>,
    ) -> Result<Vec<R>, PoolError>
    where
        T: Sync,
        R: Send,
        F: Fn(&T, usize) -> R + Sync,
        P: Fn(&R, usize, usize),
    {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let actual_workers = std::cmp::min(workers, items.len());
        let buffer_size = actual_workers * self.buffer_multiplier;
        let total_items = items.len();
        let processor = &processor;

        let results = crossbeam::thread::scope(|s| -> Result<Vec<R>, PoolError> {
            // Channels live inside the scope so an early return drops every
            // sender and lets already-spawned workers exit before the join.
            let (work_tx, work_rx) = bounded::<&T>(buffer_size);
            let (result_tx, result_rx) = bounded::<R>(buffer_size);

            for worker_id in 0..actual_workers {
                let ctx = WorkerContext {
                    worker_id,
                    work_rx: work_rx.clone(),
                    result_tx: result_tx.clone(),
                    processor,
                };
                let role = format!("{}-{}", self.thread_name, worker_id);
                s.builder()
                    .name(role.clone())
                    .spawn(move |_| ctx.run())
                    .map_err(|source| PoolError::Spawn { role, source })?;
            }

            drop(work_rx);
            drop(result_tx);

            // Producer thread: send work to workers
            let role = format!("{}-producer", self.thread_name);
            s.builder()
                .name(role.clone())
                .spawn(move |_| {
                    for item in items {
                        if work_tx.send(item).is_err() {
                            break; // Workers dropped
                        }
                    }
                })
                .map_err(|source| PoolError::Spawn { role, source })?;

            Ok(Self::collect_results(result_rx, total_items, progress.as_ref()))
        })
        .map_err(|_| PoolError::WorkerPanicked)??;

        if results.len() != total_items {
            return Err(PoolError::Incomplete {
                collected: results.len(),
                expected: total_items,
            });
        }

        Ok(results)
    }
}

/// Runs items one at a time on the calling thread, in input order
pub struct SequentialExecutor;

impl SequentialExecutor {
    pub fn execute<T, R, F, P>(items: &[T], processor: F, progress: Option<P>) -> Vec<R>
    where
        F: Fn(&T, usize) -> R,
        P: Fn(&R, usize, usize),
    {
        let total_items = items.len();
        let mut results = Vec::with_capacity(total_items);

        for (index, item) in items.iter().enumerate() {
            let result = processor(item, 0); // Sequential uses worker_id 0
            if let Some(report) = &progress {
                report(&result, index + 1, total_items);
            }
            results.push(result);
        }

        results
    }
}

/// Execution strategy enum for choosing between parallel and sequential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Sequential,
    Parallel { workers: usize },
}

impl ExecutionStrategy {
    /// Parallel only when enabled and there is more than one item; a single
    /// item never justifies starting a pool.
    pub fn choose(enabled: bool, item_count: usize, max_workers: usize) -> Self {
        if enabled && item_count > 1 {
            ExecutionStrategy::Parallel {
                workers: std::cmp::min(max_workers.max(1), item_count),
            }
        } else {
            ExecutionStrategy::Sequential
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            ExecutionStrategy::Sequential => 1,
            ExecutionStrategy::Parallel { workers } => *workers,
        }
    }
}

/// Number of logical CPUs available to this process
pub fn available_cores() -> usize {
    num_cpus::get().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_sequential_executor() {
        let items = vec![1, 2, 3, 4, 5];
        let results = SequentialExecutor::execute(&items, |x, _| x * 2, None::<fn(&i32, usize, usize)>);
        assert_eq!(results, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_parallel_executor() {
        let items = vec![1, 2, 3, 4, 5];
        let results = ParallelExecutor::default()
            .execute(2, &items, |x, _| x * 2, None::<fn(&i32, usize, usize)>)
            .unwrap();

        // Results may be in different order due to parallel execution
        let mut sorted_results = results;
        sorted_results.sort();
        assert_eq!(sorted_results, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_parallel_respects_worker_bound() {
        let items: Vec<usize> = (0..12).collect();
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let worker_ids = Mutex::new(HashSet::new());

        ParallelExecutor::default()
            .execute(
                3,
                &items,
                |x, worker_id| {
                    worker_ids.lock().unwrap().insert(worker_id);
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    *x
                },
                None::<fn(&usize, usize, usize)>,
            )
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(worker_ids.lock().unwrap().iter().all(|id| *id < 3));
    }

    #[test]
    fn test_progress_counts_every_item() {
        let items = vec!["a", "b", "c"];
        let seen = Mutex::new(Vec::new());
        ParallelExecutor::default()
            .execute(
                2,
                &items,
                |s, _| s.to_uppercase(),
                Some(|_: &String, current: usize, total: usize| {
                    seen.lock().unwrap().push((current, total));
                }),
            )
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_zero_workers_is_a_pool_error() {
        let result = ParallelExecutor::default().execute(0, &[1], |x, _| *x, None::<fn(&i32, usize, usize)>);
        assert!(matches!(result, Err(PoolError::NoWorkers)));
    }

    #[test]
    fn test_panicking_worker_fails_the_pool() {
        let items: Vec<i32> = (0..6).collect();
        let result = ParallelExecutor::default().execute(
            2,
            &items,
            |x, _| {
                if *x == 3 {
                    panic!("worker died on item {x}");
                }
                *x
            },
            None::<fn(&i32, usize, usize)>,
        );
        assert!(matches!(result, Err(PoolError::WorkerPanicked)));
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(ExecutionStrategy::choose(true, 1, 8), ExecutionStrategy::Sequential);
        assert_eq!(ExecutionStrategy::choose(false, 5, 8), ExecutionStrategy::Sequential);
        assert_eq!(
            ExecutionStrategy::choose(true, 3, 8),
            ExecutionStrategy::Parallel { workers: 3 }
        );
        assert_eq!(
            ExecutionStrategy::choose(true, 10, 2),
            ExecutionStrategy::Parallel { workers: 2 }
        );
    }
}
