//! Generic parallel execution framework
//!
//! This module owns **execution strategy** and **worker management**. It knows
//! nothing about stems or archives: callers hand it a slice of work items and
//! a processor function, and get results back.
//!
//! - [`ParallelExecutor`] runs items on a bounded set of scoped OS threads fed
//!   through crossbeam channels (producer, N workers, collector).
//! - [`SequentialExecutor`] runs items inline, in input order.
//! - [`ExecutionStrategy`] picks between the two.
//! - [`WorkerPool`] is the seam the dispatcher talks to, so pool
//!   infrastructure can be swapped out (or made to fail) without touching the
//!   work itself.
//!
//! ```rust
//! use stemzip::parallel::{ExecutionStrategy, ParallelExecutor, WorkerPool};
//!
//! let strategy = ExecutionStrategy::choose(true, 4, 2);
//! assert_eq!(strategy, ExecutionStrategy::Parallel { workers: 2 });
//!
//! let items = vec![1, 2, 3, 4];
//! let mut doubled = ParallelExecutor::default()
//!     .execute(strategy.workers(), &items, |x, _worker| x * 2, None::<fn(&i32, usize, usize)>)
//!     .unwrap();
//! doubled.sort();
//! assert_eq!(doubled, vec![2, 4, 6, 8]);
//! ```

pub mod core;

pub use self::core::{
    ExecutionStrategy, ParallelExecutor, PoolError, SequentialExecutor, WorkerPool, available_cores,
};
