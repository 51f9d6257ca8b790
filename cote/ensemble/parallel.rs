//! Fork-join execution of independent build tasks on a fixed worker pool.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::errors::{EstimatorError, EstimatorResult};

/// Runs batches of independent tasks and returns their results in task order.
///
/// Tasks own everything they mutate and hand results back by value; the only
/// synchronization is the join at the end of each batch. With one thread no
/// pool is created and tasks run inline.
pub struct ParallelBuildExecutor {
    threads: usize,
    pool: Option<ThreadPool>,
}

impl std::fmt::Debug for ParallelBuildExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelBuildExecutor")
            .field("threads", &self.threads)
            .finish()
    }
}

impl ParallelBuildExecutor {
    /// Executor with `threads` workers; zero is treated as one.
    pub fn new(threads: usize) -> EstimatorResult<Self> {
        let threads = threads.max(1);
        let pool = if threads > 1 {
            Some(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|index| format!("cote-build-{index}"))
                    .build()
                    .map_err(|err| EstimatorError::Train(format!("worker pool: {err}")))?,
            )
        } else {
            None
        };
        Ok(Self { threads, pool })
    }

    /// Single-threaded executor.
    #[must_use]
    pub const fn sequential() -> Self {
        Self {
            threads: 1,
            pool: None,
        }
    }

    /// Worker count.
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Tasks per batch when `remaining` tasks are left.
    #[must_use]
    pub fn batch_size(&self, remaining: usize) -> usize {
        self.threads.min(remaining)
    }

    /// Runs every task and waits for all of them. Output order matches input
    /// order whatever order the workers finish in.
    pub fn run_batch<T, R, F>(&self, tasks: Vec<T>, work: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        match &self.pool {
            Some(pool) if tasks.len() > 1 => {
                pool.install(|| tasks.into_par_iter().map(&work).collect())
            }
            _ => tasks.into_iter().map(work).collect(),
        }
    }
}
