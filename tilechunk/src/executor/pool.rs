//! Rayon-backed executor.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use super::ParallelExecutor;
use crate::error::{ChunkError, ChunkResult};

/// Runs each partition as one task on a dedicated rayon pool.
pub struct RayonExecutor {
    pool: ThreadPool,
}

impl RayonExecutor {
    /// Creates a pool with `threads` workers (0 = one per CPU).
    pub fn new(threads: usize) -> ChunkResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tilechunk-worker-{}", i))
            .build()
            .map_err(|e| ChunkError::Executor(e.to_string()))?;
        debug!(threads = pool.current_num_threads(), "Created worker pool");
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ParallelExecutor for RayonExecutor {
    fn run_partitions<T, R, F>(&self, partitions: Vec<Vec<T>>, work: F) -> ChunkResult<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(Vec<T>) -> ChunkResult<R> + Send + Sync,
    {
        self.pool
            .install(|| partitions.into_par_iter().map(&work).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Sideband;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn test_thread_count() {
        assert_eq!(RayonExecutor::new(3).unwrap().threads(), 3);
    }

    #[test]
    fn test_map_keeps_order() {
        let executor = RayonExecutor::new(4).unwrap();
        let out = executor
            .map((0..1000u64).collect(), 16, |n| Ok(n * 2))
            .unwrap();
        assert_eq!(out, (0..1000u64).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_sideband_collects_every_unit() {
        let executor = RayonExecutor::new(4).unwrap();
        let (_, side) = executor
            .map_with_sideband((0..50usize).collect(), 7, |n, side: &mut Sideband<usize>| {
                side.add(n);
                Ok(n)
            })
            .unwrap();
        assert_eq!(side.into_sorted_by_key(|n| *n), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_partitions_run_on_pool_threads() {
        let executor = RayonExecutor::new(2).unwrap();
        let names = Mutex::new(HashSet::new());
        executor
            .for_each((0..20).collect(), 4, |_: u32| {
                let name = std::thread::current().name().unwrap_or_default().to_string();
                names.lock().unwrap().insert(name);
                Ok(())
            })
            .unwrap();

        let names = names.into_inner().unwrap();
        assert!(names.iter().all(|n| n.starts_with("tilechunk-worker-")));
    }

    #[test]
    fn test_error_propagates() {
        let executor = RayonExecutor::new(2).unwrap();
        let result = executor.for_each((0..20).collect(), 4, |n: u32| {
            if n == 13 {
                Err(ChunkError::Executor("unlucky".to_string()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
    }
}
