//! Data-parallel execution of pipeline stages.
//!
//! A stage hands a collection of independent units to a
//! [`ParallelExecutor`] together with a requested partition count. The
//! executor runs partitions concurrently; units inside a partition run in
//! sequence. Three shapes are offered on top of the single required method:
//!
//! - [`ParallelExecutor::map`]: one result per unit, returned in input order
//! - [`ParallelExecutor::map_with_sideband`]: results plus a [`Sideband`]
//!   each unit may append to, merged across partitions by the caller
//! - [`ParallelExecutor::for_each`]: side effects only
//!
//! The first unit error aborts the stage and is returned.
//!
//! # Example
//!
//! ```
//! use tilechunk::executor::{ParallelExecutor, RayonExecutor};
//!
//! let executor = RayonExecutor::new(2).unwrap();
//! let squares = executor.map((1..=4).collect(), 2, |n: u32| Ok(n * n)).unwrap();
//! assert_eq!(squares, vec![1, 4, 9, 16]);
//! ```

mod pool;

pub use pool::RayonExecutor;

use crate::error::ChunkResult;

/// Commutative side channel filled by units of a parallel stage.
///
/// Each partition owns its own sideband; the executor merges them in
/// whatever order partitions finish. Consumers that need a stable order must
/// sort, e.g. with [`Sideband::into_sorted_by_key`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sideband<S> {
    items: Vec<S>,
}

impl<S> Default for Sideband<S> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<S> Sideband<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: S) {
        self.items.push(item);
    }

    /// Appends everything collected by `other`.
    pub fn merge(&mut self, other: Sideband<S>) {
        self.items.extend(other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Collected items in merge order.
    pub fn into_vec(self) -> Vec<S> {
        self.items
    }

    pub fn into_sorted_by_key<K: Ord>(self, key: impl FnMut(&S) -> K) -> Vec<S> {
        let mut items = self.items;
        items.sort_by_key(key);
        items
    }
}

/// Splits `items` round-robin into at most `count` non-empty partitions.
pub fn partition<T>(items: Vec<T>, count: usize) -> Vec<Vec<T>> {
    let count = count.clamp(1, items.len().max(1));
    let mut partitions: Vec<Vec<T>> = (0..count).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        partitions[i % count].push(item);
    }
    partitions.retain(|p| !p.is_empty());
    partitions
}

/// Runs partitions of independent work units.
pub trait ParallelExecutor: Send + Sync {
    /// Applies `work` to every partition and collects one value per
    /// partition. The order of the returned values is up to the
    /// implementation; stop at the first error.
    fn run_partitions<T, R, F>(&self, partitions: Vec<Vec<T>>, work: F) -> ChunkResult<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(Vec<T>) -> ChunkResult<R> + Send + Sync;

    /// Applies `f` to every item; results keep input order.
    fn map<T, R, F>(&self, items: Vec<T>, partitions: usize, f: F) -> ChunkResult<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> ChunkResult<R> + Send + Sync,
    {
        let (results, _) = self.map_with_sideband(items, partitions, |item, _: &mut Sideband<()>| f(item))?;
        Ok(results)
    }

    /// Like [`map`](Self::map), also handing each unit its partition's
    /// sideband. The merged sideband is returned next to the results.
    fn map_with_sideband<T, R, S, F>(
        &self,
        items: Vec<T>,
        partitions: usize,
        f: F,
    ) -> ChunkResult<(Vec<R>, Sideband<S>)>
    where
        T: Send,
        R: Send,
        S: Send,
        F: Fn(T, &mut Sideband<S>) -> ChunkResult<R> + Send + Sync,
    {
        let indexed: Vec<(usize, T)> = items.into_iter().enumerate().collect();
        let outputs = self.run_partitions(partition(indexed, partitions), |part| {
            let mut sideband = Sideband::new();
            let results = part
                .into_iter()
                .map(|(index, item)| f(item, &mut sideband).map(|r| (index, r)))
                .collect::<ChunkResult<Vec<_>>>()?;
            Ok((results, sideband))
        })?;

        let mut merged = Sideband::new();
        let mut results = Vec::new();
        for (part_results, sideband) in outputs {
            results.extend(part_results);
            merged.merge(sideband);
        }
        results.sort_by_key(|(index, _)| *index);
        Ok((results.into_iter().map(|(_, r)| r).collect(), merged))
    }

    /// Applies `f` to every item for its side effects.
    fn for_each<T, F>(&self, items: Vec<T>, partitions: usize, f: F) -> ChunkResult<()>
    where
        T: Send,
        F: Fn(T) -> ChunkResult<()> + Send + Sync,
    {
        self.run_partitions(partition(items, partitions), |part| {
            part.into_iter().try_for_each(&f)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChunkError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runs partitions sequentially, last partition first.
    struct Reversed;

    impl ParallelExecutor for Reversed {
        fn run_partitions<T, R, F>(&self, partitions: Vec<Vec<T>>, work: F) -> ChunkResult<Vec<R>>
        where
            T: Send,
            R: Send,
            F: Fn(Vec<T>) -> ChunkResult<R> + Send + Sync,
        {
            partitions.into_iter().rev().map(work).collect()
        }
    }

    #[test]
    fn test_partition_round_robin() {
        let parts = partition((0..7).collect(), 3);
        assert_eq!(parts, vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
    }

    #[test]
    fn test_partition_count_bounded_by_items() {
        assert_eq!(partition(vec![1, 2], 10).len(), 2);
        assert_eq!(partition(vec![1, 2], 0), vec![vec![1, 2]]);
        assert!(partition(Vec::<u8>::new(), 4).is_empty());
    }

    #[test]
    fn test_map_restores_input_order() {
        let out = Reversed.map((0..10).collect(), 4, |n: u32| Ok(n + 100)).unwrap();
        assert_eq!(out, (100..110).collect::<Vec<_>>());
    }

    #[test]
    fn test_sideband_merge_order_is_unspecified_until_sorted() {
        let (_, sideband) = Reversed
            .map_with_sideband((0..6).collect(), 3, |n: usize, side: &mut Sideband<usize>| {
                side.add(n);
                Ok(())
            })
            .unwrap();

        let merged = sideband.clone().into_vec();
        assert_eq!(merged.len(), 6);
        assert_ne!(merged, (0..6).collect::<Vec<_>>());
        assert_eq!(sideband.into_sorted_by_key(|n| *n), (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_first_error_aborts() {
        let seen = AtomicUsize::new(0);
        let err = Reversed
            .for_each((0..10).collect(), 1, |n: u32| {
                seen.fetch_add(1, Ordering::SeqCst);
                if n == 3 {
                    Err(ChunkError::Executor("boom".to_string()))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();

        assert!(matches!(err, ChunkError::Executor(_)));
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }
}
