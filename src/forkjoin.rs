//! Size-bounded fork-join scheduling over scoped OS threads.
//!
//! The sort, tree-build, and decode stages all share the same pattern:
//! given a problem size, run the subtask inline when it is below a
//! threshold (or when the thread budget is exhausted), otherwise spawn it
//! and hand back a waitable handle. Parent tasks fork two or more
//! subtasks over disjoint data and block on every handle before
//! recombining, so the join is the only synchronization point.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{Scope, ScopedJoinHandle};

/// Subproblems smaller than this run inline by default. The same limit
/// doubles as the sequential cutoff of the concurrent merge sort.
pub const DEFAULT_SEQUENTIAL_LIMIT: usize = 10_000;

/// A fork-join scheduler with a fixed spawn threshold and a CPU-count
/// thread budget. Cheap to share by reference across recursion levels.
pub struct ForkJoin {
    threshold: usize,
    permits: AtomicUsize,
}

/// A forked subtask: either already completed inline or running on a
/// scoped thread.
pub enum Task<'scope, T> {
    Inline(T),
    Spawned(ScopedJoinHandle<'scope, T>),
}

impl<'scope, T> Task<'scope, T> {
    /// Block until the subtask's result is available.
    pub fn wait(self) -> T {
        match self {
            Task::Inline(value) => value,
            Task::Spawned(handle) => match handle.join() {
                Ok(value) => value,
                Err(panic) => std::panic::resume_unwind(panic),
            },
        }
    }
}

impl ForkJoin {
    /// A scheduler with `threshold` and one permit per available CPU.
    pub fn new(threshold: usize) -> ForkJoin {
        ForkJoin::with_parallelism(threshold, num_cpus::get())
    }

    /// A scheduler with an explicit thread budget. The calling thread
    /// counts against the budget, so `parallelism` of 1 never spawns.
    pub fn with_parallelism(threshold: usize, parallelism: usize) -> ForkJoin {
        ForkJoin {
            threshold,
            permits: AtomicUsize::new(parallelism.saturating_sub(1)),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Run `f` inline when `size` is below the threshold or no thread
    /// permit is free; otherwise spawn it on `scope` and return a
    /// handle. The permit is returned when the subtask finishes.
    pub fn run<'scope, 'env, T, F>(
        &'env self,
        scope: &'scope Scope<'scope, 'env>,
        size: usize,
        f: F,
    ) -> Task<'scope, T>
    where
        T: Send + 'scope,
        F: FnOnce() -> T + Send + 'scope,
    {
        if size < self.threshold || !self.try_acquire() {
            return Task::Inline(f());
        }
        Task::Spawned(scope.spawn(move || {
            let value = f();
            self.release();
            value
        }))
    }

    /// Fork two subtasks and wait for both.
    pub fn join<A, B, FA, FB>(&self, size_a: usize, fa: FA, size_b: usize, fb: FB) -> (A, B)
    where
        A: Send,
        B: Send,
        FA: FnOnce() -> A + Send,
        FB: FnOnce() -> B + Send,
    {
        std::thread::scope(|scope| {
            let task_a = self.run(scope, size_a, fa);
            let task_b = self.run(scope, size_b, fb);
            (task_a.wait(), task_b.wait())
        })
    }

    fn try_acquire(&self) -> bool {
        self.permits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| p.checked_sub(1))
            .is_ok()
    }

    fn release(&self) {
        self.permits.fetch_add(1, Ordering::AcqRel);
    }
}
