//! Runner for many small, independent tasks.
//!
//! Workers pull task indices from one shared counter, so uneven task
//! costs balance out without pre-partitioning:
//!
//! ```text
//! next ──► [0][1][2][3][4][5] ...
//!           ▲  ▲  ▲
//!     caller  helper helper      (helpers run on rayon)
//! ```
//!
//! A task failure (error or panic) is recorded and the remaining tasks
//! still run. Once every worker has finished, a panic is resumed on the
//! caller; otherwise the lowest-indexed error is returned as `TaskFailed`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::config::LoaderConfig;
use crate::error::{RawError, Result};

// ── Constants ───────────────────────────────────────────────────────

/// Default upper bound on workers, including the calling thread.
pub const DEFAULT_MAX_WORKERS: usize = 12;

/// Shared count of completed tasks.
pub type ProgressCounter = Arc<AtomicU64>;

// ── Tasks ───────────────────────────────────────────────────────────

pub trait SmallTask {
    fn execute(&mut self) -> Result<()>;
}

/// Closure adapter.
pub struct FnTask<F>(pub F);

impl<F> FnTask<F>
where
    F: FnMut() -> Result<()>,
{
    pub fn new(f: F) -> Self {
        FnTask(f)
    }
}

impl<F> SmallTask for FnTask<F>
where
    F: FnMut() -> Result<()>,
{
    fn execute(&mut self) -> Result<()> {
        (self.0)()
    }
}

enum Failure {
    Error(RawError),
    Panic(Box<dyn Any + Send>),
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── CountdownLatch ──────────────────────────────────────────────────

/// Released when `count_down` has been called `count` times.
#[derive(Debug)]
struct CountdownLatch {
    remaining: Mutex<usize>,
    done: Condvar,
}

impl CountdownLatch {
    fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            done: Condvar::new(),
        }
    }

    fn count_down(&self) {
        let mut remaining = lock(&self.remaining);
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.done.notify_all();
        }
    }

    fn wait(&self) {
        let mut remaining = lock(&self.remaining);
        while *remaining > 0 {
            remaining = self.done.wait(remaining).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

// ── ParallelRunner ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ParallelRunner {
    max_workers: usize,
    batch_size_hint: usize,
    single_worker: bool,
    progress: Option<ProgressCounter>,
}

impl Default for ParallelRunner {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            batch_size_hint: 0,
            single_worker: false,
            progress: None,
        }
    }
}

impl ParallelRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new()
            .with_max_workers(config.max_workers)
            .with_batch_size_hint(config.batch_size_hint)
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Aim for at least this many tasks per worker.
    pub fn with_batch_size_hint(mut self, hint: usize) -> Self {
        self.batch_size_hint = hint;
        self
    }

    pub fn single_worker(mut self, single: bool) -> Self {
        self.single_worker = single;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCounter) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn progress(&self) -> Option<&ProgressCounter> {
        self.progress.as_ref()
    }

    /// Workers used for `n` tasks, counting the caller.
    pub fn worker_count(&self, n: usize) -> usize {
        if self.single_worker || n <= 1 {
            return 1;
        }
        let mut workers = self.max_workers.min(n);
        if self.batch_size_hint > 1 {
            workers = workers.min(n.div_ceil(self.batch_size_hint));
        }
        workers.max(1)
    }

    /// Execute every task once.
    pub fn run<T: SmallTask + Send>(&self, tasks: &mut [T]) -> Result<()> {
        let n = tasks.len();
        if n == 0 {
            return Ok(());
        }
        let workers = self.worker_count(n);
        let slots: Vec<Mutex<&mut T>> = tasks.iter_mut().map(Mutex::new).collect();
        let next = AtomicUsize::new(0);
        let failures: Mutex<Vec<(usize, Failure)>> = Mutex::new(Vec::new());

        if workers <= 1 {
            self.drain(&slots, &next, &failures);
        } else {
            let latch = CountdownLatch::new(workers);
            rayon::in_place_scope(|scope| {
                for _ in 1..workers {
                    scope.spawn(|_| {
                        self.drain(&slots, &next, &failures);
                        latch.count_down();
                    });
                }
                self.drain(&slots, &next, &failures);
                latch.count_down();
                // Inside a rayon worker the scope itself joins by stealing
                // work; blocking here could starve a small pool.
                if rayon::current_thread_index().is_none() {
                    latch.wait();
                }
            });
            tracing::debug!(tasks = n, workers, "parallel run finished");
        }

        let mut failures = failures.into_inner().unwrap_or_else(PoisonError::into_inner);
        if failures.is_empty() {
            return Ok(());
        }
        failures.sort_by_key(|(i, _)| *i);
        tracing::warn!(failed = failures.len(), tasks = n, "tasks failed");

        let panic_at = failures.iter().position(|(_, f)| matches!(f, Failure::Panic(_)));
        if let Some(pos) = panic_at {
            if let (_, Failure::Panic(payload)) = failures.swap_remove(pos) {
                panic::resume_unwind(payload);
            }
        }
        match failures.into_iter().next() {
            Some((index, Failure::Error(e))) => Err(RawError::TaskFailed {
                index,
                message: e.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Run `f(i)` for every `i` in `0..n`.
    pub fn run_indexed<F>(&self, n: usize, f: F) -> Result<()>
    where
        F: Fn(usize) -> Result<()> + Sync,
    {
        let f = &f;
        let mut tasks: Vec<_> = (0..n).map(|i| FnTask::new(move || f(i))).collect();
        self.run(&mut tasks)
    }

    fn drain<T: SmallTask>(
        &self,
        slots: &[Mutex<&mut T>],
        next: &AtomicUsize,
        failures: &Mutex<Vec<(usize, Failure)>>,
    ) {
        loop {
            let i = next.fetch_add(1, Ordering::Relaxed);
            if i >= slots.len() {
                break;
            }
            let mut task = lock(&slots[i]);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.execute()));
            drop(task);
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => lock(failures).push((i, Failure::Error(e))),
                Err(payload) => lock(failures).push((i, Failure::Panic(payload))),
            }
            if let Some(progress) = &self.progress {
                progress.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
