//! Integration test: small-task runner.
//!
//! Validates that:
//! - A single worker executes every task on the calling thread, in order
//! - Every (workers, batch hint) combination runs each task exactly once,
//!   checked through a shared collector of task ids
//! - Runner settings can come from a loader config

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use rawcore::parallel::{FnTask, DEFAULT_MAX_WORKERS};
use rawcore::{LoaderConfig, ParallelRunner, ProgressCounter, RawError, Result, SmallTask};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records which thread ran it and writes only into itself.
struct SquareTask {
    input: u64,
    output: u64,
    ran_on: Option<ThreadId>,
}

impl SmallTask for SquareTask {
    fn execute(&mut self) -> Result<()> {
        self.output = self.input * self.input;
        self.ran_on = Some(thread::current().id());
        Ok(())
    }
}

/// Pushes its id into a shared collector.
struct IdentityTask<'a> {
    id: usize,
    seen: &'a Mutex<Vec<usize>>,
}

impl SmallTask for IdentityTask<'_> {
    fn execute(&mut self) -> Result<()> {
        self.seen.lock().unwrap().push(self.id);
        Ok(())
    }
}

fn square_tasks(n: usize) -> Vec<SquareTask> {
    (0..n as u64)
        .map(|input| SquareTask {
            input,
            output: 0,
            ran_on: None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn single_worker_stays_on_calling_thread() {
    let caller = thread::current().id();
    let mut tasks = square_tasks(1000);
    ParallelRunner::new().with_max_workers(1).run(&mut tasks).unwrap();
    assert!(tasks.iter().all(|t| t.ran_on == Some(caller)));
    assert!(tasks.iter().all(|t| t.output == t.input * t.input));

    let order = Mutex::new(Vec::new());
    ParallelRunner::new()
        .single_worker(true)
        .run_indexed(50, |i| {
            order.lock().unwrap().push(i);
            Ok(())
        })
        .unwrap();
    assert_eq!(order.into_inner().unwrap(), (0..50).collect::<Vec<_>>());
}

#[test]
fn every_configuration_runs_each_task_once() {
    for workers in [1, 2, DEFAULT_MAX_WORKERS] {
        for hint in [0, 1, 4] {
            let runner = ParallelRunner::new().with_max_workers(workers).with_batch_size_hint(hint);
            let mut tasks = square_tasks(257);
            runner.run(&mut tasks).unwrap();
            assert!(
                tasks.iter().all(|t| t.ran_on.is_some() && t.output == t.input * t.input),
                "workers={} hint={}",
                workers,
                hint
            );
        }
    }
}

#[test]
fn every_configuration_sees_each_identity_exactly_once() {
    const K: usize = 500;
    for workers in [1, 2, DEFAULT_MAX_WORKERS] {
        for hint in [0, 1, 4] {
            let seen = Mutex::new(Vec::with_capacity(K));
            let mut tasks: Vec<IdentityTask<'_>> = (0..K).map(|id| IdentityTask { id, seen: &seen }).collect();
            ParallelRunner::new()
                .with_max_workers(workers)
                .with_batch_size_hint(hint)
                .run(&mut tasks)
                .unwrap();
            drop(tasks);

            let mut ids = seen.into_inner().unwrap();
            assert_eq!(ids.len(), K, "workers={} hint={}", workers, hint);
            ids.sort_unstable();
            assert_eq!(ids, (0..K).collect::<Vec<_>>(), "workers={} hint={}", workers, hint);
        }
    }
}

#[test]
fn closure_tasks_and_progress() {
    let progress: ProgressCounter = Arc::new(AtomicU64::new(0));
    let sum = AtomicUsize::new(0);
    let sum_ref = &sum;
    let mut tasks: Vec<_> = (1..=100)
        .map(|i| {
            FnTask::new(move || {
                sum_ref.fetch_add(i, Ordering::Relaxed);
                Ok(())
            })
        })
        .collect();
    ParallelRunner::new()
        .with_max_workers(4)
        .with_progress(Arc::clone(&progress))
        .run(&mut tasks)
        .unwrap();
    assert_eq!(sum.load(Ordering::Relaxed), 5050);
    assert_eq!(progress.load(Ordering::Relaxed), 100);
}

#[test]
fn failure_surfaces_after_all_tasks_finish() {
    let ran = AtomicUsize::new(0);
    let err = ParallelRunner::new()
        .with_max_workers(3)
        .run_indexed(40, |i| {
            ran.fetch_add(1, Ordering::Relaxed);
            if i == 12 {
                return Err(RawError::DataUnavailable("not yet written".into()));
            }
            Ok(())
        })
        .unwrap_err();
    assert_eq!(ran.load(Ordering::Relaxed), 40);
    assert_eq!(err.code(), "TASK_FAILED");
}

#[test]
fn runner_from_config() {
    let config = LoaderConfig {
        max_workers: 2,
        batch_size_hint: 8,
        ..LoaderConfig::default()
    };
    let runner = ParallelRunner::from_config(&config);
    assert_eq!(runner.worker_count(100), 2);
    assert_eq!(runner.worker_count(9), 2);
    assert_eq!(runner.worker_count(8), 1);
}
