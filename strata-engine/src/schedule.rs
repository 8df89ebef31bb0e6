//! Delayed-task executor collaborator.
//!
//! The engine never owns task lifecycle: it submits units of work with a
//! delay to an injected [`TaskExecutor`]. Production uses [`TokioExecutor`];
//! tests use [`ManualExecutor`], which holds submitted tasks until told to
//! run them, making reconciliation timing fully deterministic.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use strata_core::limits;

use crate::error::{EngineError, EngineResult};

/// A unit of background work.
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Fire-and-forget delayed task submission.
pub trait TaskExecutor: Send + Sync {
    /// Submits a task to run after `delay`.
    fn schedule(&self, delay: Duration, task: BoxedTask);

    /// Submits a task to run as soon as possible.
    fn schedule_immediate(&self, task: BoxedTask) {
        self.schedule(Duration::ZERO, task);
    }

    /// Number of submitted tasks that have not finished.
    fn pending_tasks(&self) -> usize;
}

// -----------------------------------------------------------------------------
// TokioExecutor
// -----------------------------------------------------------------------------

/// Spawns each task onto the tokio runtime after sleeping its delay.
#[derive(Debug, Default)]
pub struct TokioExecutor {
    pending: Arc<AtomicUsize>,
}

impl TokioExecutor {
    /// Creates an executor. Must be used from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskExecutor for TokioExecutor {
    fn schedule(&self, delay: Duration, task: BoxedTask) {
        let pending = self.pending.clone();
        pending.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
            pending.fetch_sub(1, Ordering::SeqCst);
        });
    }

    fn pending_tasks(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

// -----------------------------------------------------------------------------
// ManualExecutor
// -----------------------------------------------------------------------------

/// Holds submitted tasks until [`ManualExecutor::run_pending`] is called.
///
/// Delays are ignored: tests control object ages through a manual clock,
/// and reconciliation is idempotent, so running a task "early" degrades to
/// a no-op rather than a wrong action.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<BoxedTask>>,
}

impl ManualExecutor {
    /// Creates an empty executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every queued task to completion, including tasks queued while
    /// running. Returns the number of tasks run.
    ///
    /// # Panics
    ///
    /// Panics if the queue mutex is poisoned.
    pub async fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = {
                let mut queue = self.queue.lock().expect("task queue poisoned");
                queue.pop_front()
            };
            let Some(task) = task else { break };
            task.await;
            ran += 1;
        }
        ran
    }
}

impl TaskExecutor for ManualExecutor {
    fn schedule(&self, _delay: Duration, task: BoxedTask) {
        self.queue.lock().expect("task queue poisoned").push_back(task);
    }

    fn pending_tasks(&self) -> usize {
        self.queue.lock().expect("task queue poisoned").len()
    }
}

// -----------------------------------------------------------------------------
// Drain
// -----------------------------------------------------------------------------

/// Waits until the executor reports no pending tasks.
///
/// Used before destructive namespace operations. On timeout the caller is
/// expected to log and proceed best-effort rather than fail.
///
/// # Errors
///
/// Returns `Timeout` if pending work remains after `timeout`.
pub async fn drain_pending(executor: &dyn TaskExecutor, timeout: Duration) -> EngineResult<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    while executor.pending_tasks() > 0 {
        if tokio::time::Instant::now() >= deadline {
            return Err(EngineError::Timeout {
                operation: "drain pending reconciliation",
                waited_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(Duration::from_millis(limits::DRAIN_POLL_INTERVAL_MS)).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    #[tokio::test]
    async fn test_manual_executor_holds_until_run() {
        let executor = ManualExecutor::new();
        let hits = Arc::new(AtomicU32::new(0));

        let h = hits.clone();
        executor.schedule(
            Duration::from_secs(3600),
            Box::pin(async move {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(executor.pending_tasks(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert_eq!(executor.run_pending().await, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(executor.pending_tasks(), 0);
    }

    #[tokio::test]
    async fn test_manual_executor_runs_tasks_queued_while_running() {
        let executor = Arc::new(ManualExecutor::new());
        let hits = Arc::new(AtomicU32::new(0));

        let exec = executor.clone();
        let h = hits.clone();
        executor.schedule_immediate(Box::pin(async move {
            let h2 = h.clone();
            exec.schedule_immediate(Box::pin(async move {
                h2.fetch_add(1, Ordering::SeqCst);
            }));
            h.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(executor.run_pending().await, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tokio_executor_tracks_pending() {
        let executor = TokioExecutor::new();
        let hits = Arc::new(AtomicU32::new(0));

        let h = hits.clone();
        executor.schedule_immediate(Box::pin(async move {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        drain_pending(&executor, Duration::from_secs(5)).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drain_times_out_on_stuck_work() {
        let executor = ManualExecutor::new();
        executor.schedule_immediate(Box::pin(async {}));

        let result = drain_pending(&executor, Duration::from_millis(30)).await;
        assert!(matches!(result, Err(EngineError::Timeout { .. })));
    }
}
