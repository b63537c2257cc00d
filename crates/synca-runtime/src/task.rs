//! Task spawner
//!
//! A task is a [`Coro`] bound to the scheduler that governs it. `go`
//! submits a job that starts the coroutine; every later resume is
//! another job on the same scheduler, so a task may run on a different
//! worker after each suspension.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use synca_core::{kerror, ktrace, CoroId, SyncaResult};

use crate::backend::{Job, Scheduler};
use crate::coro::{self, panic_message, Coro};
use crate::deferred::{deferred, Trigger};
use crate::registry::{self, DefaultTag};

/// A spawned coroutine and its governing scheduler
pub struct Task {
    id: CoroId,
    coro: Mutex<Coro>,
    scheduler: Arc<dyn Scheduler>,
}

impl Task {
    #[inline]
    pub fn id(&self) -> CoroId {
        self.id
    }

    #[inline]
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Job that resumes this task once
    pub(crate) fn resume_job(self: Arc<Self>) -> Job {
        Box::new(move || {
            let mut coro = self.coro.lock();
            self.report(panic::catch_unwind(AssertUnwindSafe(|| coro.resume())));
        })
    }

    fn report(&self, outcome: std::thread::Result<SyncaResult<()>>) {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => kerror!("task {}: {}", self.id, e),
            Err(payload) => {
                kerror!("task {} panicked: {}", self.id, panic_message(payload.as_ref()))
            }
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("scheduler", &self.scheduler.name())
            .finish()
    }
}

/// Spawn `body` on the scheduler attached under `DefaultTag`
pub fn go<F>(body: F) -> SyncaResult<CoroId>
where
    F: FnOnce() + Send + 'static,
{
    go_on(registry::scheduler::<DefaultTag>()?, body)
}

/// Spawn `body` on `scheduler`
///
/// Returns as soon as the start job is queued. A panic escaping `body`
/// is logged; nothing propagates back to the spawner.
pub fn go_on<F>(scheduler: Arc<dyn Scheduler>, body: F) -> SyncaResult<CoroId>
where
    F: FnOnce() + Send + 'static,
{
    let mut coro = Coro::new();
    let id = coro.id();
    let task = Arc::new_cyclic(|weak| {
        coro.set_task(weak.clone());
        Task {
            id,
            coro: Mutex::new(coro),
            scheduler: scheduler.clone(),
        }
    });

    scheduler.schedule(Box::new(move || {
        let mut coro = task.coro.lock();
        task.report(panic::catch_unwind(AssertUnwindSafe(|| coro.start(body))));
    }))?;

    ktrace!("task {} spawned on {}", id, scheduler.name());
    Ok(id)
}

/// Check if the calling code runs inside a spawned task
pub fn in_task() -> bool {
    coro::current_task().is_some()
}

/// Hand the worker back to other work
///
/// Inside a task the task is re-queued at the tail of its scheduler.
/// Inside a plain [`Coro`] this is [`coro::yield_now`].
pub fn yield_now() -> SyncaResult<()> {
    if in_task() {
        deferred(|trigger: Trigger<()>| trigger.fire(()));
        Ok(())
    } else {
        coro::yield_now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ThreadPool;
    use std::sync::mpsc;
    use std::time::Duration;
    use synca_core::error::{ContractViolation, SyncaError};

    fn pool(threads: usize, name: &str) -> (ThreadPool, Arc<dyn Scheduler>) {
        let pool = ThreadPool::new(threads, name).unwrap();
        let handle: Arc<dyn Scheduler> = Arc::new(pool.handle());
        (pool, handle)
    }

    #[test]
    fn test_go_runs_without_suspending() {
        let (pool, sched) = pool(1, "roundtrip");
        let (tx, rx) = mpsc::channel();
        let id = go_on(sched, move || tx.send(42).unwrap()).unwrap();
        assert!(id.is_some());
        pool.wait().unwrap();
        assert_eq!(rx.try_recv().unwrap(), 42);
    }

    #[test]
    fn test_task_runs_inside_coro_on_worker() {
        let (pool, sched) = pool(1, "inside");
        let (tx, rx) = mpsc::channel();
        let id = go_on(sched, move || {
            tx.send((coro::is_inside_coro(), coro::current_id())).unwrap();
        })
        .unwrap();
        let (inside, seen) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(inside);
        assert_eq!(seen, id);
        pool.wait().unwrap();
    }

    #[test]
    fn test_panic_in_task_is_contained() {
        let (pool, sched) = pool(1, "contained");
        go_on(sched.clone(), || panic!("task failure")).unwrap();
        let (tx, rx) = mpsc::channel();
        go_on(sched, move || tx.send("alive").unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "alive");
        pool.wait().unwrap();
    }

    #[test]
    fn test_yield_requeues_at_tail() {
        let (pool, sched) = pool(1, "yield");
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let l = log.clone();
        go_on(sched.clone(), move || {
            l.lock().unwrap().push("a1");
            yield_now().unwrap();
            l.lock().unwrap().push("a2");
        })
        .unwrap();
        let l = log.clone();
        go_on(sched, move || {
            l.lock().unwrap().push("b1");
            yield_now().unwrap();
            l.lock().unwrap().push("b2");
        })
        .unwrap();

        pool.wait().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn test_go_on_stopped_pool() {
        let (pool, sched) = pool(1, "stopped");
        pool.shutdown();
        assert_eq!(
            go_on(sched, || {}),
            Err(SyncaError::PoolStopped("stopped".to_string()))
        );
    }

    #[test]
    fn test_yield_outside_task_and_coro() {
        assert_eq!(
            yield_now(),
            Err(SyncaError::Contract(ContractViolation::YieldOutsideCoro))
        );
    }
}
