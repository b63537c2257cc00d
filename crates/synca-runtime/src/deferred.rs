//! Deferred-completion bridge
//!
//! Turns a callback-style asynchronous operation into a suspend point:
//!
//! ```ignore
//! let n: usize = deferred(|trigger: Trigger<io::Result<usize>>| {
//!     backend.submit_read(fd, buf, move |ret| trigger.complete_raw(ret));
//! })?;
//! ```
//!
//! # Resume protocol
//!
//! The trigger may fire on any thread, even before the launching
//! coroutine has finished switching out. Resuming a coroutine whose
//! registers are still live on another stack would be fatal, so the
//! resume is posted by whichever of two parties arrives second:
//!
//! ```text
//!   trigger.fire(v)           coroutine suspended (hook on resumer side)
//!        |                              |
//!        +------> arrivals += 1 <-------+
//!                      |
//!               second arrival: schedule(resume job) on the task's scheduler
//! ```
//!
//! # Lifecycle
//!
//! `Launched -> [Suspended ->] CallbackFired -> ResumeScheduled -> Delivered`
//!
//! `Suspended` is skipped when the trigger fires before the switch out.
//!
//! A trigger dropped without firing logs a warning and the task stays
//! suspended forever. Failing to post the resume (scheduler stopped) is
//! a fatal configuration error: it is logged and panics on the firing
//! thread. The rejected resume job held the last reference to the task,
//! so before that panic the task's stack is force-unwound on the firing
//! thread and the body's destructors run there.

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use synca_core::error::{ContractViolation, SyncaError};
use synca_core::{kerror, ktrace, kwarn, CoroId, OpState};

use crate::coro;
use crate::task::Task;

struct Pending<T> {
    id: CoroId,
    outcome: Mutex<Option<T>>,
    state: Mutex<OpState>,
    arrivals: AtomicU8,
    /// Taken by the second arrival; breaks the task <-> pending cycle
    task: Mutex<Option<Arc<Task>>>,
}

impl<T: Send + 'static> Pending<T> {
    fn new(task: Arc<Task>) -> Self {
        Self {
            id: task.id(),
            outcome: Mutex::new(None),
            state: Mutex::new(OpState::Launched),
            arrivals: AtomicU8::new(0),
            task: Mutex::new(Some(task)),
        }
    }

    /// Record one party's arrival; the second one posts the resume
    fn arrive(&self, party: OpState) {
        {
            let mut state = self.state.lock();
            *state = advance(*state, party);
        }
        if self.arrivals.fetch_add(1, Ordering::AcqRel) == 1 {
            self.post_resume();
        }
    }

    fn post_resume(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        *self.state.lock() = OpState::ResumeScheduled;
        let scheduler = task.scheduler().clone();
        ktrace!("resume of task {} posted to {}", self.id, scheduler.name());

        if let Err(e) = scheduler.schedule(task.resume_job()) {
            kerror!(
                "cannot resume task {} on {}: {}; the task is lost",
                self.id,
                scheduler.name(),
                e
            );
            panic!("resume of task {} rejected: {}", self.id, e);
        }
    }

    fn state(&self) -> OpState {
        *self.state.lock()
    }
}

/// State after `party` (`Suspended` or `CallbackFired`) arrives
///
/// A fired trigger always shows `CallbackFired`; a switch-out that comes
/// after the fire leaves it there.
fn advance(state: OpState, party: OpState) -> OpState {
    match (state, party) {
        (_, OpState::CallbackFired) => OpState::CallbackFired,
        (OpState::Launched, party) => party,
        (state, _) => state,
    }
}

/// Single-shot resume trigger handed to an operation launcher
///
/// Firing consumes the trigger, so a second fire does not compile.
pub struct Trigger<T: Send + 'static> {
    pending: Option<Arc<Pending<T>>>,
}

impl<T: Send + 'static> Trigger<T> {
    /// Record `value` and resume the waiting task
    pub fn fire(mut self, value: T) {
        if let Some(pending) = self.pending.take() {
            *pending.outcome.lock() = Some(value);
            pending.arrive(OpState::CallbackFired);
        }
    }

    /// Id of the task waiting on this trigger
    pub fn task_id(&self) -> CoroId {
        self.pending.as_ref().map_or(CoroId::NONE, |p| p.id)
    }

    /// Where the pending operation currently stands
    pub fn state(&self) -> OpState {
        self.pending.as_ref().map_or(OpState::Delivered, |p| p.state())
    }
}

impl<T, E> Trigger<Result<T, E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn succeed(self, value: T) {
        self.fire(Ok(value));
    }

    pub fn fail(self, error: E) {
        self.fire(Err(error));
    }
}

impl<T: Send + 'static> Trigger<io::Result<T>> {
    /// Complete with an OS error code (0 = success carrying `value`)
    pub fn complete_errno(self, code: i32, value: T) {
        if code == 0 {
            self.fire(Ok(value));
        } else {
            self.fire(Err(io::Error::from_raw_os_error(code)));
        }
    }
}

impl Trigger<io::Result<usize>> {
    /// Complete with a raw syscall-style return: negative is `-errno`
    pub fn complete_raw(self, ret: i64) {
        if ret < 0 {
            self.fire(Err(io::Error::from_raw_os_error((-ret) as i32)));
        } else {
            self.fire(Ok(ret as usize));
        }
    }
}

impl<T: Send + 'static> Drop for Trigger<T> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            kwarn!(
                "trigger for task {} dropped without firing, task stays suspended",
                pending.id
            );
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for Trigger<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("task", &self.task_id())
            .field("state", &self.state())
            .finish()
    }
}

/// Launch an operation and suspend the current task until its trigger fires
///
/// `launch` runs immediately on the calling coroutine and must not
/// block. The value passed to the trigger is returned; with a `Result`
/// payload the caller propagates failures with `?`.
///
/// # Panics
///
/// When called outside a spawned task.
pub fn deferred<T, F>(launch: F) -> T
where
    T: Send + 'static,
    F: FnOnce(Trigger<T>),
{
    let Some(task) = coro::current_task() else {
        panic!("{}", SyncaError::from(ContractViolation::DeferredOutsideTask));
    };

    let pending = Arc::new(Pending::new(task));
    launch(Trigger {
        pending: Some(pending.clone()),
    });

    let on_switch = pending.clone();
    if let Err(e) = coro::suspend_with(Box::new(move || on_switch.arrive(OpState::Suspended))) {
        panic!("{}", e);
    }

    *pending.state.lock() = OpState::Delivered;
    let outcome = pending.outcome.lock().take();
    match outcome {
        Some(value) => value,
        None => unreachable!("task {} resumed without an outcome", pending.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Scheduler;
    use crate::pool::ThreadPool;
    use crate::task::go_on;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn pool(threads: usize, name: &str) -> (ThreadPool, Arc<dyn Scheduler>) {
        let pool = ThreadPool::new(threads, name).unwrap();
        let handle: Arc<dyn Scheduler> = Arc::new(pool.handle());
        (pool, handle)
    }

    #[test]
    fn test_fire_inline_resumes_once() {
        let (pool, sched) = pool(1, "inline");
        let (tx, rx) = mpsc::channel();
        go_on(sched, move || {
            let v: u32 = deferred(|t| t.fire(5));
            tx.send(v).unwrap();
        })
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 5);
        pool.wait().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_add_one_from_foreign_thread() {
        let (pool, sched) = pool(2, "addone");
        let (tx, rx) = mpsc::channel();
        go_on(sched, move || {
            let v: i32 = deferred(|trigger: Trigger<i32>| {
                let input = 41;
                thread::spawn(move || {
                    assert!(crate::tls::current_worker().is_none());
                    thread::sleep(Duration::from_millis(10));
                    trigger.fire(input + 1);
                });
            });
            tx.send(v).unwrap();
        })
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        pool.shutdown();
    }

    #[test]
    fn test_failure_delivered_at_await() {
        let (pool, sched) = pool(1, "fail");
        let (tx, rx) = mpsc::channel();
        go_on(sched, move || {
            let result = deferred(|t: Trigger<Result<u32, String>>| t.fail("disconnected".to_string()));
            match result {
                Ok(_) => tx.send("unexpected success".to_string()).unwrap(),
                Err(e) => tx.send(e).unwrap(),
            }
        })
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "disconnected");
        pool.wait().unwrap();
    }

    #[test]
    fn test_independent_pending_operations() {
        let (pool, sched) = pool(2, "indep");
        let (trig_tx, trig_rx) = mpsc::channel::<(u8, Trigger<u8>)>();
        let (out_tx, out_rx) = mpsc::channel();

        for tag in [1u8, 2u8] {
            let trig_tx = trig_tx.clone();
            let out_tx = out_tx.clone();
            go_on(sched.clone(), move || {
                let v = deferred(|t| trig_tx.send((tag, t)).unwrap());
                out_tx.send((tag, v)).unwrap();
            })
            .unwrap();
        }

        let mut triggers: Vec<_> = (0..2)
            .map(|_| trig_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        triggers.sort_by_key(|(tag, _)| *tag);

        // Fire in reverse order of launch
        let (tag2, t2) = triggers.pop().unwrap();
        let (tag1, t1) = triggers.pop().unwrap();
        t2.fire(tag2 * 10);
        assert_eq!(out_rx.recv_timeout(Duration::from_secs(5)).unwrap(), (2, 20));
        assert!(out_rx.try_recv().is_err());
        t1.fire(tag1 * 10);
        assert_eq!(out_rx.recv_timeout(Duration::from_secs(5)).unwrap(), (1, 10));
        pool.wait().unwrap();
    }

    #[test]
    fn test_state_after_suspend() {
        let (pool, sched) = pool(1, "opstate");
        let (trig_tx, trig_rx) = mpsc::channel::<Trigger<()>>();
        let (done_tx, done_rx) = mpsc::channel();
        go_on(sched, move || {
            deferred(|t: Trigger<()>| {
                assert_eq!(t.state(), OpState::Launched);
                trig_tx.send(t).unwrap();
            });
            done_tx.send(()).unwrap();
        })
        .unwrap();

        let trigger = trig_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // The suspend hook runs on the worker right after the switch out
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while trigger.state() != OpState::Suspended && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(trigger.state(), OpState::Suspended);
        assert!(trigger.task_id().is_some());

        trigger.fire(());
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.wait().unwrap();
    }

    #[test]
    fn test_io_completions() {
        let (pool, sched) = pool(1, "io");
        let (tx, rx) = mpsc::channel();
        go_on(sched, move || {
            let read = deferred(|t: Trigger<io::Result<usize>>| t.complete_raw(128));
            let refused = deferred(|t: Trigger<io::Result<usize>>| {
                t.complete_raw(-(libc::ECONNREFUSED as i64))
            });
            let errno = deferred(|t: Trigger<io::Result<()>>| t.complete_errno(libc::EPIPE, ()));
            let ok = deferred(|t: Trigger<io::Result<&'static str>>| t.complete_errno(0, "done"));
            tx.send((
                read.unwrap(),
                refused.unwrap_err().raw_os_error(),
                errno.unwrap_err().raw_os_error(),
                ok.unwrap(),
            ))
            .unwrap();
        })
        .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            (128, Some(libc::ECONNREFUSED), Some(libc::EPIPE), "done")
        );
        pool.wait().unwrap();
    }

    #[test]
    fn test_state_advance() {
        use OpState::*;
        assert_eq!(advance(Launched, Suspended), Suspended);
        assert_eq!(advance(Suspended, CallbackFired), CallbackFired);
        assert_eq!(advance(Launched, CallbackFired), CallbackFired);
        assert_eq!(advance(CallbackFired, Suspended), CallbackFired);
    }

    #[test]
    fn test_fired_before_switch_out_resumes() {
        let (pool, sched) = pool(1, "early");
        let (tx, rx) = mpsc::channel();
        go_on(sched, move || {
            let v: u8 = deferred(|t: Trigger<u8>| {
                t.fire(3);
            });
            tx.send(v).unwrap();
        })
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 3);
        pool.wait().unwrap();
    }

    #[test]
    fn test_dropped_trigger_leaves_task_suspended() {
        let (pool, sched) = pool(1, "unfired");
        let (tx, rx) = mpsc::channel::<u32>();
        go_on(sched, move || {
            let v: u32 = deferred(|t: Trigger<u32>| drop(t));
            tx.send(v).unwrap();
        })
        .unwrap();

        pool.wait().unwrap();
        assert_eq!(pool.stats().executed, 1);
        assert!(matches!(rx.try_recv(), Err(mpsc::TryRecvError::Empty)));
        pool.shutdown();
    }

    #[test]
    fn test_resume_on_stopped_pool_panics_firing_thread() {
        struct Guard(mpsc::Sender<thread::ThreadId>);
        impl Drop for Guard {
            fn drop(&mut self) {
                let _ = self.0.send(thread::current().id());
            }
        }

        let (pool, sched) = pool(1, "gone");
        let (trig_tx, trig_rx) = mpsc::channel::<Trigger<u32>>();
        let (drop_tx, drop_rx) = mpsc::channel();
        go_on(sched, move || {
            let _guard = Guard(drop_tx);
            let _: u32 = deferred(|t: Trigger<u32>| trig_tx.send(t).unwrap());
        })
        .unwrap();

        let trigger = trig_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // Drains the start job, whose suspend hook made the first arrival
        pool.shutdown();
        assert_eq!(trigger.state(), OpState::Suspended);

        let firing = thread::spawn(move || trigger.fire(1));
        let firing_id = firing.thread().id();
        assert!(firing.join().is_err());
        // The task was torn down on the firing thread
        assert_eq!(drop_rx.recv_timeout(Duration::from_secs(5)).unwrap(), firing_id);
    }

    #[test]
    fn test_deferred_outside_task_panics() {
        let result = std::panic::catch_unwind(|| deferred(|t: Trigger<()>| t.fire(())));
        assert!(result.is_err());
    }

    #[test]
    fn test_deferred_in_plain_coro_panics() {
        let mut c = crate::coro::Coro::with_stack_size(64 * 1024);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            c.start(|| {
                let _: () = deferred(|t| t.fire(()));
            })
        }));
        assert!(result.is_err());
        assert!(c.is_completed());
    }
}
