//! Capability traits attached through the registry.
//!
//! A backend is anything that can accept work. The two capabilities are
//! independent: a `Scheduler` runs jobs, a `Service` exposes a `Reactor`
//! for timers and other event sources. One concrete backend (the worker
//! pool handle) implements both, but collaborators program only against
//! these traits.

use std::time::Duration;

use synca_core::SyncaResult;

use crate::timer::TimerHandle;

/// Unit of work submitted to a backend
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Logical destination that runs jobs on some worker thread.
///
/// **Contract:**
/// - `schedule()` never blocks on the job itself.
/// - Jobs submitted from one thread run in submission order relative to
///   each other when the backend has a single worker.
/// - After shutdown begins, external submissions fail with `PoolStopped`.
pub trait Scheduler: Send + Sync {
    /// Enqueue `job` for execution.
    fn schedule(&self, job: Job) -> SyncaResult<()>;

    /// Diagnostic name used in log lines.
    fn name(&self) -> &str;
}

/// Event multiplexer: immediate posts and one-shot timers.
pub trait Reactor: Send + Sync {
    /// Run `job` as soon as possible.
    fn post(&self, job: Job) -> SyncaResult<()>;

    /// Run `job` once `delay` has elapsed.
    fn post_after(&self, delay: Duration, job: Job) -> SyncaResult<TimerHandle>;

    /// Disarm a timer. Returns `false` if it already fired or was cancelled.
    fn cancel(&self, handle: TimerHandle) -> bool;
}

/// Logical destination exposing a reactor.
pub trait Service: Send + Sync {
    fn reactor(&self) -> &dyn Reactor;
}
