//! # synca - stackful coroutines on worker pools
//!
//! Straight-line, blocking-looking code runs as a task: a coroutine with
//! its own stack, multiplexed over a small pool of worker threads. A
//! callback-style asynchronous operation is awaited with [`deferred`],
//! which suspends the task and resumes it (possibly on another worker)
//! once the operation's trigger fires.
//!
//! ## Quick Start
//!
//! ```ignore
//! use synca::{deferred, go, Runtime, RuntimeConfig, Trigger};
//!
//! let mut runtime = Runtime::new(RuntimeConfig::from_env().num_threads(2))?;
//! runtime.block_on(|| {
//!     go(|| {
//!         let n: i32 = deferred(|t: Trigger<i32>| {
//!             std::thread::spawn(move || t.fire(41 + 1));
//!         });
//!         assert_eq!(n, 42);
//!     })
//!     .unwrap();
//! });
//! ```
//!
//! ## Architecture
//!
//! ```text
//!        go(body)                       deferred(launch)
//!           |                                 |
//!           v                                 v
//!   +----------------+   resume jobs   +--------------+   fire(v)   +-------------+
//!   |   Scheduler    | <-------------- |   Trigger    | <---------- | any thread  |
//!   | (registry tag) |                 +--------------+             +-------------+
//!   +----------------+
//!           |
//!           v
//!   +----------------+----------------+
//!   |   worker 0     |   worker 1 ... |   ThreadPool: run queue + timer heap
//!   +----------------+----------------+
//!           |
//!           v
//!   Coro: guarded mmap stack, saved registers, start / resume / yield
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

// Re-export core types
pub use synca_core::{
    ContractViolation, CoroId, CoroState, MemoryError, OpState, SyncaError, SyncaResult,
    WorkerError,
};

// Re-export kprint macros for debug logging
pub use synca_core::kprint::{init as init_logging, set_flush_enabled, set_log_level, LogLevel};
pub use synca_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};

// Re-export env utilities
pub use synca_core::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use synca_runtime::config::install as install_config;
pub use synca_runtime::registry::{
    self, attach_scheduler, attach_service, detach_scheduler, detach_service,
};
pub use synca_runtime::{
    current_id, deferred, go, go_on, in_task, is_inside_coro, yield_now, Coro, DefaultTag, Job,
    NetworkTag, PoolHandle, PoolStats, Reactor, RuntimeConfig, Scheduler, Service, Tag, Task,
    ThreadPool, TimerHandle, TimerTag, Trigger,
};

/// Default pool wired into the registry
///
/// `new` starts a pool from the config and attaches it as the
/// `DefaultTag` scheduler and the `DefaultTag` / `TimerTag` service.
/// Shutdown (explicit or on drop) stops the pool and removes those
/// bindings if they still point at it.
pub struct Runtime {
    pool: ThreadPool,
    scheduler: Arc<dyn Scheduler>,
    service: Arc<dyn Service>,
    attached: bool,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> SyncaResult<Self> {
        config.validate()?;
        if config.debug_logging {
            set_log_level(LogLevel::Debug);
        }

        let pool = ThreadPool::from_config(&config)?;
        let scheduler: Arc<dyn Scheduler> = Arc::new(pool.handle());
        let service: Arc<dyn Service> = Arc::new(pool.handle());

        attach_scheduler::<DefaultTag>(scheduler.clone());
        attach_service::<DefaultTag>(service.clone());
        attach_service::<TimerTag>(service.clone());
        kinfo!("runtime up: pool {} with {} threads", pool.name(), pool.threads());

        Ok(Self {
            pool,
            scheduler,
            service,
            attached: true,
        })
    }

    pub fn handle(&self) -> PoolHandle {
        self.pool.handle()
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Spawn on this runtime's pool regardless of the registry
    pub fn spawn<F>(&self, body: F) -> SyncaResult<CoroId>
    where
        F: FnOnce() + Send + 'static,
    {
        go_on(self.scheduler.clone(), body)
    }

    /// Run `f` on the calling thread, wait for the pool to go quiet, shut down
    pub fn block_on<F, T>(&mut self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let result = f();
        if let Err(e) = self.pool.wait() {
            kerror!("runtime wait failed: {}", e);
        }
        self.shutdown();
        result
    }

    /// Block until no job is queued or running and no timer is armed
    pub fn wait(&self) -> SyncaResult<()> {
        self.pool.wait()
    }

    pub fn shutdown(&mut self) {
        self.pool.shutdown();
        if !std::mem::replace(&mut self.attached, false) {
            return;
        }

        if registry::scheduler::<DefaultTag>().is_ok_and(|s| Arc::ptr_eq(&s, &self.scheduler)) {
            detach_scheduler::<DefaultTag>();
        }
        if registry::service::<DefaultTag>().is_ok_and(|s| Arc::ptr_eq(&s, &self.service)) {
            detach_service::<DefaultTag>();
        }
        if registry::service::<TimerTag>().is_ok_and(|s| Arc::ptr_eq(&s, &self.service)) {
            detach_service::<TimerTag>();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Suspend the current task for `duration`
///
/// Inside a task this arms a timer on the `TimerTag` service and frees
/// the worker meanwhile; it fails with `NotAttached` when no timer
/// service is attached. Outside a task it sleeps the OS thread.
pub fn sleep(duration: Duration) -> SyncaResult<()> {
    if !in_task() {
        std::thread::sleep(duration);
        return Ok(());
    }

    let service = registry::service::<TimerTag>()?;
    deferred(|trigger: Trigger<SyncaResult<()>>| {
        // Shared so a failed arm can still fire the trigger
        let slot = Arc::new(Mutex::new(Some(trigger)));
        let on_expiry = slot.clone();
        let armed = service.reactor().post_after(
            duration,
            Box::new(move || {
                if let Some(t) = on_expiry.lock().take() {
                    t.succeed(());
                }
            }),
        );
        if let Err(e) = armed {
            if let Some(t) = slot.lock().take() {
                t.fail(e);
            }
        }
    })
}

/// Sleep for `ms` milliseconds
pub fn sleep_ms(ms: u64) -> SyncaResult<()> {
    sleep(Duration::from_millis(ms))
}
