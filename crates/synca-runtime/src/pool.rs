//! Worker pool (reactor executor)
//!
//! A [`ThreadPool`] owns N OS threads draining one shared run queue and
//! one timer heap. [`PoolHandle`] is the cheap clonable view that gets
//! attached to the registry; it implements [`Scheduler`], [`Service`]
//! and [`Reactor`].
//!
//! # Worker loop
//!
//! ```text
//! loop {
//!     move due timers onto the run queue
//!     pop a job -> run it (panics caught and logged) -> continue
//!     lock park:
//!         work arrived meanwhile?      -> continue
//!         stopping and nothing pending -> exit
//!         wait until next timer deadline / park timeout / notify
//! }
//! ```
//!
//! # Pending accounting
//!
//! `pending` counts queued jobs, running jobs and armed timers. It is
//! raised before a submission checks the stop flag, so a worker never
//! exits while a submission is mid-flight. `wait()` blocks until it
//! drops to zero.
//!
//! # Shutdown
//!
//! `shutdown()` sets the stop flag (which doubles as releasing the
//! keep-alive), wakes every worker and joins them. Workers keep draining
//! until nothing is pending. While draining, only the pool's own workers
//! may still submit; anything else gets `PoolStopped`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};

use synca_core::error::{ContractViolation, SyncaError, SyncaResult, WorkerError};
use synca_core::{kdebug, kerror, kinfo, kprint, ktrace};

use crate::backend::{Job, Reactor, Scheduler, Service};
use crate::config::{self, RuntimeConfig};
use crate::coro::panic_message;
use crate::timer::{TimerHandle, TimerHeap};
use crate::tls;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs waiting in the run queue
    pub queued: usize,
    /// Jobs currently executing
    pub running: usize,
    /// Armed timers
    pub timers: usize,
    /// Jobs executed since creation
    pub executed: u64,
}

struct Shared {
    id: u64,
    name: String,
    threads: usize,
    park_timeout: Duration,

    queue: SegQueue<Job>,
    timers: Mutex<TimerHeap>,

    /// Workers sleep here; every notify is issued under the lock
    park: Mutex<()>,
    wakeup: Condvar,

    /// `wait()` callers sleep here
    quiet: Mutex<()>,
    quiescent: Condvar,

    pending: AtomicUsize,
    running: AtomicUsize,
    executed: AtomicU64,
    stopping: AtomicBool,
}

impl Shared {
    #[inline]
    fn on_own_worker(&self) -> bool {
        matches!(tls::current_worker(), Some((id, _)) if id == self.id)
    }

    /// Reserve a pending slot, failing if external submissions are closed
    fn admit(&self) -> SyncaResult<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.stopping.load(Ordering::Acquire) && !self.on_own_worker() {
            self.release();
            return Err(SyncaError::PoolStopped(self.name.clone()));
        }
        Ok(())
    }

    fn release(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            {
                let _guard = self.quiet.lock();
                self.quiescent.notify_all();
            }
            let _guard = self.park.lock();
            self.wakeup.notify_all();
        }
    }

    fn wake_one(&self) {
        let _guard = self.park.lock();
        self.wakeup.notify_one();
    }

    fn push(&self, job: Job) -> SyncaResult<()> {
        self.admit()?;
        self.queue.push(job);
        self.wake_one();
        Ok(())
    }

    fn arm(&self, delay: Duration, job: Job) -> SyncaResult<TimerHandle> {
        self.admit()?;
        let handle = self.timers.lock().insert(Instant::now() + delay, job);
        ktrace!("{} armed {} in {:?}", self.name, handle, delay);
        self.wake_one();
        Ok(handle)
    }

    fn disarm(&self, handle: TimerHandle) -> bool {
        let cancelled = self.timers.lock().cancel(handle);
        if cancelled {
            self.release();
        }
        cancelled
    }

    /// Move due timer jobs onto the run queue. Their pending slot carries over.
    fn fire_timers(&self) {
        let due = self.timers.lock().pop_expired(Instant::now());
        for job in due {
            self.queue.push(job);
        }
    }

    fn run(&self, job: Job) {
        self.running.fetch_add(1, Ordering::Relaxed);
        let result = panic::catch_unwind(AssertUnwindSafe(job));
        self.running.fetch_sub(1, Ordering::Relaxed);
        self.executed.fetch_add(1, Ordering::Relaxed);
        if let Err(payload) = result {
            kerror!("job panicked on pool {}: {}", self.name, panic_message(payload.as_ref()));
        }
        self.release();
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            queued: self.queue.len(),
            running: self.running.load(Ordering::Relaxed),
            timers: self.timers.lock().len(),
            executed: self.executed.load(Ordering::Relaxed),
        }
    }
}

fn worker_main(shared: Arc<Shared>, number: usize) {
    tls::set_worker(shared.id, number);
    kprint::set_thread_tag(&shared.name, number);
    kdebug!("worker started");

    loop {
        shared.fire_timers();

        if let Some(job) = shared.queue.pop() {
            shared.run(job);
            continue;
        }

        let mut guard = shared.park.lock();
        if !shared.queue.is_empty() {
            continue;
        }
        if shared.stopping.load(Ordering::Acquire) && shared.pending.load(Ordering::Acquire) == 0 {
            break;
        }

        let timeout = match shared.timers.lock().next_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(shared.park_timeout),
            None => shared.park_timeout,
        };
        if timeout.is_zero() {
            continue;
        }
        shared.wakeup.wait_for(&mut guard, timeout);
    }

    kdebug!("worker exiting");
    kprint::clear_thread_tag();
    tls::clear_worker();
}

/// Fixed-size pool of worker threads
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Start `threads` workers named `<name>-<n>`
    pub fn new(threads: usize, name: impl Into<String>) -> SyncaResult<Self> {
        Self::build(threads, name.into(), config::global().park_timeout)
    }

    /// Start a pool sized and named by `config`
    pub fn from_config(config: &RuntimeConfig) -> SyncaResult<Self> {
        config.validate()?;
        Self::build(config.num_threads, config.pool_name.clone(), config.park_timeout)
    }

    fn build(threads: usize, name: String, park_timeout: Duration) -> SyncaResult<Self> {
        if threads == 0 {
            return Err(SyncaError::InvalidConfig("pool needs at least one thread"));
        }

        let shared = Arc::new(Shared {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            name,
            threads,
            park_timeout,
            queue: SegQueue::new(),
            timers: Mutex::new(TimerHeap::new()),
            park: Mutex::new(()),
            wakeup: Condvar::new(),
            quiet: Mutex::new(()),
            quiescent: Condvar::new(),
            pending: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            executed: AtomicU64::new(0),
            stopping: AtomicBool::new(false),
        });

        let pool = Self {
            shared: shared.clone(),
            workers: Mutex::new(Vec::with_capacity(threads)),
        };

        for number in 0..threads {
            let worker_shared = shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", shared.name, number))
                .spawn(move || worker_main(worker_shared, number));
            match spawned {
                Ok(handle) => pool.workers.lock().push(handle),
                Err(e) => {
                    kerror!("pool {}: cannot spawn worker {}: {}", shared.name, number, e);
                    pool.shutdown();
                    return Err(WorkerError::SpawnFailed.into());
                }
            }
        }

        kinfo!("pool {} started with {} threads", shared.name, threads);
        Ok(pool)
    }

    /// Clonable handle for the registry and for submitting work
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn threads(&self) -> usize {
        self.shared.threads
    }

    pub fn schedule(&self, job: Job) -> SyncaResult<()> {
        self.shared.push(job)
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }

    /// True on one of this pool's worker threads
    pub fn is_worker_thread(&self) -> bool {
        self.shared.on_own_worker()
    }

    /// Block until no job is queued or running and no timer is armed.
    pub fn wait(&self) -> SyncaResult<()> {
        if self.shared.on_own_worker() {
            return Err(ContractViolation::WaitFromWorker.into());
        }
        let mut guard = self.shared.quiet.lock();
        while self.shared.pending.load(Ordering::Acquire) != 0 {
            self.shared.quiescent.wait(&mut guard);
        }
        Ok(())
    }

    /// Stop accepting external work, drain, and join every worker.
    ///
    /// Idempotent. Called from one of the pool's own workers it only
    /// requests the stop; the join happens on the next call from
    /// outside or on drop.
    pub fn shutdown(&self) {
        if !self.shared.stopping.swap(true, Ordering::AcqRel) {
            kdebug!("pool {} stopping", self.shared.name);
        }
        {
            let _guard = self.shared.park.lock();
            self.shared.wakeup.notify_all();
        }

        if self.shared.on_own_worker() {
            kerror!("pool {} shutdown requested from its own worker, not joining", self.shared.name);
            return;
        }

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                kerror!("pool {}: worker exited by panic", self.shared.name);
            }
        }
        kinfo!(
            "pool {} stopped after {} jobs",
            self.shared.name,
            self.shared.executed.load(Ordering::Relaxed)
        );
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.shared.name)
            .field("threads", &self.shared.threads)
            .field("stats", &self.shared.stats())
            .finish()
    }
}

/// Clonable view of a [`ThreadPool`]
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle").field("name", &self.shared.name).finish()
    }
}

impl Scheduler for PoolHandle {
    fn schedule(&self, job: Job) -> SyncaResult<()> {
        self.shared.push(job)
    }

    fn name(&self) -> &str {
        &self.shared.name
    }
}

impl Reactor for PoolHandle {
    fn post(&self, job: Job) -> SyncaResult<()> {
        self.shared.push(job)
    }

    fn post_after(&self, delay: Duration, job: Job) -> SyncaResult<TimerHandle> {
        self.shared.arm(delay, job)
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        self.shared.disarm(handle)
    }
}

impl Service for PoolHandle {
    fn reactor(&self) -> &dyn Reactor {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(
            ThreadPool::new(0, "none"),
            Err(SyncaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_fifo_on_single_thread() {
        let pool = ThreadPool::new(1, "fifo").unwrap();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for n in 0..100 {
            let log = log.clone();
            pool.schedule(Box::new(move || log.lock().unwrap().push(n))).unwrap();
        }
        pool.wait().unwrap();
        assert_eq!(*log.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrency_bounded_by_threads() {
        let pool = ThreadPool::new(3, "bound").unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..30 {
            let active = active.clone();
            let peak = peak.clone();
            pool.schedule(Box::new(move || {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(2));
                active.fetch_sub(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        pool.wait().unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        assert_eq!(pool.stats().executed, 30);
    }

    #[test]
    fn test_running_tasks_bounded_by_threads() {
        use crate::task::{go_on, yield_now};

        let pool = ThreadPool::new(3, "taskbound").unwrap();
        let sched: Arc<dyn Scheduler> = Arc::new(pool.handle());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        for _ in 0..12 {
            let (active, peak, finished) = (active.clone(), peak.clone(), finished.clone());
            go_on(sched.clone(), move || {
                for _ in 0..3 {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(1));
                    active.fetch_sub(1, Ordering::SeqCst);
                    yield_now().unwrap();
                }
                finished.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.wait().unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_worker_identity_and_names() {
        let pool = ThreadPool::new(2, "named").unwrap();
        let (tx, rx) = mpsc::channel();
        pool.schedule(Box::new(move || {
            let name = thread::current().name().map(str::to_string);
            tx.send((name, tls::current_worker().is_some())).unwrap();
        }))
        .unwrap();
        let (name, is_worker) = rx.recv().unwrap();
        assert!(name.unwrap().starts_with("named-"));
        assert!(is_worker);
        assert!(!pool.is_worker_thread());
    }

    #[test]
    fn test_wait_from_worker_rejected() {
        let pool = Arc::new(ThreadPool::new(1, "selfwait").unwrap());
        let (tx, rx) = mpsc::channel();
        let p = pool.clone();
        pool.schedule(Box::new(move || {
            tx.send(p.wait()).unwrap();
        }))
        .unwrap();
        assert_eq!(
            rx.recv().unwrap(),
            Err(SyncaError::Contract(ContractViolation::WaitFromWorker))
        );
        pool.wait().unwrap();
    }

    #[test]
    fn test_job_panic_does_not_kill_worker() {
        let pool = ThreadPool::new(1, "panicky").unwrap();
        pool.schedule(Box::new(|| panic!("job failure"))).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.schedule(Box::new(move || tx.send(7).unwrap())).unwrap();
        assert_eq!(rx.recv().unwrap(), 7);
        pool.wait().unwrap();
        assert_eq!(pool.stats().executed, 2);
    }

    #[test]
    fn test_shutdown_rejects_external_work() {
        let pool = ThreadPool::new(2, "closed").unwrap();
        let handle = pool.handle();
        pool.shutdown();
        pool.shutdown();
        assert!(pool.is_stopped());
        assert_eq!(
            handle.schedule(Box::new(|| {})),
            Err(SyncaError::PoolStopped("closed".to_string()))
        );
        assert!(handle.post_after(Duration::from_millis(1), Box::new(|| {})).is_err());
    }

    #[test]
    fn test_shutdown_drains_and_accepts_worker_submissions() {
        let pool = ThreadPool::new(1, "drain").unwrap();
        let handle = pool.handle();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let h = handle.clone();
        pool.schedule(Box::new(move || {
            thread::sleep(Duration::from_millis(20));
            let c2 = c.clone();
            // Submitted while the pool is already stopping
            h.schedule(Box::new(move || {
                c2.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        pool.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_timer_fires_after_delay() {
        let pool = ThreadPool::new(1, "timer").unwrap();
        let handle = pool.handle();
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        handle
            .reactor()
            .post_after(Duration::from_millis(30), Box::new(move || tx.send(Instant::now()).unwrap()))
            .unwrap();
        let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(fired.duration_since(start) >= Duration::from_millis(30));
        pool.wait().unwrap();
        assert_eq!(pool.stats().timers, 0);
    }

    #[test]
    fn test_timer_cancel() {
        let pool = ThreadPool::new(1, "cancel").unwrap();
        let handle = pool.handle();
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        let timer = handle
            .post_after(Duration::from_secs(60), Box::new(move || f.store(true, Ordering::SeqCst)))
            .unwrap();
        assert_eq!(pool.stats().timers, 1);
        assert!(handle.cancel(timer));
        assert!(!handle.cancel(timer));
        pool.wait().unwrap();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_wait_covers_timers() {
        let pool = ThreadPool::new(2, "waittimer").unwrap();
        let handle = pool.handle();
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        handle
            .post_after(Duration::from_millis(20), Box::new(move || f.store(true, Ordering::SeqCst)))
            .unwrap();
        pool.wait().unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_from_config() {
        let config = RuntimeConfig::new().num_threads(2).pool_name("cfg");
        let pool = ThreadPool::from_config(&config).unwrap();
        assert_eq!(pool.threads(), 2);
        assert_eq!(pool.name(), "cfg");
    }
}
