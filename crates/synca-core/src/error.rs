//! Error types for the synca runtime

use core::fmt;

/// Result type for runtime operations
pub type SyncaResult<T> = Result<T, SyncaError>;

/// Errors that can occur in runtime operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncaError {
    /// Programming-contract violation at the call site
    Contract(ContractViolation),

    /// Nothing attached to the requested registry tag
    NotAttached {
        /// "scheduler" or "service"
        kind: &'static str,
        /// Type name of the tag
        tag: &'static str,
    },

    /// Work submitted to a pool that is shutting down or stopped
    PoolStopped(String),

    /// Invalid configuration value
    InvalidConfig(&'static str),

    /// Stack allocation/mapping failed
    MemoryError(MemoryError),

    /// Worker thread error
    WorkerError(WorkerError),
}

impl fmt::Display for SyncaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncaError::Contract(v) => write!(f, "contract violation: {}", v),
            SyncaError::NotAttached { kind, tag } => {
                write!(f, "no {} attached for tag {}", kind, tag)
            }
            SyncaError::PoolStopped(name) => write!(f, "pool '{}' is stopped", name),
            SyncaError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            SyncaError::MemoryError(e) => write!(f, "memory error: {}", e),
            SyncaError::WorkerError(e) => write!(f, "worker error: {}", e),
        }
    }
}

impl std::error::Error for SyncaError {}

/// Misuse of an execution context or pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    /// `start` on a context that is already started
    AlreadyStarted,

    /// `resume` on a context that was never started
    NotStarted,

    /// `resume` on a context that is currently running
    AlreadyRunning,

    /// `resume` on a context whose body already finished
    Completed,

    /// `yield` with no current context on this thread
    YieldOutsideCoro,

    /// deferred operation awaited outside a spawned task
    DeferredOutsideTask,

    /// `wait` called from one of the pool's own workers
    WaitFromWorker,
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractViolation::AlreadyStarted => write!(f, "coroutine already started"),
            ContractViolation::NotStarted => write!(f, "cannot resume: not started"),
            ContractViolation::AlreadyRunning => write!(f, "cannot resume: in running state"),
            ContractViolation::Completed => write!(f, "cannot resume: already completed"),
            ContractViolation::YieldOutsideCoro => write!(f, "yield outside coroutine"),
            ContractViolation::DeferredOutsideTask => {
                write!(f, "deferred operation outside a spawned task")
            }
            ContractViolation::WaitFromWorker => write!(f, "wait() called from a pool worker"),
        }
    }
}

impl From<ContractViolation> for SyncaError {
    fn from(v: ContractViolation) -> Self {
        SyncaError::Contract(v)
    }
}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    AllocationFailed,

    /// mprotect failed
    ProtectionFailed,

    /// munmap failed
    ReleaseFailed,

    /// Requested stack size overflows or is below the minimum
    InvalidSize(usize),
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "stack allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "guard page protection failed"),
            MemoryError::ReleaseFailed => write!(f, "stack release failed"),
            MemoryError::InvalidSize(n) => write!(f, "invalid stack size {}", n),
        }
    }
}

impl From<MemoryError> for SyncaError {
    fn from(e: MemoryError) -> Self {
        SyncaError::MemoryError(e)
    }
}

/// Worker thread related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Failed to spawn worker thread
    SpawnFailed,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed => write!(f, "failed to spawn worker thread"),
        }
    }
}

impl From<WorkerError> for SyncaError {
    fn from(e: WorkerError) -> Self {
        SyncaError::WorkerError(e)
    }
}
