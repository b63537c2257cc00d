//! # synca-runtime
//!
//! Platform-specific runtime for synca.
//!
//! This crate provides:
//! - Stack memory (mmap + guard page)
//! - Context switching (architecture-specific assembly)
//! - `Coro`, the stackful execution context
//! - Worker pool with a run queue and a timer reactor
//! - Scheduler / service registry
//! - Task spawner (`go`) and the deferred-completion bridge

pub mod config;
pub mod memory;
pub mod arch;
pub mod tls;
pub mod coro;
pub mod timer;
pub mod backend;
pub mod pool;
pub mod registry;
pub mod task;
pub mod deferred;

// Re-exports
pub use backend::{Job, Reactor, Scheduler, Service};
pub use config::RuntimeConfig;
pub use coro::{current_id, is_inside_coro, Coro};
pub use deferred::{deferred, Trigger};
pub use pool::{PoolHandle, PoolStats, ThreadPool};
pub use registry::{DefaultTag, NetworkTag, Tag, TimerTag};
pub use task::{go, go_on, in_task, yield_now, Task};
pub use timer::TimerHandle;

// Architecture detection
cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub use arch::x86_64 as current_arch;
    } else if #[cfg(target_arch = "aarch64")] {
        pub use arch::aarch64 as current_arch;
    } else {
        compile_error!("Unsupported architecture");
    }
}
