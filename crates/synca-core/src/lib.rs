//! # synca-core
//!
//! Core types for the synca coroutine runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Stacks, context switching, worker pools and the completion bridge live
//! in `synca-runtime`.
//!
//! ## Modules
//!
//! - `id` - Coroutine identifier type
//! - `state` - Coroutine lifecycle and deferred-operation states
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::CoroId;
pub use state::{CoroState, OpState};
pub use error::{ContractViolation, MemoryError, SyncaError, SyncaResult, WorkerError};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

/// Constants for stack layout
pub mod constants {
    /// Smallest stack a coroutine may be created with
    pub const MIN_STACK_SIZE: usize = 16 * 1024;

    /// Guard page count below each stack
    pub const GUARD_PAGES: usize = 1;

    /// Stack alignment required by both supported ABIs
    pub const STACK_ALIGN: usize = 16;
}
