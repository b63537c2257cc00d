//! Architecture-specific context switching
//!
//! This is the only module containing assembly. Each architecture provides:
//!
//! - `Registers` - callee-saved register file, `repr(C)` for the asm offsets
//! - `init_context` - prepare registers so the first switch enters `entry(arg)`
//! - `switch_context` - save the current registers into `old`, load `new`
//!
//! Everything above this module sees the same three items through
//! `crate::current_arch`.

/// Function a fresh context starts in. Must never return.
pub type EntryFn = extern "C" fn(usize) -> !;

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;
