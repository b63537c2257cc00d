//! Coroutine stack memory
//!
//! Each coroutine owns one [`Stack`]: a private anonymous mapping with
//! guard page(s) at the low end. Stacks grow down, so overflowing into
//! the guard faults instead of corrupting a neighbouring allocation.
//!
//! ```text
//!  base                                              top
//!   | guard (PROT_NONE) |   usable stack (RW)   ...   |
//!   ^ low address                         high address ^ initial sp
//! ```
//!
//! Platform-specific implementations handle the mapping itself.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::page_size;
    } else {
        compile_error!("synca stacks are only implemented for unix targets");
    }
}

use synca_core::constants::{GUARD_PAGES, MIN_STACK_SIZE, STACK_ALIGN};
use synca_core::error::{MemoryError, SyncaResult};

/// An owned, guarded coroutine stack
///
/// Dropping the stack unmaps it. The owner must guarantee no frame is
/// live on it at that point.
pub struct Stack {
    /// Start of the mapping (guard page)
    base: *mut u8,
    /// Total mapped length including guard
    mapped: usize,
    /// Guard length at the low end
    guard: usize,
}

// Safety: the mapping is plain memory owned exclusively by this value.
unsafe impl Send for Stack {}

impl Stack {
    /// Map a stack with at least `size` usable bytes
    pub fn new(size: usize) -> SyncaResult<Self> {
        if size < MIN_STACK_SIZE {
            return Err(MemoryError::InvalidSize(size).into());
        }
        let page = page_size();
        let usable = size
            .checked_add(page - 1)
            .map(|n| n & !(page - 1))
            .ok_or(MemoryError::InvalidSize(size))?;
        let guard = GUARD_PAGES * page;
        let mapped = usable
            .checked_add(guard)
            .ok_or(MemoryError::InvalidSize(size))?;

        let base = unix::map_stack(mapped, guard)?;
        Ok(Self { base, mapped, guard })
    }

    /// Highest usable address, aligned for the initial stack pointer
    #[inline]
    pub fn top(&self) -> *mut u8 {
        let top = self.base as usize + self.mapped;
        (top & !(STACK_ALIGN - 1)) as *mut u8
    }

    /// Lowest usable address (just above the guard)
    #[inline]
    pub fn bottom(&self) -> *mut u8 {
        // Safety: guard < mapped, stays inside the mapping.
        unsafe { self.base.add(self.guard) }
    }

    /// Usable bytes (guard excluded)
    #[inline]
    pub fn usable_size(&self) -> usize {
        self.mapped - self.guard
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        if let Err(e) = unix::unmap_stack(self.base, self.mapped) {
            synca_core::kerror!("failed to release stack at {:p}: {}", self.base, e);
        }
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &self.bottom())
            .field("top", &self.top())
            .field("usable", &self.usable_size())
            .finish()
    }
}
