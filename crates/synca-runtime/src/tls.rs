//! Thread-local runtime state
//!
//! Two things live here: the execution context currently running on this
//! OS thread, and which pool worker (if any) this thread is.
//!
//! A coroutine may come back on a different thread after every suspend,
//! so none of this survives a switch. The context pointer is written on
//! entry into a context and restored when control comes back out; the
//! accessors are `inline(never)` so a thread-local address is never
//! cached across a switch inside one caller frame.

use std::cell::Cell;

thread_local! {
    /// Context running on this thread (erased `*mut coro::Inner`)
    static CURRENT_CORO: Cell<*mut u8> = const { Cell::new(std::ptr::null_mut()) };

    /// (pool id, worker number) for pool worker threads
    static WORKER: Cell<Option<(u64, usize)>> = const { Cell::new(None) };
}

/// Install `ctx` as the current context, returning the previous one
#[inline(never)]
pub(crate) fn replace_current_coro(ctx: *mut u8) -> *mut u8 {
    CURRENT_CORO.with(|cell| cell.replace(ctx))
}

/// The context running on this thread, or null
#[inline(never)]
pub(crate) fn current_coro() -> *mut u8 {
    CURRENT_CORO.with(|cell| cell.get())
}

/// Check if we're running inside an execution context
#[inline(never)]
pub fn is_inside_coro() -> bool {
    CURRENT_CORO.with(|cell| !cell.get().is_null())
}

/// Mark this OS thread as worker `number` of pool `pool_id`
pub(crate) fn set_worker(pool_id: u64, number: usize) {
    WORKER.with(|cell| cell.set(Some((pool_id, number))));
}

pub(crate) fn clear_worker() {
    WORKER.with(|cell| cell.set(None));
}

/// `(pool id, worker number)` if this thread is a pool worker
#[inline(never)]
pub fn current_worker() -> Option<(u64, usize)> {
    WORKER.with(|cell| cell.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_coro_replace_restores() {
        assert!(!is_inside_coro());
        let mut marker = 0u8;
        let prev = replace_current_coro(&mut marker as *mut u8);
        assert!(prev.is_null());
        assert!(is_inside_coro());
        assert_eq!(current_coro(), &mut marker as *mut u8);
        replace_current_coro(prev);
        assert!(!is_inside_coro());
    }

    #[test]
    fn test_worker_identity() {
        assert_eq!(current_worker(), None);
        set_worker(3, 1);
        assert_eq!(current_worker(), Some((3, 1)));
        clear_worker();
        assert_eq!(current_worker(), None);
    }
}
