//! One-shot timers for the worker pool reactor
//!
//! The pool keeps a [`TimerHeap`] under a mutex. Workers pop expired
//! entries at the top of every loop iteration and use
//! [`TimerHeap::next_deadline`] to bound how long they park.

mod heap;

pub use heap::{TimerHeap, TimerStats};

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique timer handle for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    #[inline]
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TimerHandle(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw handle value (for logging)
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}
