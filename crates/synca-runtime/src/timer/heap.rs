//! BinaryHeap-based timer storage
//!
//! # Complexity
//!
//! - Insert: O(log n)
//! - Cancel: O(1) (lazy)
//! - Pop expired: O(k log n) where k = number of expired entries
//!
//! # Cancellation Strategy
//!
//! Live handles are tracked in a HashSet. Cancelling removes the handle
//! from the set and leaves the entry in the heap; it is discarded when
//! it reaches the top.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

use super::TimerHandle;
use crate::backend::Job;

struct Entry {
    deadline: Instant,
    handle: TimerHandle,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.handle == other.handle
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; ties go to the older handle
        match other.deadline.cmp(&self.deadline) {
            Ordering::Equal => other.handle.raw().cmp(&self.handle.raw()),
            ord => ord,
        }
    }
}

/// Snapshot of timer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    pub armed: usize,
    pub total_inserted: u64,
    pub total_fired: u64,
    pub total_cancelled: u64,
}

/// Min-heap of one-shot timers. Not synchronized; the pool wraps it.
#[derive(Default)]
pub struct TimerHeap {
    heap: BinaryHeap<Entry>,
    armed: HashSet<TimerHandle>,
    total_inserted: u64,
    total_fired: u64,
    total_cancelled: u64,
}

impl TimerHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, deadline: Instant, job: Job) -> TimerHandle {
        let handle = TimerHandle::next();
        self.heap.push(Entry { deadline, handle, job });
        self.armed.insert(handle);
        self.total_inserted += 1;
        handle
    }

    /// Disarm `handle`. Returns `false` if it is not armed.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let removed = self.armed.remove(&handle);
        if removed {
            self.total_cancelled += 1;
        }
        removed
    }

    /// Remove and return the jobs of every armed timer due at `now`
    pub fn pop_expired(&mut self, now: Instant) -> Vec<Job> {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let Some(entry) = self.heap.pop() else { break };
            if self.armed.remove(&entry.handle) {
                self.total_fired += 1;
                due.push(entry.job);
            }
        }
        due
    }

    /// Earliest deadline among armed timers
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(top) = self.heap.peek() {
            if self.armed.contains(&top.handle) {
                return Some(top.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Number of armed timers
    #[inline]
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn stats(&self) -> TimerStats {
        TimerStats {
            armed: self.armed.len(),
            total_inserted: self.total_inserted,
            total_fired: self.total_fired,
            total_cancelled: self.total_cancelled,
        }
    }
}
