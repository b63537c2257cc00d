//! Coroutine lifecycle and deferred-operation states

use core::fmt;

/// Lifecycle state of an execution context
///
/// ```text
/// Idle --start--> Started --switch in--> Running <--resume-- Suspended
///                                          |   \--yield-------^
///                                          +--return/panic--> Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoroState {
    /// Created, no body attached yet
    Idle = 0,

    /// Body and stack prepared, not yet entered
    Started = 1,

    /// Currently executing on some thread
    Running = 2,

    /// Yielded, waiting for a resume
    Suspended = 3,

    /// Body returned or panicked
    Completed = 4,
}

impl CoroState {
    /// Started and not yet completed (the stack is in flight)
    #[inline]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, CoroState::Started | CoroState::Running | CoroState::Suspended)
    }

    /// Can `resume()` legally be called in this state
    #[inline]
    pub const fn is_resumable(&self) -> bool {
        matches!(self, CoroState::Suspended)
    }

    /// Body finished
    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, CoroState::Completed)
    }
}

impl fmt::Display for CoroState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoroState::Idle => write!(f, "idle"),
            CoroState::Started => write!(f, "started"),
            CoroState::Running => write!(f, "running"),
            CoroState::Suspended => write!(f, "suspended"),
            CoroState::Completed => write!(f, "completed"),
        }
    }
}

/// State of one awaited (deferred) operation
///
/// `Launched -> Suspended -> CallbackFired -> ResumeScheduled -> Delivered`.
/// The trigger may also fire before the coroutine has finished switching
/// out, skipping `Suspended`; the resume is only scheduled once both have
/// happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpState {
    /// Launcher running on the coroutine
    Launched = 0,

    /// Coroutine switched out, operation in flight
    Suspended = 1,

    /// Trigger fired, outcome recorded
    CallbackFired = 2,

    /// Resume posted to the governing scheduler
    ResumeScheduled = 3,

    /// Outcome handed back inside the coroutine
    Delivered = 4,
}

impl fmt::Display for OpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpState::Launched => write!(f, "launched"),
            OpState::Suspended => write!(f, "suspended"),
            OpState::CallbackFired => write!(f, "callback-fired"),
            OpState::ResumeScheduled => write!(f, "resume-scheduled"),
            OpState::Delivered => write!(f, "delivered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(!CoroState::Idle.is_in_flight());
        assert!(CoroState::Started.is_in_flight());
        assert!(CoroState::Running.is_in_flight());
        assert!(CoroState::Suspended.is_in_flight());
        assert!(!CoroState::Completed.is_in_flight());

        assert!(CoroState::Suspended.is_resumable());
        assert!(!CoroState::Running.is_resumable());
        assert!(!CoroState::Completed.is_resumable());

        assert!(CoroState::Completed.is_terminated());
    }
}
