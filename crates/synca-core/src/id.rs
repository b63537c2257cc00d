//! Coroutine identifier type

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identifier for a coroutine
///
/// Ids are handed out from a global counter and never reused. Zero is
/// reserved as the "no coroutine" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CoroId(u64);

impl CoroId {
    /// Sentinel value indicating no coroutine
    pub const NONE: CoroId = CoroId(0);

    /// Allocate the next id
    #[inline]
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        CoroId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a CoroId from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        CoroId(id)
    }

    /// Get the raw value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Check if this is a real coroutine id
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<CoroId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<CoroId> for u64 {
    #[inline]
    fn from(id: CoroId) -> Self {
        id.0
    }
}

impl fmt::Debug for CoroId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "CoroId(NONE)")
        } else {
            write!(f, "CoroId({})", self.0)
        }
    }
}

impl fmt::Display for CoroId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "coro-{}", self.0)
        }
    }
}

impl Default for CoroId {
    fn default() -> Self {
        CoroId::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_is_unique_and_nonzero() {
        let a = CoroId::next();
        let b = CoroId::next();
        assert!(a.is_some());
        assert!(b.is_some());
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_none_sentinel() {
        assert!(CoroId::NONE.is_none());
        assert_eq!(CoroId::NONE.to_option(), None);
        assert_eq!(CoroId::default(), CoroId::NONE);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", CoroId::new(7)), "coro-7");
        assert_eq!(format!("{}", CoroId::NONE), "none");
        assert_eq!(format!("{:?}", CoroId::new(7)), "CoroId(7)");
    }
}
