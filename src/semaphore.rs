//! Kernel Semaphore
//!
//! A counted semaphore. The ready count *is* the semaphore count: each
//! post adds to it, each acquisition consumes one unit. A post of `n`
//! satisfies exactly `n` additional waiters.

use crate::object::{KSynchObject, SynchError, SynchKind};
use crate::wait::{ki_drain_locked, ki_wake_threads, WakeList};

/// Counted semaphore
pub struct KSemaphore {
    /// Shared object header (must be first); its ready count is the semaphore count
    pub header: KSynchObject,
}

impl KSemaphore {
    /// Create a new uninitialized semaphore
    pub const fn new() -> Self {
        Self {
            header: KSynchObject::new(SynchKind::Semaphore),
        }
    }

    /// Initialize with `count` available units and no particular bound
    pub fn init(&self, count: u32) {
        self.header.init(count);
    }

    /// Initialize with `count` available units and an explicit upper bound
    ///
    /// # Panics
    /// Panics if `limit` is zero or `count` exceeds it.
    pub fn init_bounded(&self, count: u32, limit: u32) {
        assert!(limit > 0, "semaphore limit must be positive");
        assert!(count <= limit, "initial count exceeds the limit");
        self.header.init(count);
        self.header.state.lock().limit = limit;
    }

    /// Current count
    #[inline]
    pub fn count(&self) -> u32 {
        self.header.ready_count()
    }

    /// Upper bound on the count
    #[inline]
    pub fn limit(&self) -> u32 {
        self.header.state.lock().limit
    }

    /// Add `n` units, satisfying up to `n` queued waiters.
    ///
    /// Returns the count before the post. Fails with
    /// [`SynchError::Overflow`] if the post would push the count past the
    /// limit, in which case nothing changes.
    ///
    /// # Panics
    /// Panics if `n` is zero.
    pub fn post(&self, n: u32) -> Result<u32, SynchError> {
        assert!(n > 0, "post count must be positive");
        let mut wake = WakeList::new();
        let previous = {
            let mut inner = self.header.state.lock();
            let new_count = match inner.ready_count.checked_add(n) {
                Some(v) if v <= inner.limit => v,
                _ => return Err(SynchError::Overflow),
            };
            let previous = inner.ready_count;
            inner.ready_count = new_count;
            ki_drain_locked(&self.header, &mut inner, &mut wake);
            previous
        };
        ki_wake_threads(wake);
        Ok(previous)
    }
}

impl Default for KSemaphore {
    fn default() -> Self {
        Self::new()
    }
}
