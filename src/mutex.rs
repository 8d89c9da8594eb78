//! Kernel Mutex
//!
//! An ownership mutex. Acquisition happens through the wait calls and
//! records the acquiring thread as owner; release makes the mutex ready
//! again and the drain hands ownership straight to the head waiter, so at
//! most one thread is satisfied per release.
//!
//! Recursive acquisition is not supported and not detected: a thread
//! re-waiting on a mutex it owns deadlocks.

use core::ptr;

use crate::object::{KSynchObject, SynchError, SynchKind};
use crate::sched;
use crate::thread::KThread;
use crate::wait::{ki_drain_locked, ki_wake_threads, WakeList};

/// Ownership mutex
pub struct KMutex {
    /// Shared object header (must be first)
    pub header: KSynchObject,
}

impl KMutex {
    /// Create a new uninitialized mutex
    pub const fn new() -> Self {
        Self {
            header: KSynchObject::new(SynchKind::Mutex),
        }
    }

    /// Initialize the mutex in place, available
    pub fn init(&self) {
        self.header.init(1);
    }

    /// Check whether any thread owns the mutex
    #[inline]
    pub fn is_owned(&self) -> bool {
        !self.header.state.lock().owner.is_null()
    }

    /// Check whether `thread` owns the mutex
    #[inline]
    pub fn owned_by(&self, thread: &KThread) -> bool {
        ptr::eq(self.header.state.lock().owner, thread)
    }

    /// Release the mutex.
    ///
    /// The caller must be the owner; otherwise fails with
    /// [`SynchError::NotOwner`] and nothing changes. If threads are
    /// queued, ownership passes directly to the head waiter.
    pub fn release(&self) -> Result<(), SynchError> {
        let current = sched::scheduler().current();
        let mut wake = WakeList::new();
        {
            let mut inner = self.header.state.lock();
            if !ptr::eq(inner.owner, current as *const KThread) {
                return Err(SynchError::NotOwner);
            }
            debug_assert_eq!(inner.ready_count, 0, "owned mutex with nonzero ready count");
            inner.owner = ptr::null();
            inner.ready_count = 1;
            ki_drain_locked(&self.header, &mut inner, &mut wake);
        }
        ki_wake_threads(wake);
        Ok(())
    }
}

impl Default for KMutex {
    fn default() -> Self {
        Self::new()
    }
}
