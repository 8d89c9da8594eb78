//! Kernel Event
//!
//! A latched broadcast event. Setting the event raises its ready count to
//! 1 and satisfies every waiter in the queue; the event stays ready until
//! explicitly reset, so threads arriving after the signal complete their
//! waits immediately. Acquisition does not consume the signal.

use crate::object::{KSynchObject, SynchKind};
use crate::wait::{ki_drain_locked, ki_wake_threads, WakeList};

/// Latched broadcast event
pub struct KEvent {
    /// Shared object header (must be first)
    pub header: KSynchObject,
}

impl KEvent {
    /// Create a new uninitialized event
    pub const fn new() -> Self {
        Self {
            header: KSynchObject::new(SynchKind::Event),
        }
    }

    /// Initialize the event in place
    ///
    /// # Arguments
    /// * `signaled` - true to start in the ready state
    pub fn init(&self, signaled: bool) {
        self.header.init(signaled as u32);
    }

    /// Check whether the event is set
    #[inline]
    pub fn is_set(&self) -> bool {
        self.header.ready_count() > 0
    }

    /// Set the event, satisfying every queued waiter.
    ///
    /// Idempotent while the event is already set. Returns the previous
    /// state.
    pub fn set(&self) -> bool {
        let mut wake = WakeList::new();
        let was_set = {
            let mut inner = self.header.state.lock();
            let was_set = inner.ready_count > 0;
            inner.ready_count = 1;
            ki_drain_locked(&self.header, &mut inner, &mut wake);
            was_set
        };
        ki_wake_threads(wake);
        was_set
    }

    /// Clear the event. Waiters already satisfied are unaffected; future
    /// waits block. Returns the previous state.
    pub fn reset(&self) -> bool {
        let mut inner = self.header.state.lock();
        let was_set = inner.ready_count > 0;
        inner.ready_count = 0;
        was_set
    }

    /// Satisfy every waiter currently queued, then leave the event clear.
    ///
    /// Returns the previous state.
    pub fn pulse(&self) -> bool {
        let mut wake = WakeList::new();
        let was_set = {
            let mut inner = self.header.state.lock();
            let was_set = inner.ready_count > 0;
            inner.ready_count = 1;
            ki_drain_locked(&self.header, &mut inner, &mut wake);
            inner.ready_count = 0;
            was_set
        };
        ki_wake_threads(wake);
        was_set
    }
}

impl Default for KEvent {
    fn default() -> Self {
        Self::new()
    }
}
