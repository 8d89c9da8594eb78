//! Kernel Callout
//!
//! A timer modeled as a synchronization object. Arming a callout hands it
//! to the timer subsystem; at the deadline the subsystem invokes
//! [`KCallout::expire`], which behaves like an external signaler. A fired
//! callout is latched (ready until reset), so it reads like an event that
//! set itself.
//!
//! The wait engine uses a hidden callout to implement wait deadlines:
//! because a timeout is just another object in the wait set, cancelling a
//! timed wait that was satisfied early costs nothing beyond unlinking one
//! more wait block.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use spin::Once;

use crate::object::{KSynchObject, SynchKind};
use crate::wait::{ki_drain_locked, ki_wake_threads, WakeList};

/// Operations the framework requires from the timer subsystem
pub trait TimerQueue: Sync {
    /// Schedule `callout` to expire at the absolute `deadline`
    /// (nanoseconds on the scheduler's clock).
    ///
    /// # Safety
    /// The callout must stay valid until it expires or is cancelled.
    unsafe fn arm(&self, callout: *const KCallout, deadline: u64);

    /// Remove `callout` from the queue.
    ///
    /// Must be synchronous: when this returns, no expiry for the callout
    /// is running or will run, so the caller may free it.
    ///
    /// # Safety
    /// `callout` must have been passed to `arm` (a callout that already
    /// expired or was never armed is a no-op).
    unsafe fn cancel(&self, callout: *const KCallout);
}

static TIMER_QUEUE: Once<&'static dyn TimerQueue> = Once::new();

/// Register the timer subsystem. Later registrations are ignored.
pub fn register_timer_queue(queue: &'static dyn TimerQueue) {
    TIMER_QUEUE.call_once(|| queue);
}

/// The registered timer queue; arming without one is a bring-up bug.
pub(crate) fn timer_queue() -> &'static dyn TimerQueue {
    *TIMER_QUEUE.get().expect("no timer queue registered")
}

/// Timer object
pub struct KCallout {
    /// Shared object header (must be first)
    pub header: KSynchObject,
    /// Whether the callout is currently armed
    armed: AtomicBool,
    /// Absolute expiration time in nanoseconds
    due_time: AtomicU64,
}

impl KCallout {
    /// Create a new uninitialized callout
    pub const fn new() -> Self {
        Self {
            header: KSynchObject::new(SynchKind::Callout),
            armed: AtomicBool::new(false),
            due_time: AtomicU64::new(0),
        }
    }

    /// Initialize the callout in place, disarmed and unfired
    pub fn init(&self) {
        self.header.init(0);
        self.armed.store(false, Ordering::Release);
        self.due_time.store(0, Ordering::Relaxed);
    }

    /// Arm the callout to fire at the absolute `deadline`.
    ///
    /// A previously armed deadline is cancelled first. A callout that
    /// already fired stays ready regardless; re-arming a fresh cycle
    /// requires `reset`.
    pub fn set(&self, deadline: u64) {
        // Synchronize with any pending expiry before re-arming
        unsafe { timer_queue().cancel(self) };
        self.due_time.store(deadline, Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
        unsafe { timer_queue().arm(self, deadline) };
    }

    /// Disarm the callout and clear the fired state. Waiters already
    /// satisfied are unaffected; future waits block until the next fire.
    pub fn reset(&self) {
        unsafe { timer_queue().cancel(self) };
        self.armed.store(false, Ordering::Release);
        self.header.state.lock().ready_count = 0;
    }

    /// Check whether the callout fired and has not been reset
    #[inline]
    pub fn is_fired(&self) -> bool {
        self.header.ready_count() > 0
    }

    /// Check whether the callout is armed
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Armed expiration time in nanoseconds
    #[inline]
    pub fn due_time(&self) -> u64 {
        self.due_time.load(Ordering::Relaxed)
    }

    /// Fire the callout. Invoked by the timer subsystem at the deadline;
    /// acts as a signaler latching the object ready.
    pub fn expire(&self) {
        if !self.armed.swap(false, Ordering::AcqRel) {
            return;
        }
        log::trace!("callout expired at t={}", self.due_time.load(Ordering::Relaxed));
        let mut wake = WakeList::new();
        {
            let mut inner = self.header.state.lock();
            inner.ready_count = 1;
            ki_drain_locked(&self.header, &mut inner, &mut wake);
        }
        ki_wake_threads(wake);
    }
}

impl Default for KCallout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::time_now;
    use crate::testing;
    use crate::wait::{ke_wait_single, WaitFlags, WaitStatus, ABSTIME_FOREVER};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fired_callout_latches() {
        testing::init();
        let callout = testing::leak(KCallout::new());
        callout.init();

        callout.set(time_now() + 20_000_000);
        let status = ke_wait_single(&callout.header, "tick", WaitFlags::empty(), ABSTIME_FOREVER);
        assert_eq!(status, WaitStatus::Acquired(0));
        assert!(callout.is_fired());
        assert!(!callout.is_armed());

        // Latched: a second wait completes immediately
        let status = ke_wait_single(&callout.header, "tick", WaitFlags::empty(), ABSTIME_FOREVER);
        assert_eq!(status, WaitStatus::Acquired(0));

        callout.reset();
        assert!(!callout.is_fired());
    }

    #[test]
    fn test_reset_disarms() {
        testing::init();
        let callout = testing::leak(KCallout::new());
        callout.init();

        callout.set(time_now() + 40_000_000);
        assert!(callout.is_armed());
        callout.reset();
        assert!(!callout.is_armed());

        thread::sleep(Duration::from_millis(100));
        assert!(!callout.is_fired());
    }
}
