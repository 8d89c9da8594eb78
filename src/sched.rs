//! Scheduler seam
//!
//! The framework never parks or unparks a thread itself; it calls into
//! the scheduler registered at kernel bring-up. The scheduler also owns
//! the monotonic time source that wait deadlines are measured against.

use spin::Once;

use crate::thread::KThread;

/// Operations the framework requires from the thread scheduler
pub trait Scheduler: Sync {
    /// The thread record of the caller.
    ///
    /// Thread records must live for the rest of the kernel's lifetime:
    /// signalers may still unpark a thread after it has been claimed.
    fn current(&self) -> &'static KThread;

    /// Block the calling thread until unparked.
    ///
    /// May return spuriously; the wait engine re-checks its status and
    /// parks again. An unpark issued before the park must not be lost.
    fn park(&self);

    /// Make a parked (or about-to-park) thread runnable again
    fn unpark(&self, thread: &KThread);

    /// Monotonic time in nanoseconds; never returns 0
    fn now(&self) -> u64;
}

static SCHEDULER: Once<&'static dyn Scheduler> = Once::new();

/// Register the scheduler. Later registrations are ignored.
pub fn register_scheduler(scheduler: &'static dyn Scheduler) {
    SCHEDULER.call_once(|| scheduler);
}

/// The registered scheduler; waiting without one is a bring-up bug.
pub(crate) fn scheduler() -> &'static dyn Scheduler {
    *SCHEDULER.get().expect("no scheduler registered")
}

/// Current monotonic time in nanoseconds
pub fn time_now() -> u64 {
    scheduler().now()
}
