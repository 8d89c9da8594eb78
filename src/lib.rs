//! Kernel Synchronization-Object Framework
//!
//! The single mechanism by which kernel threads wait for conditions:
//! release of a mutex, posting of an event, availability of a semaphore
//! unit, or expiration of a callout. A thread may wait on several objects
//! at once; exactly one satisfies the wait and is reported back.
//!
//! Four layers, leaves first:
//!
//! - **Wait block** ([`object::KWaitBlock`]): the per-(thread, object)
//!   record carrying a status tag and queue linkage.
//! - **Synch object** ([`object::KSynchObject`]): ready count, FIFO wait
//!   queue, spinlock, and a kind-specific acquisition side effect.
//!   Variants: [`KEvent`], [`KSemaphore`], [`KMutex`], [`KCallout`].
//! - **Thread wait state** ([`KThread`]): the atomic status word driving
//!   the claim protocol, the thread spinlock, an inline wait-block pool.
//! - **Wait engine** ([`wait`]): [`ke_wait_single`] / [`ke_wait_multiple`]
//!   and the signal-side drain.
//!
//! The scheduler (park/unpark, time) and the timer hardware are not part
//! of the framework; the embedding kernel registers them through
//! [`sched::Scheduler`] and [`callout::TimerQueue`] at bring-up.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod list;
pub mod object;
pub mod thread;
pub mod sched;
pub mod event;
pub mod semaphore;
pub mod mutex;
pub mod callout;
pub mod wait;

#[cfg(test)]
mod testing;

pub use list::ListEntry;
pub use object::{KSynchObject, KWaitBlock, SynchError, SynchKind, WaitBlockStatus};
pub use thread::{KThread, SynchStatus, ThreadState, INLINE_WAIT_BLOCKS};
pub use sched::{register_scheduler, time_now, Scheduler};
pub use event::KEvent;
pub use semaphore::KSemaphore;
pub use mutex::KMutex;
pub use callout::{register_timer_queue, KCallout, TimerQueue};
pub use wait::{
    ke_wait_multiple, ke_wait_single, WaitFlags, WaitStatus, ABSTIME_FOREVER, ABSTIME_NEVER,
    MAXIMUM_WAIT_OBJECTS,
};
