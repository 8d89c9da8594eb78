//! Wait Engine
//!
//! The top-level wait and signal procedures tying threads, wait blocks,
//! and synch objects together.
//!
//! A wait runs in three phases:
//!
//! 1. **Preparation** — one wait block per object is linked into the
//!    object queues, unless some object is already ready, in which case
//!    the thread claims itself (`PreWait -> PostWait`) and acquires on
//!    the spot.
//! 2. **Commit** — under the thread lock, `PreWait -> Wait` and park. A
//!    failed transition means a signaler already claimed the thread while
//!    it was preparing, and no sleep happens.
//! 3. **Finish** — every wait block is resolved under its object's lock:
//!    still-active blocks are unlinked, the unique acquired block names
//!    the satisfier, blocks a signaler already reaped need nothing.
//!
//! The signal side is the drain: whoever raises an object's ready count
//! walks the queue head-first, claiming preparing or sleeping waiters by
//! CAS until the readiness or the queue runs out. Wake-ups are issued
//! after the object lock is dropped, taking only the claimed thread's
//! lock, so the lock order is always object lock then thread lock, never
//! both the other way.
//!
//! Deadlines ride the same machinery: a finite deadline appends a hidden
//! callout to the wait set, and the finish phase reports its satisfaction
//! as a timeout.

use alloc::vec::Vec;
use core::ptr;

use bitflags::bitflags;

use crate::callout::{self, KCallout};
use crate::object::{KSynchObject, KWaitBlock, ObjectInner, WaitBlockStatus};
use crate::sched;
use crate::thread::{KThread, SynchStatus, ThreadState, INLINE_WAIT_BLOCKS};

/// Absolute deadline meaning "no timeout"
pub const ABSTIME_FOREVER: u64 = u64::MAX;

/// Absolute deadline meaning "do not block": the wait degenerates to a
/// poll that reports a ready object or would-block
pub const ABSTIME_NEVER: u64 = 0;

/// Upper bound on the number of objects in one wait set
pub const MAXIMUM_WAIT_OBJECTS: usize = 32;

bitflags! {
    /// Wait option word
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitFlags: u8 {
        /// The wait may be cancelled by [`KThread::interrupt`]
        const INTERRUPTIBLE = 1 << 0;
    }
}

/// Outcome of a wait call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The object at this index of the wait set satisfied the wait
    Acquired(usize),
    /// The deadline fired before any object was ready
    TimedOut,
    /// Poll mode and no object was ready
    WouldBlock,
    /// The wait was cancelled by thread teardown
    Interrupted,
}

/// Threads claimed while sleeping, to be unparked once the object lock
/// is dropped
pub(crate) type WakeList = Vec<*const KThread>;

/// Wait for a single object
///
/// Degenerate form of [`ke_wait_multiple`]; see there for the contract.
pub fn ke_wait_single(
    object: &KSynchObject,
    reason: &'static str,
    flags: WaitFlags,
    deadline: u64,
) -> WaitStatus {
    ke_wait_multiple(&[object], reason, flags, deadline)
}

/// Wait until one of `objects` satisfies the wait.
///
/// Exactly one object satisfies a successful wait; the returned index
/// identifies it. Waiters are served strictly FIFO per object, and the
/// first object to offer readiness wins for a multi-object waiter.
///
/// `deadline` is absolute nanoseconds on the scheduler's clock.
/// [`ABSTIME_FOREVER`] waits indefinitely; [`ABSTIME_NEVER`] polls
/// without blocking. `reason` is an opaque debug tag recorded in the
/// thread's wait state.
///
/// # Panics
/// Panics on an empty wait set or one larger than
/// [`MAXIMUM_WAIT_OBJECTS`] (caller bugs), and if no scheduler is
/// registered.
pub fn ke_wait_multiple(
    objects: &[&KSynchObject],
    reason: &'static str,
    flags: WaitFlags,
    deadline: u64,
) -> WaitStatus {
    let n = objects.len();
    assert!(n > 0, "empty wait set");
    assert!(n <= MAXIMUM_WAIT_OBJECTS, "wait set exceeds MAXIMUM_WAIT_OBJECTS");

    let scheduler = sched::scheduler();
    let thread = scheduler.current();

    let interruptible = flags.contains(WaitFlags::INTERRUPTIBLE);
    let poll = deadline == ABSTIME_NEVER;
    let timed = !poll && deadline != ABSTIME_FOREVER;

    // The effective wait set: the caller's objects, then the kill event
    // for interruptible waits, then the hidden timeout callout.
    let kill_index = if interruptible { Some(n) } else { None };
    let callout_index = if timed { Some(n + interruptible as usize) } else { None };
    let total = n + interruptible as usize + timed as usize;

    let timeout_callout = KCallout::new();
    if timed {
        timeout_callout.init();
    }

    let object_at = |i: usize| {
        if i < n {
            objects[i]
        } else if Some(i) == kill_index {
            thread.kill_object()
        } else {
            &timeout_callout.header
        }
    };

    log::trace!(
        "thread {}: waiting on {} object(s) ({})",
        thread.id(),
        n,
        reason
    );

    // Wait blocks live in the thread's inline pool, spilling to the heap
    // for larger sets. The spill must outlive the finish phase.
    let mut spill: Vec<KWaitBlock> = Vec::new();
    let blocks: *mut KWaitBlock = if total <= INLINE_WAIT_BLOCKS {
        thread.wb_inline.get().cast::<KWaitBlock>()
    } else {
        spill.resize(total, KWaitBlock::new());
        spill.as_mut_ptr()
    };
    unsafe {
        for i in 0..total {
            *blocks.add(i) = KWaitBlock::new();
        }
    }

    thread.begin_wait(reason);
    if timed {
        timeout_callout.set(deadline);
    }

    // Phase 1: preparation. Enqueue a block per object, or claim
    // ourselves on the first object already ready.
    let mut early: Option<usize> = None;
    for i in 0..total {
        let object = object_at(i);
        let mut inner = object.state.lock();
        if inner.ready_count > 0 {
            if thread.cas_status(SynchStatus::PreWait, SynchStatus::PostWait) {
                unsafe {
                    let wb = blocks.add(i);
                    (*wb).init(thread, object, i as u8);
                    (*wb).status = WaitBlockStatus::Acquired;
                }
                object.acquire_locked(&mut inner, thread);
                thread.set_satisfier(object);
                early = Some(i);
            }
            // On a failed claim a signaler already satisfied this wait
            // through an earlier block; stop preparing either way.
            break;
        }
        unsafe {
            let wb = blocks.add(i);
            (*wb).init(thread, object, i as u8);
            inner.enqueue(wb);
        }
    }

    // Phase 2: commit. The thread lock serializes this transition against
    // a signaler that claimed us but has not issued the wake-up yet.
    if early.is_none() && !poll {
        let committed = {
            let mut sl = thread.sched.lock();
            if thread.cas_status(SynchStatus::PreWait, SynchStatus::Wait) {
                sl.state = ThreadState::Sleeping;
                true
            } else {
                false
            }
        };
        if committed {
            while thread.status() == SynchStatus::Wait {
                scheduler.park();
            }
            thread.sched.lock().state = ThreadState::Running;
        }
    }

    // Phase 3: finish. Resolve every block under its object's lock; the
    // unique acquired block names the satisfier.
    let mut satisfied = early;
    for i in 0..total {
        unsafe {
            let wb = blocks.add(i);
            if (*wb).object.is_null() {
                // Preparation broke off before reaching this block
                continue;
            }
            let object = &*(*wb).object;
            let _guard = object.state.lock();
            match (*wb).status {
                WaitBlockStatus::Active => {
                    (*wb).entry.remove_entry();
                    (*wb).status = WaitBlockStatus::Inactive;
                }
                WaitBlockStatus::Acquired => {
                    assert!(
                        satisfied.is_none() || satisfied == Some(i),
                        "multiple wait blocks acquired"
                    );
                    debug_assert_eq!((*wb).index as usize, i);
                    satisfied = Some(i);
                }
                WaitBlockStatus::Inactive => {}
            }
        }
    }

    if timed {
        // Synchronize with an in-flight expiry before the hidden callout
        // leaves scope.
        unsafe { callout::timer_queue().cancel(&timeout_callout) };
    }

    if let Some(i) = satisfied {
        debug_assert!(
            ptr::eq(thread.satisfied_by(), object_at(i) as *const KSynchObject),
            "satisfier does not match the acquired block"
        );
    }

    thread.end_wait();

    let status = match satisfied {
        None => {
            assert!(poll, "wait completed without a satisfied object");
            WaitStatus::WouldBlock
        }
        Some(i) if Some(i) == callout_index => WaitStatus::TimedOut,
        Some(i) if Some(i) == kill_index => WaitStatus::Interrupted,
        Some(i) => WaitStatus::Acquired(i),
    };
    log::trace!("thread {}: wait complete: {:?}", thread.id(), status);
    status
}

/// Serve queued waiters from a freshly raised ready count.
///
/// Called with the object lock held by whoever raised `ready_count`.
/// Walks the queue head-first, claiming each waiter by CAS: a preparing
/// thread is satisfied in place, a sleeping thread is additionally pushed
/// onto `wake` for unparking after the lock is dropped, and a thread some
/// other object already claimed has its stale block reaped. Stops when
/// readiness or the queue is exhausted.
pub(crate) fn ki_drain_locked(object: &KSynchObject, inner: &mut ObjectInner, wake: &mut WakeList) {
    while inner.ready_count > 0 {
        let Some(wb) = (unsafe { inner.head_block() }) else {
            break;
        };
        unsafe {
            let thread = &*(*wb).thread;
            if thread.cas_status(SynchStatus::PreWait, SynchStatus::PostWait) {
                (*wb).status = WaitBlockStatus::Acquired;
                object.acquire_locked(inner, (*wb).thread);
                (*wb).entry.remove_entry();
                thread.set_satisfier(object);
                continue;
            }
            if thread.cas_status(SynchStatus::Wait, SynchStatus::PostWait) {
                (*wb).status = WaitBlockStatus::Acquired;
                object.acquire_locked(inner, (*wb).thread);
                (*wb).entry.remove_entry();
                thread.set_satisfier(object);
                wake.push((*wb).thread);
                continue;
            }
            // Another object won this thread's wait; reap the stale block.
            debug_assert_eq!(thread.status(), SynchStatus::PostWait);
            (*wb).status = WaitBlockStatus::Inactive;
            (*wb).entry.remove_entry();
        }
    }
    debug_assert!(
        inner.ready_count == 0 || inner.waitq.is_empty(),
        "ready object left with queued waiters"
    );
}

/// Unpark every thread claimed by a drain.
///
/// Runs after the object lock is dropped so the scheduler is never
/// entered with it held; each wake takes only the target thread's lock.
pub(crate) fn ki_wake_threads(wake: WakeList) {
    if wake.is_empty() {
        return;
    }
    let scheduler = sched::scheduler();
    for &claimed in wake.iter() {
        let thread = unsafe { &*claimed };
        let mut sl = thread.sched.lock();
        sl.state = ThreadState::Ready;
        scheduler.unpark(thread);
        drop(sl);
    }
}
