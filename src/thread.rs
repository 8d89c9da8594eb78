//! Per-thread wait state
//!
//! [`KThread`] is the framework's view of a kernel thread: the atomic
//! wait status driving the commit/claim protocol, the thread spinlock
//! serializing sleep against wake-up, an inline pool of wait blocks, and
//! the per-thread kill event backing interruptible-wait cancellation.
//!
//! The wait status is a single atomic word manipulated exclusively by
//! compare-and-swap. The only legal transitions are:
//!
//! - `PreWait -> PostWait` (the thread itself on early satisfaction, or a
//!   signaler claiming a preparing thread)
//! - `PreWait -> Wait` (the thread commits to sleep under its own lock)
//! - `Wait -> PostWait` (a signaler claims a sleeping thread)
//!
//! plus the quiescent reset to `Idle` when no signaler can reference the
//! thread. Anything else is a corrupted state machine.

use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
use spin::Mutex as SpinMutex;

use crate::event::KEvent;
use crate::object::{KSynchObject, KWaitBlock};

/// Number of wait blocks carried inline in each thread
pub const INLINE_WAIT_BLOCKS: usize = 4;

/// Run state of a thread as the framework sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// On a processor
    Running = 0,
    /// Runnable, handed back to the scheduler
    Ready = 1,
    /// Committed to sleep inside a wait
    Sleeping = 2,
}

/// Atomic wait status of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SynchStatus {
    /// Not inside a wait call
    Idle = 0,
    /// Preparing a wait: enqueueing wait blocks, not yet committed
    PreWait = 1,
    /// Committed and sleeping (or about to park)
    Wait = 2,
    /// Satisfied; exactly one object claimed this wait
    PostWait = 3,
}

impl SynchStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SynchStatus::Idle,
            1 => SynchStatus::PreWait,
            2 => SynchStatus::Wait,
            3 => SynchStatus::PostWait,
            _ => panic!("corrupt synch status {}", value),
        }
    }
}

/// State guarded by the thread spinlock
pub(crate) struct SchedState {
    pub(crate) state: ThreadState,
    pub(crate) wait_reason: &'static str,
}

/// Framework-side thread record
///
/// Threads are owned by the scheduler and live for the whole kernel
/// lifetime; signalers reference them only while one of the thread's wait
/// blocks is linked in an object queue, plus a short critical section
/// under the thread lock to issue the wake-up.
pub struct KThread {
    thread_id: u32,
    /// Wait status word; see the module docs for the legal transitions
    pub(crate) synch_status: AtomicU8,
    /// Thread spinlock: serializes the sleep transition against wake-up
    pub(crate) sched: SpinMutex<SchedState>,
    /// Object that satisfied the current wait, recorded by the claimer
    satisfier: AtomicPtr<KSynchObject>,
    /// Inline wait-block pool; waits on more objects spill to the heap
    pub(crate) wb_inline: UnsafeCell<[KWaitBlock; INLINE_WAIT_BLOCKS]>,
    /// Latched per-thread event satisfied by `interrupt`
    kill_event: KEvent,
}

// Safety: the inline wait blocks are mutated only by the owning thread or,
// once linked, under the owning object's lock; everything else is atomic
// or lock-guarded.
unsafe impl Send for KThread {}
unsafe impl Sync for KThread {}

impl KThread {
    /// Create a new thread record
    pub const fn new(thread_id: u32) -> Self {
        Self {
            thread_id,
            synch_status: AtomicU8::new(SynchStatus::Idle as u8),
            sched: SpinMutex::new(SchedState {
                state: ThreadState::Running,
                wait_reason: "",
            }),
            satisfier: AtomicPtr::new(ptr::null_mut()),
            wb_inline: UnsafeCell::new([KWaitBlock::new(); INLINE_WAIT_BLOCKS]),
            kill_event: KEvent::new(),
        }
    }

    /// Initialize the record in place; must run before the first wait
    pub fn init(&self) {
        self.kill_event.init(false);
    }

    /// Thread identifier
    #[inline]
    pub fn id(&self) -> u32 {
        self.thread_id
    }

    /// Run state as last recorded by the framework
    #[inline]
    pub fn run_state(&self) -> ThreadState {
        self.sched.lock().state
    }

    /// Reason string of the current (or last) wait
    #[inline]
    pub fn wait_reason(&self) -> &'static str {
        self.sched.lock().wait_reason
    }

    /// Cancel the thread's interruptible waits, now and in the future.
    ///
    /// Called by the thread-termination path. The kill event is latched:
    /// once interrupted, every later interruptible wait completes
    /// immediately as interrupted.
    pub fn interrupt(&self) {
        log::debug!("thread {}: interrupting waits", self.thread_id);
        self.kill_event.set();
    }

    /// Check whether `interrupt` has been issued
    #[inline]
    pub fn interrupted(&self) -> bool {
        self.kill_event.is_set()
    }

    /// The synch object backing interruptible-wait cancellation
    pub(crate) fn kill_object(&self) -> &KSynchObject {
        &self.kill_event.header
    }

    /// Current wait status
    #[inline]
    pub(crate) fn status(&self) -> SynchStatus {
        SynchStatus::from_u8(self.synch_status.load(Ordering::Acquire))
    }

    /// Attempt one of the legal status transitions
    #[inline]
    pub(crate) fn cas_status(&self, from: SynchStatus, to: SynchStatus) -> bool {
        self.synch_status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter a wait: reset to the preparing state
    pub(crate) fn begin_wait(&self, reason: &'static str) {
        debug_assert_eq!(self.status(), SynchStatus::Idle, "wait re-entered");
        self.satisfier.store(ptr::null_mut(), Ordering::Release);
        self.sched.lock().wait_reason = reason;
        self.synch_status
            .store(SynchStatus::PreWait as u8, Ordering::Release);
    }

    /// Leave a wait: back to quiescence
    pub(crate) fn end_wait(&self) {
        self.synch_status
            .store(SynchStatus::Idle as u8, Ordering::Release);
    }

    /// Record the object that satisfied the current wait
    pub(crate) fn set_satisfier(&self, object: *const KSynchObject) {
        self.satisfier
            .store(object as *mut KSynchObject, Ordering::Release);
    }

    /// Object recorded by the claimer of the current wait
    pub(crate) fn satisfied_by(&self) -> *const KSynchObject {
        self.satisfier.load(Ordering::Acquire)
    }
}
