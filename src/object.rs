//! Synchronization Object Header
//!
//! Every waitable object (event, semaphore, mutex, callout) embeds a
//! [`KSynchObject`] as its first field, which lets the wait engine treat
//! the four kinds uniformly. The header carries:
//!
//! - the object kind
//! - the ready count (0 = not ready)
//! - a FIFO queue of wait blocks
//! - the spinlock guarding both, plus the kind-specific state
//!
//! The only behavioral variation between kinds is the acquisition side
//! effect, dispatched by a match on the kind in [`KSynchObject::acquire_locked`].

use core::ptr;
use spin::Mutex as SpinMutex;

use crate::containing_record;
use crate::list::ListEntry;
use crate::thread::KThread;

/// Kind of a synchronization object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SynchKind {
    /// Latched broadcast event: set wakes every waiter, stays ready until reset
    Event = 0,
    /// Counted semaphore: each acquisition consumes one unit
    Semaphore = 1,
    /// Ownership mutex: acquisition transfers ownership, release hands off
    Mutex = 2,
    /// Timer modeled as a synch object: ready once the deadline fires
    Callout = 3,
}

/// Recoverable caller errors reported by object operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchError {
    /// A mutex release was attempted by a thread that does not own it
    NotOwner,
    /// A semaphore post would push the count past its limit
    Overflow,
}

/// Resolution state of a wait block
///
/// Written only under the owning object's lock once the block is linked;
/// this tag is how a waiter learns, after wake-up, which object satisfied
/// it and which of its blocks still need unlinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WaitBlockStatus {
    /// Not linked, or removed without acquisition
    Inactive = 0,
    /// Linked in an object's wait queue, not yet resolved
    Active = 1,
    /// A signaler (or the waiter itself) acquired the object on this block's behalf
    Acquired = 2,
}

/// Wait block: the per-(thread, object) record linking a waiter to a queue
///
/// Passive data. Neither pointer is owning; both are bounded by the
/// enclosing wait call.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct KWaitBlock {
    /// Link in the object's wait queue
    pub(crate) entry: ListEntry,
    /// Waiting thread
    pub(crate) thread: *const KThread,
    /// Object being waited on
    pub(crate) object: *const KSynchObject,
    /// Resolution state
    pub(crate) status: WaitBlockStatus,
    /// Position in the wait set
    pub(crate) index: u8,
}

impl KWaitBlock {
    /// Create an empty wait block
    pub(crate) const fn new() -> Self {
        Self {
            entry: ListEntry::new(),
            thread: ptr::null(),
            object: ptr::null(),
            status: WaitBlockStatus::Inactive,
            index: 0,
        }
    }

    /// Initialize a wait block for one (thread, object) pairing
    pub(crate) fn init(&mut self, thread: *const KThread, object: *const KSynchObject, index: u8) {
        self.entry = ListEntry::new();
        self.thread = thread;
        self.object = object;
        self.status = WaitBlockStatus::Inactive;
        self.index = index;
    }
}

impl Default for KWaitBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock-guarded portion of a synch object
pub(crate) struct ObjectInner {
    /// Ready count; 0 means not ready
    pub(crate) ready_count: u32,
    /// FIFO wait queue head (next to satisfy at the front)
    pub(crate) waitq: ListEntry,
    /// Owning thread (mutex kind only; null otherwise)
    pub(crate) owner: *const KThread,
    /// Upper bound on the ready count (semaphore kind only)
    pub(crate) limit: u32,
}

// Safety: the raw pointers are only followed under the object lock.
unsafe impl Send for ObjectInner {}

impl ObjectInner {
    /// Link a wait block at the tail of the queue and mark it active.
    ///
    /// # Safety
    /// `wb` must point to a valid, unlinked wait block that outlives its
    /// queue membership. The head must have been initialized.
    pub(crate) unsafe fn enqueue(&mut self, wb: *mut KWaitBlock) {
        (*wb).status = WaitBlockStatus::Active;
        self.waitq.insert_tail(&mut (*wb).entry);
    }

    /// Peek at the wait block at the head of the queue.
    ///
    /// # Safety
    /// The object lock must be held.
    pub(crate) unsafe fn head_block(&mut self) -> Option<*mut KWaitBlock> {
        if self.waitq.is_empty() {
            None
        } else {
            Some(containing_record!(self.waitq.flink, KWaitBlock, entry))
        }
    }
}

/// Polymorphic synchronization object header
///
/// Embedded first in every waitable object. The spin mutex is the
/// per-object spinlock: it is the single serialization point for the
/// ready count, the wait queue, and the kind-specific fields.
///
/// An object must be initialized in place and must not move afterwards;
/// wait blocks and the queue head hold its address.
pub struct KSynchObject {
    kind: SynchKind,
    pub(crate) state: SpinMutex<ObjectInner>,
}

impl KSynchObject {
    /// Create a new header of the given kind
    pub(crate) const fn new(kind: SynchKind) -> Self {
        Self {
            kind,
            state: SpinMutex::new(ObjectInner {
                ready_count: 0,
                waitq: ListEntry::new(),
                owner: ptr::null(),
                limit: u32::MAX,
            }),
        }
    }

    /// Initialize the header in place with an initial ready count
    pub(crate) fn init(&self, ready_count: u32) {
        let mut inner = self.state.lock();
        inner.ready_count = ready_count;
        inner.owner = ptr::null();
        inner.limit = u32::MAX;
        inner.waitq.init_head();
    }

    /// Get the object kind
    #[inline]
    pub fn kind(&self) -> SynchKind {
        self.kind
    }

    /// Current ready count
    #[inline]
    pub fn ready_count(&self) -> u32 {
        self.state.lock().ready_count
    }

    /// Check whether any thread is queued on this object
    #[inline]
    pub fn has_waiters(&self) -> bool {
        !self.state.lock().waitq.is_empty()
    }

    /// Number of threads queued on this object
    pub fn waiter_count(&self) -> usize {
        let inner = self.state.lock();
        if inner.waitq.is_empty() {
            return 0;
        }
        let head = &inner.waitq as *const ListEntry;
        let mut count = 0;
        let mut cursor = inner.waitq.flink;
        unsafe {
            while cursor as *const ListEntry != head {
                count += 1;
                cursor = (*cursor).flink;
            }
        }
        count
    }

    /// Convert observed readiness into an acquisition by `thread`.
    ///
    /// Called with the object lock held, after `ready_count > 0` has been
    /// observed, exactly once per successful satisfaction.
    pub(crate) fn acquire_locked(&self, inner: &mut ObjectInner, thread: *const KThread) {
        debug_assert!(inner.ready_count > 0, "acquisition without readiness");
        match self.kind {
            // Latched kinds: readiness is not consumed, so one signal can
            // satisfy every queued waiter.
            SynchKind::Event | SynchKind::Callout => {}
            SynchKind::Semaphore => {
                inner.ready_count -= 1;
            }
            SynchKind::Mutex => {
                assert_eq!(inner.ready_count, 1, "mutex ready count out of range");
                assert!(inner.owner.is_null(), "mutex acquired while owned");
                inner.ready_count = 0;
                inner.owner = thread;
            }
        }
    }
}
