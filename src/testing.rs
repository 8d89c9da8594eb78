//! Hosted test harness
//!
//! Provides the two collaborators the framework needs — a scheduler and a
//! timer queue — backed by ordinary host threads, so the engine's full
//! park/unpark and expiry paths run under the test suite. One harness is
//! shared by every test in the process, the same way a kernel registers
//! its collaborators once at bring-up.

use std::cell::Cell;
use std::collections::HashMap;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, OnceLock};
use std::thread as host;
use std::time::{Duration, Instant};

use crate::callout::{register_timer_queue, KCallout, TimerQueue};
use crate::sched::{register_scheduler, Scheduler};
use crate::thread::KThread;

/// Register the hosted collaborators. Idempotent; every test calls it first.
pub(crate) fn init() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let scheduler: &'static HostScheduler = leak(HostScheduler::new());
        register_scheduler(scheduler);
        let timers: &'static HostTimerQueue = leak(HostTimerQueue::new());
        timers.start();
        register_timer_queue(timers);
    });
}

/// Give a value a static lifetime, kernel-object style
pub(crate) fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// The calling host thread's framework thread record
pub(crate) fn current_thread() -> &'static KThread {
    crate::sched::scheduler().current()
}

/// Poll `condition` until it holds, failing the test after ten seconds
pub(crate) fn spin_until(what: &str, mut condition: impl FnMut() -> bool) {
    let give_up = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < give_up, "timed out waiting for {what}");
        host::sleep(Duration::from_millis(1));
    }
}

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static CURRENT: Cell<*const KThread> = const { Cell::new(ptr::null()) };
}

/// Scheduler backed by host threads: park/unpark map to the host
/// primitives (whose wake tokens satisfy the no-lost-unpark contract) and
/// the clock is a process-wide monotonic instant.
struct HostScheduler {
    epoch: Instant,
    registry: Mutex<HashMap<u32, host::Thread>>,
}

impl HostScheduler {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            registry: Mutex::new(HashMap::new()),
        }
    }
}

impl Scheduler for HostScheduler {
    fn current(&self) -> &'static KThread {
        CURRENT.with(|slot| {
            if slot.get().is_null() {
                let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
                let thread: &'static KThread = leak(KThread::new(id));
                thread.init();
                self.registry.lock().unwrap().insert(id, host::current());
                slot.set(thread as *const KThread);
            }
            unsafe { &*slot.get() }
        })
    }

    fn park(&self) {
        host::park();
    }

    fn unpark(&self, thread: &KThread) {
        if let Some(handle) = self.registry.lock().unwrap().get(&thread.id()) {
            handle.unpark();
        }
    }

    fn now(&self) -> u64 {
        // The epoch predates every caller, so this never reports 0
        (self.epoch.elapsed().as_nanos() as u64).max(1)
    }
}

/// Timer queue backed by a worker thread. Expiry runs while the pending
/// list's lock is held, which is what makes `cancel` synchronous: a
/// cancel that races an in-flight expiry blocks until the expiry is done.
struct HostTimerQueue {
    pending: Mutex<Vec<(u64, usize)>>,
    wakeup: Condvar,
}

impl HostTimerQueue {
    fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            wakeup: Condvar::new(),
        }
    }

    fn start(&'static self) {
        host::spawn(move || self.run());
    }

    fn run(&self) {
        let mut pending = self.pending.lock().unwrap();
        loop {
            let now = crate::sched::time_now();
            let mut index = 0;
            while index < pending.len() {
                if pending[index].0 <= now {
                    let (_, callout) = pending.swap_remove(index);
                    unsafe { (*(callout as *const KCallout)).expire() };
                } else {
                    index += 1;
                }
            }

            match pending.iter().map(|&(deadline, _)| deadline).min() {
                Some(deadline) => {
                    let sleep = deadline.saturating_sub(crate::sched::time_now()).max(1);
                    let (guard, _) = self
                        .wakeup
                        .wait_timeout(pending, Duration::from_nanos(sleep))
                        .unwrap();
                    pending = guard;
                }
                None => {
                    pending = self.wakeup.wait(pending).unwrap();
                }
            }
        }
    }
}

impl TimerQueue for HostTimerQueue {
    unsafe fn arm(&self, callout: *const KCallout, deadline: u64) {
        self.pending.lock().unwrap().push((deadline, callout as usize));
        self.wakeup.notify_one();
    }

    unsafe fn cancel(&self, callout: *const KCallout) {
        self.pending
            .lock()
            .unwrap()
            .retain(|&(_, pending)| pending != callout as usize);
    }
}
