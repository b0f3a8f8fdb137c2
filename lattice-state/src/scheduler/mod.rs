//! Update Scheduler
//!
//! Eager watchers do not re-run when a dep notifies them. They hand
//! themselves to the thread's scheduler, which batches every watcher
//! dirtied during one logical tick and runs each of them once when the
//! host calls [`flush`].
//!
//! # Ordering
//!
//! The default [`QueueScheduler`] runs watchers in creation order:
//!
//! 1. A parent state is created before its children, so parents update
//!    first.
//! 2. A state's user watchers are created before its render watcher, so
//!    they run before it.
//! 3. A watcher queued while the flush is running is slotted in by uid
//!    after the current position, and runs in the same flush.
//!
//! Hosts with their own event loop can install a different [`Scheduler`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::reactive::Watcher;

mod queue;

pub use queue::QueueScheduler;

/// Receives update signals from eager watchers.
pub trait Scheduler {
    /// Queue `watcher` to run at the next flush.
    fn schedule(&self, watcher: Watcher);

    /// Run everything queued so far.
    fn flush(&self);

    /// Number of jobs waiting to run.
    fn pending(&self) -> usize {
        0
    }
}

thread_local! {
    static SCHEDULER: RefCell<Rc<dyn Scheduler>> =
        RefCell::new(Rc::new(QueueScheduler::new()) as Rc<dyn Scheduler>);
}

/// Install `scheduler` for this thread and return the previous one.
pub fn install(scheduler: Rc<dyn Scheduler>) -> Rc<dyn Scheduler> {
    SCHEDULER.with(|slot| slot.replace(scheduler))
}

/// The scheduler installed on this thread.
pub fn current() -> Rc<dyn Scheduler> {
    SCHEDULER.with(|slot| slot.borrow().clone())
}

pub(crate) fn schedule(watcher: Watcher) {
    current().schedule(watcher);
}

/// Flush the installed scheduler.
pub fn flush() {
    current().flush();
}

pub fn pending() -> usize {
    current().pending()
}
