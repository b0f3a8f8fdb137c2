use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use super::Scheduler;
use crate::config;
use crate::diagnostics::{self, DiagnosticKind};
use crate::reactive::{Watcher, WatcherId};

#[derive(Default)]
struct QueueState {
    queue: Vec<Watcher>,
    /// Watchers currently waiting in `queue`.
    has: HashSet<WatcherId>,
    /// Times each watcher was re-queued during the current flush.
    circular: HashMap<WatcherId, usize>,
    /// Position of the job being run.
    index: usize,
    flushing: bool,
    /// A flush is owed for this tick.
    waiting: bool,
}

/// Default scheduler: a de-duplicating queue flushed in creation order.
pub struct QueueScheduler {
    state: RefCell<QueueState>,
    waker: Option<Rc<dyn Fn()>>,
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(QueueState::default()),
            waker: None,
        }
    }

    /// Call `waker` once per tick, when the first job is queued. Hosts use
    /// it to arrange a [`flush`](Scheduler::flush) on their next tick.
    pub fn with_waker(waker: impl Fn() + 'static) -> Self {
        Self {
            state: RefCell::new(QueueState::default()),
            waker: Some(Rc::new(waker)),
        }
    }

    pub fn is_flushing(&self) -> bool {
        self.state.borrow().flushing
    }

    fn reset(&self) {
        let mut state = self.state.borrow_mut();
        state.queue.clear();
        state.has.clear();
        state.circular.clear();
        state.index = 0;
        state.flushing = false;
        state.waiting = false;
    }
}

impl Default for QueueScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for QueueScheduler {
    fn schedule(&self, watcher: Watcher) {
        let first_of_tick = {
            let mut state = self.state.borrow_mut();
            if !state.has.insert(watcher.id()) {
                return;
            }

            if state.flushing {
                // keep the rest of the queue in uid order
                let uid = watcher.uid();
                let mut at = state.queue.len();
                while at > state.index + 1 && state.queue[at - 1].uid() > uid {
                    at -= 1;
                }
                state.queue.insert(at, watcher);
            } else {
                state.queue.push(watcher);
            }

            let first = !state.waiting;
            state.waiting = true;
            first
        };

        if !first_of_tick {
            return;
        }
        if !config::is_async() {
            self.flush();
        } else if let Some(waker) = &self.waker {
            waker();
        }
    }

    fn flush(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.flushing {
                return;
            }
            state.flushing = true;
            state.index = 0;
            state.queue.sort_by_key(|watcher| watcher.uid());
            tracing::debug!(jobs = state.queue.len(), "flushing scheduler queue");
        }

        let max_update_count = config::max_update_count();
        let mut ran = 0usize;
        loop {
            let watcher = {
                let mut state = self.state.borrow_mut();
                let Some(&watcher) = state.queue.get(state.index) else {
                    break;
                };
                state.has.remove(&watcher.id());
                watcher
            };

            watcher.before();
            watcher.run();
            ran += 1;

            let looping = {
                let mut state = self.state.borrow_mut();
                let requeued = state.has.contains(&watcher.id());
                let looping = requeued && {
                    let count = state.circular.entry(watcher.id()).or_insert(0);
                    *count += 1;
                    *count > max_update_count
                };
                state.index += 1;
                looping
            };

            if looping {
                let label = watcher.label().unwrap_or_default();
                diagnostics::report(
                    DiagnosticKind::InfiniteUpdateLoop,
                    format!("you may have an infinite update loop in watcher \"{label}\""),
                );
                break;
            }
        }

        self.reset();
        tracing::debug!(ran, "scheduler flush complete");
    }

    fn pending(&self) -> usize {
        let state = self.state.borrow();
        state.queue.len().saturating_sub(state.index)
    }
}

impl fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("QueueScheduler")
            .field("queued", &state.queue.len())
            .field("flushing", &state.flushing)
            .field("has_waker", &self.waker.is_some())
            .finish()
    }
}
