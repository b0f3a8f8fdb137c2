//! Reactive Runtime
//!
//! The runtime owns the two arenas the dependency graph lives in: one for
//! deps, one for watchers. Edges are stored on both sides as arena keys:
//!
//! - a dep keeps the ordered set of watchers subscribed to it;
//! - a watcher keeps the set of deps it read during its last evaluation.
//!
//! Neither side owns the other. A dep's slot is freed when its owning
//! property or observer is dropped; a watcher's slot is freed on teardown.
//! Stale keys on the other side resolve to nothing.
//!
//! # Re-entrancy
//!
//! Every accessor here borrows an arena for the duration of a closure that
//! never calls user code. Callers copy what they need out (subscriber
//! snapshots, getter handles) and run user code after the borrow ends,
//! so a getter that creates or tears down watchers cannot hit a borrow
//! conflict.
//!
//! # Thread Safety
//!
//! The runtime is thread-local. The dependency graph is never shared
//! between threads.

use std::cell::RefCell;

use indexmap::IndexSet;
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::subscriber::{DepId, WatcherId};
use super::watcher::WatcherNode;

/// Subscriber snapshot taken before a dep notifies.
pub(crate) type Subscribers = SmallVec<[WatcherId; 8]>;

#[derive(Default)]
pub(crate) struct DepNode {
    /// Insertion-ordered, so notification order follows subscription order.
    subs: IndexSet<WatcherId>,
}

/// The per-thread reactive runtime.
pub(crate) struct Runtime {
    deps: RefCell<SlotMap<DepId, DepNode>>,
    watchers: RefCell<SlotMap<WatcherId, WatcherNode>>,
}

thread_local! {
    static RUNTIME: Runtime = Runtime {
        deps: RefCell::new(SlotMap::with_key()),
        watchers: RefCell::new(SlotMap::with_key()),
    };
}

/// Run `f` against the runtime, or return `None` while the thread is
/// shutting down and the runtime is already gone.
fn access<R>(f: impl FnOnce(&Runtime) -> R) -> Option<R> {
    RUNTIME.try_with(f).ok()
}

impl Runtime {
    pub(crate) fn create_dep() -> DepId {
        access(|rt| rt.deps.borrow_mut().insert(DepNode::default())).unwrap_or_default()
    }

    /// Free a dep's slot. Called from `Dep::drop`, which may run while the
    /// thread is tearing down, so failures to reach the runtime are ignored.
    pub(crate) fn dispose_dep(dep: DepId) {
        access(|rt| {
            if let Ok(mut deps) = rt.deps.try_borrow_mut() {
                deps.remove(dep);
            }
        });
    }

    pub(crate) fn dep_exists(dep: DepId) -> bool {
        access(|rt| rt.deps.borrow().contains_key(dep)).unwrap_or(false)
    }

    pub(crate) fn dep_count() -> usize {
        access(|rt| rt.deps.borrow().len()).unwrap_or(0)
    }

    /// Add `watcher` to the dep's subscriber set. Returns whether it was
    /// newly added.
    pub(crate) fn add_subscriber(dep: DepId, watcher: WatcherId) -> bool {
        access(|rt| {
            rt.deps
                .borrow_mut()
                .get_mut(dep)
                .map(|node| node.subs.insert(watcher))
                .unwrap_or(false)
        })
        .unwrap_or(false)
    }

    pub(crate) fn remove_subscriber(dep: DepId, watcher: WatcherId) {
        access(|rt| {
            if let Some(node) = rt.deps.borrow_mut().get_mut(dep) {
                node.subs.shift_remove(&watcher);
            }
        });
    }

    /// Remove `watcher` from every dep in `deps` in one borrow.
    pub(crate) fn remove_subscriber_from_all(deps: impl IntoIterator<Item = DepId>, watcher: WatcherId) {
        access(|rt| {
            let mut arena = rt.deps.borrow_mut();
            for dep in deps {
                if let Some(node) = arena.get_mut(dep) {
                    node.subs.shift_remove(&watcher);
                }
            }
        });
    }

    pub(crate) fn subscribers(dep: DepId) -> Subscribers {
        access(|rt| {
            rt.deps
                .borrow()
                .get(dep)
                .map(|node| node.subs.iter().copied().collect())
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }

    pub(crate) fn has_subscriber(dep: DepId, watcher: WatcherId) -> bool {
        access(|rt| {
            rt.deps
                .borrow()
                .get(dep)
                .is_some_and(|node| node.subs.contains(&watcher))
        })
        .unwrap_or(false)
    }

    pub(crate) fn insert_watcher(node: WatcherNode) -> WatcherId {
        access(|rt| rt.watchers.borrow_mut().insert(node)).unwrap_or_default()
    }

    /// Remove a watcher's slot and hand it back so the caller drops it
    /// (and whatever its closures captured) outside the arena borrow.
    pub(crate) fn remove_watcher(watcher: WatcherId) -> Option<WatcherNode> {
        access(|rt| rt.watchers.borrow_mut().remove(watcher)).flatten()
    }

    pub(crate) fn watcher_count() -> usize {
        access(|rt| rt.watchers.borrow().len()).unwrap_or(0)
    }

    pub(crate) fn with_watcher<R>(watcher: WatcherId, f: impl FnOnce(&WatcherNode) -> R) -> Option<R> {
        access(|rt| rt.watchers.borrow().get(watcher).map(f)).flatten()
    }

    pub(crate) fn with_watcher_mut<R>(
        watcher: WatcherId,
        f: impl FnOnce(&mut WatcherNode) -> R,
    ) -> Option<R> {
        access(|rt| rt.watchers.borrow_mut().get_mut(watcher).map(f)).flatten()
    }
}
