//! Reactive Context
//!
//! The reactive context tracks which watcher is currently evaluating.
//! This enables automatic dependency tracking: when a reactive property is
//! read, the dep behind it records the current watcher.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a context pushes an entry, and
//! the returned guard pops it when dropped, on every exit path including
//! unwinding. An entry may be `None`: that is an untracked region
//! (e.g. running a data factory), where reads record nothing even if an
//! outer watcher is evaluating.
//!
//! This design supports nested evaluation, e.g. a computed value read
//! from inside a render watcher.

use std::cell::RefCell;

use super::WatcherId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<WatcherId>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ReactiveContext {
    target: Option<WatcherId>,
    depth: usize,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given watcher.
    ///
    /// While this context is active, any reactive property that is read
    /// will record the watcher as a subscriber.
    pub fn enter(watcher: WatcherId) -> Self {
        Self::push(Some(watcher))
    }

    /// Enter a region in which nothing is tracked.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(target: Option<WatcherId>) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(target);
            stack.len()
        });

        Self { target, depth }
    }

    /// Check if there is an active watcher to record dependencies for.
    pub fn is_active() -> bool {
        Self::current().is_some()
    }

    /// Get the watcher currently evaluating, if any.
    pub fn current() -> Option<WatcherId> {
        CONTEXT_STACK
            .try_with(|stack| stack.borrow().last().copied().flatten())
            .ok()
            .flatten()
    }

    /// Nesting depth of the context stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let _ = CONTEXT_STACK.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "ReactiveContext dropped out of order"
            );
            let popped = stack.pop();
            debug_assert_eq!(
                popped,
                Some(self.target),
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.target,
                popped
            );
        });
    }
}

/// Run `f` without recording any dependency for the current watcher.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<WatcherId> {
        let mut arena: SlotMap<WatcherId, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn context_tracks_watcher() {
        let id = ids(1)[0];

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current(), Some(id));
        }

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current().is_none());
    }

    #[test]
    fn nested_contexts() {
        let ids = ids(2);

        {
            let _ctx1 = ReactiveContext::enter(ids[0]);
            assert_eq!(ReactiveContext::current(), Some(ids[0]));

            {
                let _ctx2 = ReactiveContext::enter(ids[1]);
                assert_eq!(ReactiveContext::current(), Some(ids[1]));
                assert_eq!(ReactiveContext::depth(), 2);
            }

            assert_eq!(ReactiveContext::current(), Some(ids[0]));
        }

        assert!(ReactiveContext::current().is_none());
    }

    #[test]
    fn untracked_region_hides_outer_watcher() {
        let id = ids(1)[0];
        let _ctx = ReactiveContext::enter(id);

        let inner = untrack(ReactiveContext::current);
        assert_eq!(inner, None);
        assert_eq!(ReactiveContext::current(), Some(id));
    }

    #[test]
    fn guard_pops_on_unwind() {
        let id = ids(1)[0];
        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(id);
            panic!("inside evaluation");
        });

        assert!(result.is_err());
        assert_eq!(ReactiveContext::depth(), 0);
    }
}
