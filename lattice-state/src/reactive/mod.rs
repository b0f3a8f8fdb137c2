//! Reactive Primitives
//!
//! This module implements the dependency tracking half of the system:
//! deps, watchers, computed values, and explicit watches. The observer
//! module turns plain records and lists into trees of deps; this module
//! decides who gets notified when one of them fires.
//!
//! # Concepts
//!
//! ## Deps
//!
//! A [`Dep`] is the subscriber list behind one observable unit. Reading the
//! unit while a watcher evaluates subscribes that watcher; changing it
//! notifies every subscriber.
//!
//! ## Watchers
//!
//! A [`Watcher`] runs a getter with itself as the active subscriber and
//! remembers what the getter read. On notification it either re-runs at
//! once (sync), marks itself dirty (lazy), or queues itself with the
//! scheduler.
//!
//! ## Computed values
//!
//! A [`Computed`] is a lazy watcher whose value is recomputed on the next
//! read after a change.
//!
//! # Implementation Notes
//!
//! Deps and watchers live in thread-local arenas and address each other by
//! versioned keys. A key whose slot was freed simply resolves to nothing,
//! so a torn-down watcher left in some dep's snapshot is harmless.

mod computed;
mod context;
mod dep;
mod runtime;
mod subscriber;
mod watch;
mod watcher;

pub use computed::{Computed, Setter};
pub use context::{untrack, ReactiveContext};
pub use dep::Dep;
pub use subscriber::{DepId, WatcherId};
pub use watch::{watch, Path, WatchHandle, WatchOptions, WatchSource};
pub use watcher::{Callback, Getter, Hook, Watcher, WatcherOptions, WatcherState};

pub(crate) use watch::watch_labeled;

/// Number of live deps and watchers on this thread.
pub fn arena_sizes() -> (usize, usize) {
    (runtime::Runtime::dep_count(), runtime::Runtime::watcher_count())
}
