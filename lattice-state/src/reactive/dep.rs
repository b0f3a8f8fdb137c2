//! Dep Implementation
//!
//! A dep is the notification subject behind one observable unit: a
//! reactive property, or the shape of a whole record or list.
//!
//! # How Deps Work
//!
//! 1. When the unit is read while a watcher is evaluating, [`DepId::depend`]
//!    hands the dep to that watcher, which subscribes if it has not done so
//!    during this evaluation already.
//!
//! 2. When the unit changes, [`DepId::notify`] takes a snapshot of the
//!    subscribers and calls each one's update hook. Subscribers added or
//!    removed during notification do not disturb the snapshot.
//!
//! # Ownership
//!
//! [`Dep`] is the owning handle; dropping it frees the arena slot. Watchers
//! only ever hold [`DepId`] keys.

use std::fmt;
use std::ops::Deref;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::DepId;
use super::watcher::Watcher;
use crate::config;

/// Owning handle of a dep.
pub struct Dep {
    id: DepId,
}

impl Dep {
    pub fn new() -> Self {
        Self {
            id: Runtime::create_dep(),
        }
    }

    pub fn id(&self) -> DepId {
        self.id
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Dep {
    type Target = DepId;

    fn deref(&self) -> &DepId {
        &self.id
    }
}

impl Drop for Dep {
    fn drop(&mut self) {
        Runtime::dispose_dep(self.id);
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl DepId {
    /// Record the currently evaluating watcher, if any.
    pub fn depend(self) {
        if let Some(target) = ReactiveContext::current() {
            Watcher::from_id(target).add_dep(self);
        }
    }

    /// Subscribe `watcher` directly, bypassing the active context.
    pub fn add_sub(self, watcher: Watcher) {
        Runtime::add_subscriber(self, watcher.id());
    }

    pub fn remove_sub(self, watcher: Watcher) {
        Runtime::remove_subscriber(self, watcher.id());
    }

    /// Call the update hook of every current subscriber.
    pub fn notify(self) {
        let mut subs = Runtime::subscribers(self);
        if subs.is_empty() {
            return;
        }

        if !config::is_async() {
            // without an async scheduler the flush order is the notify order
            subs.sort_by_key(|&id| Watcher::from_id(id).uid());
        }

        for id in subs {
            Watcher::from_id(id).update();
        }
    }

    pub fn subscribers(self) -> Vec<Watcher> {
        Runtime::subscribers(self)
            .into_iter()
            .map(Watcher::from_id)
            .collect()
    }

    pub fn subscriber_count(self) -> usize {
        Runtime::subscribers(self).len()
    }

    pub fn has_subscriber(self, watcher: Watcher) -> bool {
        Runtime::has_subscriber(self, watcher.id())
    }

    /// Whether the owning [`Dep`] is still alive.
    pub fn is_alive(self) -> bool {
        Runtime::dep_exists(self)
    }
}
