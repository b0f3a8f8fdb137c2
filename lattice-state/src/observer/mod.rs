//! Observation
//!
//! Turns plain records and lists into reactive ones. Observing a record
//! converts each of its properties with [`define_reactive`]; observing a
//! list swaps its mutators for notifying ones. Either way the value is
//! tagged with an [`Observer`] whose dep fires on structural changes
//! (keys added or deleted, list contents rearranged).
//!
//! Observation is recursive and idempotent: a value is tagged once, and
//! observing it again returns the existing observer.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

mod array;
mod define;
mod list;
mod record;
mod traverse;
mod value;

pub use array::depend_array;
pub use define::{define_reactive, DefineOptions};
pub use list::List;
pub use record::{AccessorGet, AccessorSet, Record};
pub use traverse::traverse;
pub use value::{same_value, Value};

use crate::diagnostics::{self, DiagnosticKind};
use crate::reactive::{Dep, DepId};

/// Tag attached to an observed record or list.
pub struct Observer {
    dep: Dep,
    vm_count: Cell<usize>,
}

impl Observer {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            dep: Dep::new(),
            vm_count: Cell::new(0),
        })
    }

    /// The dep notified on structural changes.
    pub fn dep(&self) -> DepId {
        self.dep.id()
    }

    /// Number of states using this value as their root data.
    pub fn vm_count(&self) -> usize {
        self.vm_count.get()
    }

    pub fn is_root(&self) -> bool {
        self.vm_count.get() > 0
    }

    pub(crate) fn release_root(&self) {
        self.vm_count.set(self.vm_count.get().saturating_sub(1));
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep.id())
            .field("vm_count", &self.vm_count.get())
            .finish()
    }
}

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Globally enable or disable attaching new observers.
pub fn toggle_observing(value: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(value));
}

pub fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Disable observation until the guard drops, then restore the previous
/// setting.
#[must_use = "observation resumes as soon as the guard is dropped"]
pub struct ObservingGuard {
    previous: bool,
}

impl Drop for ObservingGuard {
    fn drop(&mut self) {
        toggle_observing(self.previous);
    }
}

pub fn pause_observing() -> ObservingGuard {
    let previous = should_observe();
    toggle_observing(false);
    ObservingGuard { previous }
}

/// Attach an observer to `value` if it is a record or list that can be
/// observed, or return the one it already has. `as_root` counts the value
/// as some state's root data.
pub fn observe(value: &Value, as_root: bool) -> Option<Rc<Observer>> {
    let observer = match value {
        Value::Record(record) => record.observer().or_else(|| {
            (should_observe() && record.is_extensible() && !record.is_raw())
                .then(|| observe_record(record))
        }),
        Value::List(list) => list.observer().or_else(|| {
            (should_observe() && list.is_extensible() && !list.is_raw())
                .then(|| observe_list(list))
        }),
        _ => None,
    };

    if as_root {
        if let Some(observer) = &observer {
            observer.vm_count.set(observer.vm_count.get() + 1);
        }
    }
    observer
}

fn observe_record(record: &Record) -> Rc<Observer> {
    let observer = Observer::new();
    // tag before walking so cycles find the observer
    record.attach_observer(observer.clone());
    tracing::trace!(keys = record.len(), dep = ?observer.dep(), "observing record");
    for key in record.keys() {
        define_reactive(record, &key, None, DefineOptions::default());
    }
    observer
}

fn observe_list(list: &List) -> Rc<Observer> {
    let observer = Observer::new();
    list.attach_observer(observer.clone(), &array::INTERCEPTED);
    let items = list.peek_items();
    tracing::trace!(len = items.len(), dep = ?observer.dep(), "observing list");
    array::observe_items(&items);
    observer
}

/// A property name or list index for [`set`] and [`del`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    /// Names that are canonical non-negative integers count as indices.
    fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Name(name) => name
                .parse::<usize>()
                .ok()
                .filter(|index| index.to_string() == *name),
        }
    }

    fn name(&self) -> String {
        match self {
            Self::Name(name) => name.clone(),
            Self::Index(index) => index.to_string(),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Set a property so that the change is observed, adding it reactively if
/// it is new. Returns the value.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();

    match target {
        Value::List(list) => match key.as_index() {
            Some(index) => {
                let len = list.peek_items().len();
                if index > len {
                    list.set_index(index - 1, Value::Undefined);
                }
                list.splice(index, 1, [value.clone()]);
            }
            None => diagnostics::report(
                DiagnosticKind::InvalidTarget,
                format!("cannot set non-index key \"{}\" on a list", key.name()),
            ),
        },
        Value::Record(record) => set_on_record(record, &key.name(), value.clone()),
        other => diagnostics::report(
            DiagnosticKind::InvalidTarget,
            format!(
                "cannot set reactive property on undefined, null, or primitive value: {}",
                other.type_name()
            ),
        ),
    }
    value
}

fn set_on_record(record: &Record, key: &str, value: Value) {
    if record.contains_key(key) {
        record.set(key, value);
        return;
    }

    let observer = record.observer();
    let protected = record.is_raw() || observer.as_ref().is_some_and(|o| o.is_root());
    match observer {
        _ if protected => {
            diagnostics::report(
                DiagnosticKind::RootMutation,
                format!(
                    "avoid adding reactive properties to a root state object at runtime, \
                     declare \"{key}\" upfront instead"
                ),
            );
            record.set(key, value);
        }
        Some(observer) => {
            define_reactive(record, key, Some(value), DefineOptions::default());
            observer.dep().notify();
        }
        None => record.set(key, value),
    }
}

/// Delete a property so that the change is observed.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();

    match target {
        Value::List(list) => match key.as_index() {
            Some(index) => {
                list.splice(index, 1, []);
            }
            None => diagnostics::report(
                DiagnosticKind::InvalidTarget,
                format!("cannot delete non-index key \"{}\" from a list", key.name()),
            ),
        },
        Value::Record(record) => {
            let key = key.name();
            let observer = record.observer();
            if record.is_raw() || observer.as_ref().is_some_and(|o| o.is_root()) {
                diagnostics::report(
                    DiagnosticKind::RootMutation,
                    format!(
                        "avoid deleting properties on a root state object, \
                         set \"{key}\" to null instead"
                    ),
                );
                record.remove(&key);
                return;
            }
            if record.remove(&key) {
                if let Some(observer) = observer {
                    observer.dep().notify();
                }
            }
        }
        other => diagnostics::report(
            DiagnosticKind::InvalidTarget,
            format!(
                "cannot delete reactive property on undefined, null, or primitive value: {}",
                other.type_name()
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Watcher, WatcherOptions};
    use std::cell::Cell;

    /// A record held under a reactive property of an observed parent, so
    /// reading it through the parent subscribes to its observer dep.
    fn nested() -> (Record, Record) {
        let child = Record::from_pairs([("a", 1)]);
        let parent = Record::from_pairs([("child", Value::from(child.clone()))]);
        observe(&Value::from(parent.clone()), false);
        (parent, child)
    }

    #[test]
    fn observe_is_idempotent() {
        let record = Record::from_pairs([("a", 1)]);
        let value = Value::from(record.clone());

        let first = observe(&value, false).unwrap();
        let dep = record.property_dep("a").unwrap();
        let second = observe(&value, false).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(record.property_dep("a"), Some(dep));
    }

    #[test]
    fn primitives_frozen_and_raw_values_are_not_observed() {
        assert!(observe(&Value::from(1), false).is_none());

        let frozen = Record::from_pairs([("a", 1)]);
        frozen.freeze();
        assert!(observe(&Value::from(frozen), false).is_none());

        let raw = Record::from_pairs([("a", 1)]);
        raw.mark_raw();
        assert!(observe(&Value::from(raw.clone()), false).is_none());
        assert!(!raw.is_reactive("a"));
    }

    #[test]
    fn paused_observation_attaches_nothing() {
        let record = Record::from_pairs([("a", 1)]);
        {
            let _paused = pause_observing();
            assert!(!should_observe());
            assert!(observe(&Value::from(record.clone()), false).is_none());
        }
        assert!(should_observe());
        assert!(observe(&Value::from(record), false).is_some());
    }

    #[test]
    fn root_observation_counts_owners() {
        let record = Record::new();
        let value = Value::from(record.clone());
        observe(&value, true);
        observe(&value, true);

        let observer = record.observer().unwrap();
        assert_eq!(observer.vm_count(), 2);
        observer.release_root();
        assert!(observer.is_root());
    }

    #[test]
    fn set_adds_reactive_property_and_notifies_shape() {
        let (parent, child) = nested();
        let runs = Rc::new(Cell::new(0));
        let p = parent.clone();
        let r = runs.clone();
        let watcher = Watcher::with_options(
            move || {
                r.set(r.get() + 1);
                Ok(p.get("child"))
            },
            None,
            WatcherOptions {
                sync: true,
                ..Default::default()
            },
        );

        set(&Value::from(child.clone()), "b", 2);
        assert!(child.is_reactive("b"));
        assert_eq!(runs.get(), 2);

        // existing key: plain assignment through the reactive setter
        set(&Value::from(child.clone()), "b", 3);
        assert_eq!(child.get("b"), Value::from(3));
        assert_eq!(runs.get(), 2);
        watcher.teardown();
    }

    #[test]
    fn del_notifies_only_when_something_was_removed() {
        let (parent, child) = nested();
        let runs = Rc::new(Cell::new(0));
        let p = parent.clone();
        let r = runs.clone();
        let watcher = Watcher::with_options(
            move || {
                r.set(r.get() + 1);
                Ok(p.get("child"))
            },
            None,
            WatcherOptions {
                sync: true,
                ..Default::default()
            },
        );

        del(&Value::from(child.clone()), "missing");
        assert_eq!(runs.get(), 1);
        del(&Value::from(child.clone()), "a");
        assert!(!child.contains_key("a"));
        assert_eq!(runs.get(), 2);
        watcher.teardown();
    }

    #[test]
    fn root_mutations_warn_and_proceed_without_notifying() {
        diagnostics::take();
        let root = Record::from_pairs([("a", 1)]);
        let observer = observe(&Value::from(root.clone()), true).unwrap();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let dep = observer.dep();
        let watcher = Watcher::with_options(
            move || {
                r.set(r.get() + 1);
                dep.depend();
                Ok(Value::Undefined)
            },
            None,
            WatcherOptions {
                sync: true,
                ..Default::default()
            },
        );
        assert!(observer.dep().has_subscriber(watcher));

        set(&Value::from(root.clone()), "extra", 1);
        del(&Value::from(root.clone()), "a");

        let kinds: Vec<_> = diagnostics::take().into_iter().map(|d| d.kind).collect();
        assert_eq!(kinds, [DiagnosticKind::RootMutation, DiagnosticKind::RootMutation]);
        assert_eq!(root.get("extra"), Value::from(1));
        assert!(!root.is_reactive("extra"));
        assert!(!root.contains_key("a"));
        assert_eq!(runs.get(), 1);
        watcher.teardown();
    }

    #[test]
    fn set_on_list_index_pads_and_notifies() {
        let list = List::from(vec![Value::from(1)]);
        let value = Value::from(list.clone());
        observe(&value, false);
        let runs = Rc::new(Cell::new(0));
        let l = list.clone();
        let r = runs.clone();
        let watcher = Watcher::with_options(
            move || {
                r.set(r.get() + 1);
                Ok(Value::from(l.len()))
            },
            None,
            WatcherOptions {
                sync: true,
                ..Default::default()
            },
        );

        set(&value, 0, 5);
        set(&value, 3, 7);
        assert_eq!(
            list.to_vec(),
            vec![Value::from(5), Value::Undefined, Value::Undefined, Value::from(7)]
        );
        assert_eq!(runs.get(), 3);

        del(&value, "1");
        assert_eq!(list.to_vec().len(), 3);
        assert_eq!(runs.get(), 4);
        watcher.teardown();
    }

    #[test]
    fn invalid_targets_are_reported() {
        diagnostics::take();
        set(&Value::Null, "a", 1);
        del(&Value::from(3), "a");
        set(&Value::from(List::new()), "name", 1);

        let reported = diagnostics::take();
        assert_eq!(reported.len(), 3);
        assert!(reported.iter().all(|d| d.kind == DiagnosticKind::InvalidTarget));
    }

    #[test]
    fn unobserved_record_gets_plain_property() {
        let record = Record::new();
        set(&Value::from(record.clone()), "a", 1);
        assert_eq!(record.get("a"), Value::from(1));
        assert!(!record.is_reactive("a"));
    }

    #[test]
    fn raw_records_count_as_root_targets() {
        diagnostics::take();
        let record = Record::new();
        record.mark_raw();
        set(&Value::from(record.clone()), "a", 1);

        let reported = diagnostics::take();
        assert_eq!(reported[0].kind, DiagnosticKind::RootMutation);
        assert_eq!(record.get("a"), Value::from(1));
    }
}
