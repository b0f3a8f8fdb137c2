//! Watcher Implementation
//!
//! A watcher evaluates a getter with itself as the active subscriber, so
//! every dep the getter reads subscribes it. When any of those deps
//! notifies, the watcher either marks itself dirty (lazy), re-runs right
//! away (sync), or asks the scheduler to re-run it later (eager).
//!
//! # Dependency Sets
//!
//! Each evaluation collects a fresh set of deps. Afterwards the watcher
//! unsubscribes from every dep of the previous set that was not read this
//! time. This is what keeps conditional reads honest: a getter that stops
//! reading a property stops being notified by it.
//!
//! # Failures
//!
//! A getter that returns `Err` or panics does not take the graph down.
//! The failure is reported through [`crate::diagnostics`], the previous
//! value is kept, and the dependency set of the partial run is committed.
//!
//! # Lifecycle
//!
//! ```text
//!   new ──▶ Clean ◀──evaluate/run── Dirty
//!             │                       ▲
//!             └──────── update ───────┘
//!   teardown (from any state) ──▶ TornDown
//! ```
//!
//! [`Watcher`] is a copyable handle into the runtime arena. Teardown is
//! explicit and idempotent; operations on a torn-down handle are no-ops.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::{next_uid, DepId, WatcherId};
use crate::diagnostics::{self, DiagnosticKind};
use crate::error::{Error, Result};
use crate::observer::{same_value, traverse, Value};
use crate::scheduler;

/// A watcher's expression.
pub type Getter = Rc<dyn Fn() -> Result<Value>>;

/// Called by [`Watcher::run`] with `(new, old)` when the value changed.
pub type Callback = Rc<dyn Fn(&Value, &Value) -> Result<()>>;

/// Hook the scheduler runs right before [`Watcher::run`].
pub type Hook = Rc<dyn Fn()>;

#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Do not evaluate on construction or on update; recompute on demand.
    pub lazy: bool,
    /// Created by user code (an explicit watch) rather than the runtime.
    pub user: bool,
    /// Re-run synchronously on update instead of going through the scheduler.
    pub sync: bool,
    /// Traverse the produced value so nested properties become dependencies.
    pub deep: bool,
    pub before: Option<Hook>,
    /// Name used in diagnostics.
    pub label: Option<String>,
}

impl fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("lazy", &self.lazy)
            .field("user", &self.user)
            .field("sync", &self.sync)
            .field("deep", &self.deep)
            .field("before", &self.before.is_some())
            .field("label", &self.label)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// The value is up to date.
    Clean,
    /// A dependency changed since the last evaluation.
    Dirty,
    /// Terminal. Nothing is evaluated or recorded any more.
    TornDown,
}

pub(crate) struct WatcherNode {
    uid: u64,
    label: String,
    getter: Getter,
    callback: Option<Callback>,
    before: Option<Hook>,
    lazy: bool,
    user: bool,
    sync: bool,
    deep: bool,
    state: WatcherState,
    /// Deps committed by the last evaluation.
    deps: IndexSet<DepId>,
    /// Deps read by the evaluation in progress.
    new_deps: IndexSet<DepId>,
    value: Value,
    evaluations: usize,
}

/// Handle to a watcher in the runtime arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Watcher {
    id: WatcherId,
}

impl Watcher {
    /// Create an eager watcher. The getter runs immediately to establish
    /// the initial dependencies.
    pub fn new<G>(getter: G) -> Self
    where
        G: Fn() -> Result<Value> + 'static,
    {
        Self::with_options(getter, None, WatcherOptions::default())
    }

    /// Create a lazy watcher. Nothing runs until [`Watcher::evaluate`].
    pub fn new_lazy<G>(getter: G) -> Self
    where
        G: Fn() -> Result<Value> + 'static,
    {
        Self::with_options(
            getter,
            None,
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        )
    }

    pub fn with_options<G>(getter: G, callback: Option<Callback>, options: WatcherOptions) -> Self
    where
        G: Fn() -> Result<Value> + 'static,
    {
        let uid = next_uid();
        let label = options.label.unwrap_or_else(|| format!("#{uid}"));
        let lazy = options.lazy;

        let id = Runtime::insert_watcher(WatcherNode {
            uid,
            label,
            getter: Rc::new(getter),
            callback,
            before: options.before,
            lazy,
            user: options.user,
            sync: options.sync,
            deep: options.deep,
            state: if lazy {
                WatcherState::Dirty
            } else {
                WatcherState::Clean
            },
            deps: IndexSet::new(),
            new_deps: IndexSet::new(),
            value: Value::Undefined,
            evaluations: 0,
        });

        let watcher = Self { id };
        if !lazy {
            if let Some(value) = watcher.get() {
                watcher.store(value);
            }
        }
        watcher
    }

    pub(crate) fn from_id(id: WatcherId) -> Self {
        Self { id }
    }

    pub fn id(self) -> WatcherId {
        self.id
    }

    /// Creation-order number; `0` once torn down.
    pub fn uid(self) -> u64 {
        Runtime::with_watcher(self.id, |n| n.uid).unwrap_or(0)
    }

    pub fn label(self) -> Option<String> {
        Runtime::with_watcher(self.id, |n| n.label.clone())
    }

    pub fn state(self) -> WatcherState {
        Runtime::with_watcher(self.id, |n| n.state).unwrap_or(WatcherState::TornDown)
    }

    pub fn is_active(self) -> bool {
        self.state() != WatcherState::TornDown
    }

    pub fn is_dirty(self) -> bool {
        self.state() == WatcherState::Dirty
    }

    pub fn is_lazy(self) -> bool {
        Runtime::with_watcher(self.id, |n| n.lazy).unwrap_or(false)
    }

    pub fn is_user(self) -> bool {
        Runtime::with_watcher(self.id, |n| n.user).unwrap_or(false)
    }

    /// Last successfully computed value.
    pub fn value(self) -> Value {
        Runtime::with_watcher(self.id, |n| n.value.clone()).unwrap_or_default()
    }

    /// Deps committed by the last evaluation.
    pub fn dependencies(self) -> Vec<DepId> {
        Runtime::with_watcher(self.id, |n| n.deps.iter().copied().collect()).unwrap_or_default()
    }

    pub fn dependency_count(self) -> usize {
        Runtime::with_watcher(self.id, |n| n.deps.len()).unwrap_or(0)
    }

    pub fn depends_on(self, dep: DepId) -> bool {
        Runtime::with_watcher(self.id, |n| n.deps.contains(&dep)).unwrap_or(false)
    }

    /// Number of times the getter has run.
    pub fn evaluation_count(self) -> usize {
        Runtime::with_watcher(self.id, |n| n.evaluations).unwrap_or(0)
    }

    /// Run the getter with this watcher as the active subscriber and
    /// commit the dependencies it read.
    ///
    /// Returns `None` if the getter failed (the failure is reported) or
    /// the watcher is torn down.
    pub fn get(self) -> Option<Value> {
        let (getter, deep) = Runtime::with_watcher(self.id, |n| (n.getter.clone(), n.deep))?;

        let result = {
            let _ctx = ReactiveContext::enter(self.id);
            let result = panic::catch_unwind(AssertUnwindSafe(|| getter()))
                .unwrap_or_else(|payload| Err(Error::from_panic(payload)));
            if deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };
        self.cleanup_deps();
        Runtime::with_watcher_mut(self.id, |n| n.evaluations += 1);

        match result {
            Ok(value) => Some(value),
            Err(err) => {
                diagnostics::report_in(
                    DiagnosticKind::EvaluationFailure,
                    format!("error in getter: {err}"),
                    self.context(),
                );
                None
            }
        }
    }

    /// Record `dep` for the evaluation in progress. Subscribes only the
    /// first time the dep is seen across the current and previous sets.
    pub(crate) fn add_dep(self, dep: DepId) {
        let subscribe = Runtime::with_watcher_mut(self.id, |n| {
            n.new_deps.insert(dep) && !n.deps.contains(&dep)
        })
        .unwrap_or(false);

        if subscribe {
            Runtime::add_subscriber(dep, self.id);
        }
    }

    fn cleanup_deps(self) {
        let stale = Runtime::with_watcher_mut(self.id, |n| {
            let stale: SmallVec<[DepId; 8]> = n
                .deps
                .iter()
                .filter(|dep| !n.new_deps.contains(*dep))
                .copied()
                .collect();
            std::mem::swap(&mut n.deps, &mut n.new_deps);
            n.new_deps.clear();
            stale
        })
        .unwrap_or_default();

        if !stale.is_empty() {
            Runtime::remove_subscriber_from_all(stale, self.id);
        }
    }

    /// Update hook, called by a dep that notifies.
    pub fn update(self) {
        let Some((lazy, sync)) = Runtime::with_watcher_mut(self.id, |n| {
            n.state = WatcherState::Dirty;
            (n.lazy, n.sync)
        }) else {
            return;
        };

        if lazy {
            return;
        }
        if sync {
            self.run();
        } else {
            scheduler::schedule(self);
        }
    }

    /// Scheduler job: re-evaluate, and invoke the callback if the value
    /// changed (or is a record/list, whose contents may have changed, or
    /// the watcher is deep).
    pub fn run(self) {
        if !self.is_active() {
            return;
        }

        let Some(value) = self.get() else {
            Runtime::with_watcher_mut(self.id, |n| n.state = WatcherState::Clean);
            return;
        };

        let changed = Runtime::with_watcher_mut(self.id, |n| {
            n.state = WatcherState::Clean;
            if same_value(&value, &n.value) && !value.is_structured() && !n.deep {
                return None;
            }
            let old = std::mem::replace(&mut n.value, value.clone());
            Some((old, n.callback.clone()))
        })
        .flatten();

        if let Some((old, Some(callback))) = changed {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(&value, &old)))
                .unwrap_or_else(|payload| Err(Error::from_panic(payload)));
            if let Err(err) = result {
                diagnostics::report_in(
                    DiagnosticKind::CallbackFailure,
                    format!("error in callback: {err}"),
                    self.context(),
                );
            }
        }
    }

    /// Recompute the value of a lazy watcher. On failure the watcher stays
    /// dirty so the next demand read retries.
    pub fn evaluate(self) {
        if let Some(value) = self.get() {
            self.store(value);
        }
    }

    fn store(self, value: Value) {
        let previous = Runtime::with_watcher_mut(self.id, |n| {
            n.state = WatcherState::Clean;
            std::mem::replace(&mut n.value, value)
        });
        drop(previous);
    }

    /// Record the active subscriber on every dep this watcher holds, so
    /// whoever reads a computed value inherits its dependencies.
    pub fn depend(self) {
        for dep in self.dependencies() {
            dep.depend();
        }
    }

    /// Run the `before` hook, if any.
    pub fn before(self) {
        let hook = Runtime::with_watcher(self.id, |n| n.before.clone()).flatten();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Unsubscribe from every dep and free the arena slot. Idempotent.
    pub fn teardown(self) {
        let Some(node) = Runtime::remove_watcher(self.id) else {
            return;
        };

        Runtime::remove_subscriber_from_all(
            node.deps.iter().chain(node.new_deps.iter()).copied(),
            self.id,
        );
        tracing::debug!(watcher = %node.label, uid = node.uid, "watcher torn down");
        drop(node);
    }

    fn context(self) -> String {
        Runtime::with_watcher(self.id, |n| {
            if n.user {
                format!("watcher \"{}\"", n.label)
            } else if n.lazy {
                format!("computed \"{}\"", n.label)
            } else {
                format!("internal watcher \"{}\"", n.label)
            }
        })
        .unwrap_or_else(|| "torn-down watcher".to_string())
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("uid", &self.uid())
            .field("state", &self.state())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{observe, Record};
    use std::cell::Cell;

    fn observed(pairs: &[(&str, Value)]) -> Record {
        let record = Record::from_pairs(pairs.iter().cloned());
        observe(&Value::Record(record.clone()), false);
        record
    }

    fn sync_options() -> WatcherOptions {
        WatcherOptions {
            sync: true,
            ..Default::default()
        }
    }

    #[test]
    fn eager_watcher_evaluates_on_creation() {
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let watcher = Watcher::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            Ok(Value::from(7))
        });

        assert_eq!(runs.get(), 1);
        assert_eq!(watcher.value(), Value::from(7));
        assert_eq!(watcher.state(), WatcherState::Clean);
        watcher.teardown();
    }

    #[test]
    fn lazy_watcher_starts_dirty_without_evaluating() {
        let watcher = Watcher::new_lazy(|| Ok(Value::from(1)));

        assert!(watcher.is_dirty());
        assert_eq!(watcher.evaluation_count(), 0);
        assert_eq!(watcher.value(), Value::Undefined);

        watcher.evaluate();
        assert!(!watcher.is_dirty());
        assert_eq!(watcher.value(), Value::from(1));
        watcher.teardown();
    }

    #[test]
    fn repeated_reads_subscribe_once() {
        let record = observed(&[("a", Value::from(1))]);
        let dep = record.property_dep("a").unwrap();

        let r = record.clone();
        let watcher = Watcher::new(move || {
            let a = r.get("a");
            let _ = r.get("a");
            let _ = r.get("a");
            Ok(a)
        });

        assert_eq!(dep.subscriber_count(), 1);
        assert_eq!(watcher.dependency_count(), 1);
        assert!(watcher.depends_on(dep));
        watcher.teardown();
    }

    #[test]
    fn conditional_dependencies_are_pruned() {
        let record = observed(&[
            ("flag", Value::from(true)),
            ("a", Value::from(1)),
            ("b", Value::from(2)),
        ]);
        let dep_a = record.property_dep("a").unwrap();
        let dep_b = record.property_dep("b").unwrap();

        let r = record.clone();
        let watcher = Watcher::new_lazy(move || {
            if r.get("flag").is_truthy() {
                Ok(r.get("a"))
            } else {
                Ok(r.get("b"))
            }
        });

        watcher.evaluate();
        assert!(dep_a.has_subscriber(watcher));
        assert!(!dep_b.has_subscriber(watcher));

        record.set("flag", false);
        assert!(watcher.is_dirty());
        watcher.evaluate();

        assert_eq!(watcher.value(), Value::from(2));
        assert!(!dep_a.has_subscriber(watcher));
        assert!(dep_b.has_subscriber(watcher));
        assert!(!watcher.depends_on(dep_a));
        watcher.teardown();
    }

    #[test]
    fn sync_watcher_runs_callback_with_new_and_old() {
        let record = observed(&[("count", Value::from(1))]);
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));

        let r = record.clone();
        let seen_clone = seen.clone();
        let watcher = Watcher::with_options(
            move || Ok(r.get("count")),
            Some(Rc::new(move |new: &Value, old: &Value| {
                seen_clone.borrow_mut().push((new.clone(), old.clone()));
                Ok(())
            })),
            sync_options(),
        );

        record.set("count", 2);
        record.set("count", 2);
        record.set("count", 3);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (Value::from(2), Value::from(1)));
        assert_eq!(seen[1], (Value::from(3), Value::from(2)));
        watcher.teardown();
    }

    #[test]
    fn teardown_stops_notifications_and_is_idempotent() {
        let record = observed(&[("a", Value::from(1))]);
        let dep = record.property_dep("a").unwrap();
        let runs = Rc::new(Cell::new(0));

        let r = record.clone();
        let runs_clone = runs.clone();
        let watcher = Watcher::with_options(
            move || {
                runs_clone.set(runs_clone.get() + 1);
                Ok(r.get("a"))
            },
            None,
            sync_options(),
        );
        assert_eq!(runs.get(), 1);

        watcher.teardown();
        assert_eq!(watcher.state(), WatcherState::TornDown);
        assert_eq!(dep.subscriber_count(), 0);

        record.set("a", 2);
        assert_eq!(runs.get(), 1);

        watcher.teardown();
        watcher.run();
        watcher.evaluate();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn failing_getter_is_reported_and_keeps_previous_value() {
        diagnostics::take();
        let record = observed(&[("fail", Value::from(false)), ("n", Value::from(1))]);

        let r = record.clone();
        let watcher = Watcher::with_options(
            move || {
                let n = r.get("n");
                if r.get("fail").is_truthy() {
                    return Err(Error::evaluation("refusing to compute"));
                }
                Ok(n)
            },
            None,
            WatcherOptions {
                sync: true,
                label: Some("total".into()),
                ..Default::default()
            },
        );
        assert_eq!(watcher.value(), Value::from(1));

        record.set("fail", true);
        assert_eq!(watcher.value(), Value::from(1));
        assert_eq!(watcher.state(), WatcherState::Clean);

        let reported = diagnostics::take();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].kind, DiagnosticKind::EvaluationFailure);
        assert!(reported[0].message.contains("refusing to compute"));
        assert_eq!(reported[0].context.as_deref(), Some("internal watcher \"total\""));

        // The graph still works after the failure.
        record.set("fail", false);
        record.set("n", 5);
        assert_eq!(watcher.value(), Value::from(5));
        watcher.teardown();
    }

    #[test]
    fn panicking_getter_is_caught() {
        diagnostics::take();
        let watcher = Watcher::new(|| panic!("getter exploded"));

        assert_eq!(watcher.value(), Value::Undefined);
        assert_eq!(ReactiveContext::depth(), 0);

        let reported = diagnostics::take();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].message.contains("getter exploded"));
        watcher.teardown();
    }

    #[test]
    fn lazy_failure_stays_dirty() {
        diagnostics::take();
        let watcher = Watcher::new_lazy(|| Err(Error::evaluation("nope")));

        watcher.evaluate();
        assert!(watcher.is_dirty());
        assert_eq!(diagnostics::take().len(), 1);
        watcher.teardown();
    }

    #[test]
    fn failing_callback_is_reported() {
        diagnostics::take();
        let record = observed(&[("a", Value::from(1))]);

        let r = record.clone();
        let watcher = Watcher::with_options(
            move || Ok(r.get("a")),
            Some(Rc::new(|_: &Value, _: &Value| {
                Err::<(), _>(Error::evaluation("handler broke"))
            })),
            WatcherOptions {
                sync: true,
                user: true,
                label: Some("a".into()),
                ..Default::default()
            },
        );

        record.set("a", 2);
        let reported = diagnostics::take();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].kind, DiagnosticKind::CallbackFailure);
        assert_eq!(reported[0].context.as_deref(), Some("watcher \"a\""));
        assert_eq!(watcher.value(), Value::from(2));
        watcher.teardown();
    }

    #[test]
    fn depend_forwards_dependencies_to_outer_watcher() {
        let record = observed(&[("a", Value::from(1)), ("b", Value::from(2))]);
        let dep_a = record.property_dep("a").unwrap();
        let dep_b = record.property_dep("b").unwrap();

        let r = record.clone();
        let inner = Watcher::new_lazy(move || {
            Ok(Value::from(r.get("a").as_f64().unwrap_or(0.0) + r.get("b").as_f64().unwrap_or(0.0)))
        });
        inner.evaluate();

        let outer = Watcher::new(move || {
            inner.depend();
            Ok(inner.value())
        });

        assert!(dep_a.has_subscriber(outer));
        assert!(dep_b.has_subscriber(outer));
        assert_eq!(outer.dependency_count(), 2);

        outer.teardown();
        inner.teardown();
    }

    #[test]
    fn deep_watcher_tracks_nested_properties() {
        let nested = Record::from_pairs([("leaf", Value::from(1))]);
        let record = observed(&[("inner", Value::Record(nested.clone()))]);
        let calls = Rc::new(Cell::new(0));

        let r = record.clone();
        let calls_clone = calls.clone();
        let watcher = Watcher::with_options(
            move || Ok(r.get("inner")),
            Some(Rc::new(move |_: &Value, _: &Value| {
                calls_clone.set(calls_clone.get() + 1);
                Ok(())
            })),
            WatcherOptions {
                sync: true,
                deep: true,
                user: true,
                ..Default::default()
            },
        );

        nested.set("leaf", 2);
        assert_eq!(calls.get(), 1);
        watcher.teardown();
    }
}
