//! Component State
//!
//! A [`State`] owns one reactive data tree together with the watchers
//! derived from it, the way a UI component does. It is initialised in a
//! fixed order:
//!
//! 1. **Props.** Values handed down by a parent, each a reactive property.
//!    Values from the parent are already observed upstream and are not
//!    observed again; defaults are.
//! 2. **Data.** A factory producing the root record, observed as root data.
//! 3. **Computed.** Lazy watchers read through [`State::get`].
//! 4. **Watch.** User watchers on dotted paths into the state.
//!
//! A render function attached with [`State::mount`] becomes the state's
//! eager render watcher. [`State::destroy`] tears everything down.
//!
//! Closures registered on a state receive `&State`. The runtime only keeps
//! weak references to it, so dropping the last handle also tears the
//! state down.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

mod options;

pub use options::{
    ComputedDef, DataFactory, PropDef, StateBuilder, StateGetter, StateHandler, StateSetter, WatchDef,
};

use crate::diagnostics::{self, DiagnosticKind};
use crate::error::{Error, Result};
use crate::observer::{
    self, define_reactive, observe, pause_observing, should_observe, toggle_observing, DefineOptions,
    Key, Record, Value,
};
use crate::reactive::{
    untrack, watch_labeled, Callback, Computed, Hook, Path, WatchHandle, WatchOptions, WatchSource,
    Watcher, WatcherOptions,
};

/// Attribute names a prop may not use.
const RESERVED_ATTRIBUTES: &[&str] = &["key", "ref", "slot", "slot-scope", "is"];

#[derive(Clone)]
enum ComputedEntry {
    Cached(Computed),
    Uncached {
        get: StateGetter,
        set: Option<StateSetter>,
    },
}

struct StateInner {
    name: String,
    root: bool,
    props: Record,
    prop_defs: IndexMap<String, PropDef>,
    data: RefCell<Record>,
    computed: RefCell<IndexMap<String, ComputedEntry>>,
    watchers: RefCell<Vec<Watcher>>,
    render: Cell<Option<Watcher>>,
    updating_props: Cell<bool>,
    destroyed: Cell<bool>,
}

#[derive(Clone)]
pub struct State(Rc<StateInner>);

impl State {
    pub fn builder(name: impl Into<String>) -> StateBuilder {
        StateBuilder::new(name)
    }

    pub(crate) fn from_builder(builder: StateBuilder) -> Self {
        let StateBuilder {
            name,
            root,
            props,
            props_data,
            data,
            computed,
            watch,
        } = builder;

        let state = Self(Rc::new(StateInner {
            name,
            root,
            props: Record::new(),
            prop_defs: props,
            data: RefCell::new(Record::new()),
            computed: RefCell::new(IndexMap::new()),
            watchers: RefCell::new(Vec::new()),
            render: Cell::new(None),
            updating_props: Cell::new(false),
            destroyed: Cell::new(false),
        }));

        state.init_props(&props_data);
        state.init_data(data);
        state.init_computed(computed);
        state.init_watch(watch);
        tracing::debug!(state = %state.0.name, root, "state initialised");
        state
    }

    fn init_props(&self, props_data: &IndexMap<String, Value>) {
        let _paused = (!self.0.root).then(pause_observing);

        for (key, def) in &self.0.prop_defs {
            let hyphenated = hyphenate(key);
            if RESERVED_ATTRIBUTES.contains(&hyphenated.as_str()) {
                diagnostics::report_in(
                    DiagnosticKind::ReservedKey,
                    format!("\"{hyphenated}\" is a reserved attribute and cannot be used as a prop"),
                    self.context(),
                );
            }

            let value = match props_data.get(key) {
                Some(value) if !value.is_undefined() => value.clone(),
                _ => self.prop_default(key, def),
            };
            define_reactive(
                &self.0.props,
                key,
                Some(value),
                DefineOptions {
                    custom_setter: Some(self.prop_guard(key)),
                    shallow: false,
                },
            );
        }
    }

    /// Reports direct writes to the props of a child state.
    fn prop_guard(&self, key: &str) -> Rc<dyn Fn(&Value)> {
        let weak = Rc::downgrade(&self.0);
        let key = key.to_string();
        Rc::new(move |_| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.root && !inner.updating_props.get() {
                diagnostics::report_in(
                    DiagnosticKind::PropMutation,
                    format!(
                        "avoid mutating a prop directly since the value will be overwritten \
                         whenever the parent updates; prop being mutated: \"{key}\""
                    ),
                    format!("state \"{}\"", inner.name),
                );
            }
        })
    }

    fn init_data(&self, factory: Option<DataFactory>) {
        let record = match factory {
            Some(factory) => self.run_data_factory(&factory),
            None => Record::new(),
        };

        for key in record.keys() {
            if self.has_prop(&key) {
                diagnostics::report_in(
                    DiagnosticKind::KeyConflict,
                    format!(
                        "the data property \"{key}\" is already declared as a prop, \
                         use a prop default value instead"
                    ),
                    self.context(),
                );
            }
        }

        observe(&Value::Record(record.clone()), true);
        *self.0.data.borrow_mut() = record;
    }

    fn run_data_factory(&self, factory: &DataFactory) -> Record {
        let result = untrack(|| {
            panic::catch_unwind(AssertUnwindSafe(|| factory(self)))
                .unwrap_or_else(|payload| Err(Error::from_panic(payload)))
        });

        match result {
            Ok(Value::Record(record)) => record,
            Ok(other) => {
                diagnostics::report_in(
                    DiagnosticKind::InvalidData,
                    format!("data functions should return a record, got {}", other.type_name()),
                    self.context(),
                );
                Record::new()
            }
            Err(err) => {
                diagnostics::report_in(
                    DiagnosticKind::EvaluationFailure,
                    format!("error in data(): {err}"),
                    self.context(),
                );
                Record::new()
            }
        }
    }

    fn init_computed(&self, computed: IndexMap<String, ComputedDef>) {
        for (key, def) in computed {
            let taken_by = if self.has_prop(&key) {
                Some("as a prop")
            } else if self.data().contains_key(&key) {
                Some("in data")
            } else {
                None
            };
            if let Some(taken_by) = taken_by {
                diagnostics::report_in(
                    DiagnosticKind::KeyConflict,
                    format!("the computed property \"{key}\" is already defined {taken_by}"),
                    self.context(),
                );
                continue;
            }

            let entry = if def.cache {
                ComputedEntry::Cached(self.cached_computed(&key, def))
            } else {
                ComputedEntry::Uncached {
                    get: def.get,
                    set: def.set,
                }
            };
            self.0.computed.borrow_mut().insert(key, entry);
        }
    }

    fn cached_computed(&self, key: &str, def: ComputedDef) -> Computed {
        let (weak, name) = (self.downgrade(), self.0.name.clone());
        let getter = def.get;
        let computed = Computed::labeled(
            move || {
                let state = upgrade(&weak, &name)?;
                getter(&state)
            },
            Some(key.to_string()),
        );

        match def.set {
            Some(setter) => {
                let weak = self.downgrade();
                computed.with_setter(move |value| {
                    if let Some(inner) = weak.upgrade() {
                        setter(&State(inner), value);
                    }
                })
            }
            None => computed,
        }
    }

    fn init_watch(&self, watch: IndexMap<String, Vec<WatchDef>>) {
        for (expression, defs) in watch {
            for def in defs {
                let (weak, name) = (self.downgrade(), self.0.name.clone());
                let handler = def.handler;
                let callback: Callback = Rc::new(move |new: &Value, old: &Value| {
                    let state = upgrade(&weak, &name)?;
                    handler(&state, new, old)
                });
                self.watch_expression(&expression, callback, def.options);
            }
        }
    }

    /// Watch a dotted path into this state (`"user.name"`); the first
    /// segment resolves like [`State::get`].
    pub fn watch<F>(&self, expression: &str, handler: F, options: WatchOptions) -> WatchHandle
    where
        F: Fn(&Value, &Value) -> Result<()> + 'static,
    {
        self.watch_expression(expression, Rc::new(handler), options)
    }

    /// Watch the value produced by `getter`.
    pub fn watch_getter<G, F>(&self, getter: G, handler: F, options: WatchOptions) -> WatchHandle
    where
        G: Fn(&State) -> Result<Value> + 'static,
        F: Fn(&Value, &Value) -> Result<()> + 'static,
    {
        let (weak, name) = (self.downgrade(), self.0.name.clone());
        let source = WatchSource::getter(move || {
            let state = upgrade(&weak, &name)?;
            getter(&state)
        });
        self.register(watch_labeled(source, Rc::new(handler), options, None, Some(self.context())))
    }

    fn watch_expression(&self, expression: &str, callback: Callback, options: WatchOptions) -> WatchHandle {
        let source = match Path::parse(expression) {
            Ok(path) => {
                let (weak, name) = (self.downgrade(), self.0.name.clone());
                WatchSource::getter(move || {
                    let state = upgrade(&weak, &name)?;
                    let first = path.segments().first().map(String::as_str).unwrap_or_default();
                    Ok(path.resolve_from(state.get(first), 1))
                })
            }
            // reported by the path source, which then watches nothing
            Err(_) => WatchSource::path(Value::Undefined, expression),
        };
        self.register(watch_labeled(
            source,
            callback,
            options,
            Some(expression.to_string()),
            Some(self.context()),
        ))
    }

    fn register(&self, handle: WatchHandle) -> WatchHandle {
        self.0.watchers.borrow_mut().push(handle.watcher());
        handle
    }

    /// Read `key` from props, then data, then computed properties.
    pub fn get(&self, key: &str) -> Value {
        if self.has_prop(key) {
            return self.0.props.get(key);
        }
        let data = self.data();
        if proxies_data_key(key) && data.contains_key(key) {
            return data.get(key);
        }

        let entry = self.0.computed.borrow().get(key).cloned();
        match entry {
            Some(ComputedEntry::Cached(computed)) => computed.get(),
            Some(ComputedEntry::Uncached { get, .. }) => match panic::catch_unwind(
                AssertUnwindSafe(|| get(self)),
            )
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)))
            {
                Ok(value) => value,
                Err(err) => {
                    diagnostics::report_in(
                        DiagnosticKind::EvaluationFailure,
                        format!("error in getter: {err}"),
                        format!("computed \"{key}\""),
                    );
                    Value::Undefined
                }
            },
            None => Value::Undefined,
        }
    }

    /// Write `key`, resolving it like [`State::get`]. A key the state does
    /// not declare is added to the root data, which is reported.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if self.has_prop(key) {
            self.0.props.set(key, value);
            return;
        }
        let data = self.data();
        if proxies_data_key(key) && data.contains_key(key) {
            data.set(key, value);
            return;
        }

        let entry = self.0.computed.borrow().get(key).cloned();
        match entry {
            Some(ComputedEntry::Cached(computed)) => computed.set(value),
            Some(ComputedEntry::Uncached { set: Some(set), .. }) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| set(self, value))) {
                    diagnostics::report_in(
                        DiagnosticKind::EvaluationFailure,
                        format!("error in setter: {}", Error::from_panic(payload)),
                        format!("computed \"{key}\""),
                    );
                }
            }
            Some(ComputedEntry::Uncached { set: None, .. }) => diagnostics::report_in(
                DiagnosticKind::ComputedWithoutSetter,
                format!("computed property \"{key}\" was assigned to but it has no setter"),
                self.context(),
            ),
            None => {
                observer::set(&Value::Record(data), key, value);
            }
        }
    }

    /// Reactive add or update on any target, see [`observer::set`].
    pub fn set_reactive(&self, target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
        observer::set(target, key, value)
    }

    /// Reactive delete on any target, see [`observer::del`].
    pub fn delete(&self, target: &Value, key: impl Into<Key>) {
        observer::del(target, key);
    }

    /// Apply new prop values from the parent. Missing or `Undefined`
    /// values fall back to the prop's default.
    pub fn update_props<I, K, V>(&self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let _paused = pause_observing();
        let _updating = PropUpdate::begin(&self.0.updating_props);
        for (key, value) in values {
            let key = key.into();
            let Some(def) = self.0.prop_defs.get(&key) else {
                tracing::trace!(state = %self.0.name, key, "ignoring undeclared prop");
                continue;
            };
            let value = value.into();
            let value = if value.is_undefined() {
                self.prop_default(&key, def)
            } else {
                value
            };
            self.0.props.set(&key, value);
        }
    }

    /// Attach `render` as the state's render watcher, replacing any
    /// previous one. `before` runs ahead of every scheduled re-render.
    pub fn mount<R>(&self, render: R, before: Option<Hook>) -> Watcher
    where
        R: Fn(&State) -> Result<()> + 'static,
    {
        if let Some(previous) = self.0.render.take() {
            previous.teardown();
        }

        let (weak, name) = (self.downgrade(), self.0.name.clone());
        let label = format!("{name} render");
        let watcher = Watcher::with_options(
            move || {
                let state = upgrade(&weak, &name)?;
                render(&state)?;
                Ok(Value::Undefined)
            },
            None,
            WatcherOptions {
                before,
                label: Some(label),
                ..Default::default()
            },
        );
        self.0.render.set(Some(watcher));
        watcher
    }

    /// Tear down every watcher the state owns. Idempotent.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        self.0.teardown();
        tracing::debug!(state = %self.0.name, "state destroyed");
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn is_root(&self) -> bool {
        self.0.root
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    pub fn props(&self) -> Record {
        self.0.props.clone()
    }

    pub fn data(&self) -> Record {
        self.0.data.borrow().clone()
    }

    pub fn has_prop(&self, key: &str) -> bool {
        self.0.prop_defs.contains_key(key)
    }

    /// The lazy watcher behind a cached computed property.
    pub fn computed_watcher(&self, key: &str) -> Option<Watcher> {
        match self.0.computed.borrow().get(key) {
            Some(ComputedEntry::Cached(computed)) => Some(computed.watcher()),
            _ => None,
        }
    }

    pub fn render_watcher(&self) -> Option<Watcher> {
        self.0.render.get()
    }

    /// User watchers created on this state, torn down ones included.
    pub fn watchers(&self) -> Vec<Watcher> {
        self.0.watchers.borrow().clone()
    }

    fn downgrade(&self) -> Weak<StateInner> {
        Rc::downgrade(&self.0)
    }

    fn prop_default(&self, key: &str, def: &PropDef) -> Value {
        default_prop_value(def).unwrap_or_else(|err| {
            diagnostics::report_in(
                DiagnosticKind::EvaluationFailure,
                format!("error in default value of prop \"{key}\": {err}"),
                self.context(),
            );
            Value::Undefined
        })
    }

    fn context(&self) -> String {
        format!("state \"{}\"", self.0.name)
    }
}

impl StateInner {
    fn teardown(&self) {
        if let Some(render) = self.render.take() {
            render.teardown();
        }
        let watchers = std::mem::take(&mut *self.watchers.borrow_mut());
        for watcher in watchers {
            watcher.teardown();
        }
        let computed = std::mem::take(&mut *self.computed.borrow_mut());
        for entry in computed.values() {
            if let ComputedEntry::Cached(computed) = entry {
                computed.teardown();
            }
        }
        drop(computed);

        let data = self.data.borrow().clone();
        if let Some(observer) = data.observer() {
            observer.release_root();
        }
    }
}

impl Drop for StateInner {
    fn drop(&mut self) {
        if !self.destroyed.replace(true) {
            self.teardown();
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.0.name)
            .field("root", &self.0.root)
            .field("props", &self.0.prop_defs.keys().collect::<Vec<_>>())
            .field("computed", &self.0.computed.borrow().keys().collect::<Vec<_>>())
            .field("destroyed", &self.0.destroyed.get())
            .finish()
    }
}

fn upgrade(weak: &Weak<StateInner>, name: &str) -> Result<State> {
    weak.upgrade()
        .map(State)
        .ok_or_else(|| Error::Destroyed(name.to_string()))
}

/// Marks a parent-driven prop update for as long as it is alive.
struct PropUpdate<'a>(&'a Cell<bool>);

impl<'a> PropUpdate<'a> {
    fn begin(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for PropUpdate<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Evaluate a prop default. Defaults are fresh values, so they are
/// observed even while observation is paused for parent values.
fn default_prop_value(def: &PropDef) -> Result<Value> {
    let value = match &def.default {
        Some(default) => panic::catch_unwind(AssertUnwindSafe(|| default()))
            .map_err(Error::from_panic)?,
        None => Value::Undefined,
    };
    let previous = should_observe();
    toggle_observing(true);
    observe(&value, false);
    toggle_observing(previous);
    Ok(value)
}

/// Keys starting with `_` or `$` stay on the data record only.
fn proxies_data_key(key: &str) -> bool {
    !key.starts_with('_') && !key.starts_with('$')
}

/// `slotScope` -> `slot-scope`
fn hyphenate(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 2);
    for (i, c) in key.char_indices() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
