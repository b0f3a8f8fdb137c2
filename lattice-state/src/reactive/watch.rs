//! Explicit Watches
//!
//! A watch pairs a source with a callback that runs whenever the source's
//! value changes. The source is either a getter closure or a dotted
//! property path (`"user.address.city"`) resolved against a root value.
//!
//! # Differences from Computed
//!
//! - Watches are eager: a change schedules the watcher; computed values
//!   wait for the next read.
//! - Watches exist for the callback; computed values exist for the value.
//!
//! ```rust,ignore
//! let handle = watch(
//!     WatchSource::path(Value::Record(data.clone()), "user.name"),
//!     |new, old| { println!("{old:?} -> {new:?}"); Ok(()) },
//!     WatchOptions::default(),
//! );
//! handle.unwatch();
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use super::watcher::{Callback, Getter, Watcher, WatcherOptions};
use crate::diagnostics::{self, DiagnosticKind};
use crate::error::{Error, Result};
use crate::observer::Value;

/// A parsed property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// Parse a dotted path. Only ASCII word characters, `$` and `.` are
    /// allowed.
    pub fn parse(expression: &str) -> Result<Self> {
        let valid = expression
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.');
        if !valid {
            return Err(Error::InvalidPath(expression.to_string()));
        }
        Ok(Self {
            segments: expression.split('.').map(str::to_string).collect(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk the path from `root`, reading each segment reactively. Yields
    /// `Undefined` as soon as a step has nothing to descend into.
    pub fn resolve(&self, root: &Value) -> Value {
        self.resolve_from(root.clone(), 0)
    }

    /// Walk the segments starting at `start` from an already resolved value.
    pub(crate) fn resolve_from(&self, mut current: Value, start: usize) -> Value {
        for segment in &self.segments[start..] {
            if !current.is_structured() {
                return Value::Undefined;
            }
            current = current.read_key(segment);
        }
        current
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// What a watch observes.
#[derive(Clone)]
pub enum WatchSource {
    Getter(Getter),
    Path { root: Value, expression: String },
}

impl WatchSource {
    pub fn getter<G>(getter: G) -> Self
    where
        G: Fn() -> Result<Value> + 'static,
    {
        Self::Getter(Rc::new(getter))
    }

    pub fn path(root: Value, expression: impl Into<String>) -> Self {
        Self::Path {
            root,
            expression: expression.into(),
        }
    }

    fn into_getter(self) -> (Getter, String) {
        match self {
            Self::Getter(getter) => (getter, "getter".to_string()),
            Self::Path { root, expression } => {
                let getter: Getter = match Path::parse(&expression) {
                    Ok(path) => Rc::new(move || Ok(path.resolve(&root))),
                    Err(err) => {
                        diagnostics::report(
                            DiagnosticKind::InvalidWatchPath,
                            format!("failed watching path \"{expression}\": {err}"),
                        );
                        Rc::new(|| Ok(Value::Undefined))
                    }
                };
                (getter, expression)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub deep: bool,
    /// Invoke the callback once right away with `Undefined` as the old value.
    pub immediate: bool,
    pub sync: bool,
}

/// Returned by [`watch`]; [`WatchHandle::unwatch`] stops the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchHandle {
    watcher: Watcher,
}

impl WatchHandle {
    pub fn watcher(&self) -> Watcher {
        self.watcher
    }

    pub fn unwatch(&self) {
        self.watcher.teardown();
    }
}

/// Create a user watcher over `source`.
pub fn watch<F>(source: WatchSource, callback: F, options: WatchOptions) -> WatchHandle
where
    F: Fn(&Value, &Value) -> Result<()> + 'static,
{
    watch_labeled(source, Rc::new(callback), options, None, None)
}

/// [`watch`] with an explicit watcher label and a diagnostics context.
pub(crate) fn watch_labeled(
    source: WatchSource,
    callback: Callback,
    options: WatchOptions,
    label: Option<String>,
    context: Option<String>,
) -> WatchHandle {
    let (getter, source_label) = source.into_getter();
    let expression = label.unwrap_or(source_label);
    let watcher = Watcher::with_options(
        move || getter(),
        Some(callback.clone()),
        WatcherOptions {
            user: true,
            deep: options.deep,
            sync: options.sync,
            label: Some(expression.clone()),
            ..Default::default()
        },
    );

    if options.immediate {
        let value = watcher.value();
        let result = panic::catch_unwind(AssertUnwindSafe(|| callback(&value, &Value::Undefined)))
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)));
        if let Err(err) = result {
            let message = format!("error in callback for immediate watcher \"{expression}\": {err}");
            match context {
                Some(context) => diagnostics::report_in(DiagnosticKind::CallbackFailure, message, context),
                None => diagnostics::report(DiagnosticKind::CallbackFailure, message),
            }
        }
    }

    WatchHandle { watcher }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{observe, Record};
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<(Value, Value)>>>;

    fn logger() -> (Log, impl Fn(&Value, &Value) -> Result<()>) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        (log, move |new: &Value, old: &Value| {
            log_clone.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        })
    }

    fn nested_state() -> Record {
        let address = Record::from_pairs([("city", "Oslo")]);
        let user = Record::from_pairs([("address", Value::Record(address))]);
        let root = Record::from_pairs([("user", Value::Record(user))]);
        observe(&Value::Record(root.clone()), true);
        root
    }

    #[test]
    fn paths_parse_and_reject_expressions() {
        let path = Path::parse("user.address.city").unwrap();
        assert_eq!(path.segments(), ["user", "address", "city"]);
        assert_eq!(path.to_string(), "user.address.city");

        assert!(Path::parse("$data._private").is_ok());
        assert!(matches!(Path::parse("a + b"), Err(Error::InvalidPath(_))));
        assert!(matches!(Path::parse("items[0]"), Err(Error::InvalidPath(_))));
        assert!(matches!(Path::parse("café.prix"), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn path_resolution_stops_at_primitives() {
        let root = Value::Record(nested_state());
        assert_eq!(Path::parse("user.address.city").unwrap().resolve(&root), Value::from("Oslo"));
        assert_eq!(Path::parse("user.address.city.x").unwrap().resolve(&root), Value::Undefined);
        assert_eq!(Path::parse("missing.deeper").unwrap().resolve(&root), Value::Undefined);
    }

    #[test]
    fn path_watch_fires_on_nested_change() {
        let root = nested_state();
        let (log, callback) = logger();
        let handle = watch(
            WatchSource::path(Value::Record(root.clone()), "user.address.city"),
            callback,
            WatchOptions {
                sync: true,
                ..Default::default()
            },
        );

        let address = root.get("user").read_key("address");
        address.as_record().unwrap().set("city", "Bergen");

        assert_eq!(
            log.borrow().as_slice(),
            &[(Value::from("Bergen"), Value::from("Oslo"))]
        );
        handle.unwatch();
    }

    #[test]
    fn replacing_an_intermediate_object_fires() {
        let root = nested_state();
        let (log, callback) = logger();
        let handle = watch(
            WatchSource::path(Value::Record(root.clone()), "user.address.city"),
            callback,
            WatchOptions {
                sync: true,
                ..Default::default()
            },
        );

        let user = root.get("user");
        let fresh = Record::from_pairs([("city", "Tromsø")]);
        user.as_record().unwrap().set("address", Value::Record(fresh));

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].0, Value::from("Tromsø"));
        handle.unwatch();
    }

    #[test]
    fn immediate_invokes_callback_once() {
        let root = nested_state();
        let (log, callback) = logger();
        let handle = watch(
            WatchSource::path(Value::Record(root), "user.address.city"),
            callback,
            WatchOptions {
                immediate: true,
                ..Default::default()
            },
        );

        assert_eq!(
            log.borrow().as_slice(),
            &[(Value::from("Oslo"), Value::Undefined)]
        );
        handle.unwatch();
    }

    #[test]
    fn invalid_path_warns_and_watches_nothing() {
        diagnostics::take();
        let (log, callback) = logger();
        let handle = watch(
            WatchSource::path(Value::Record(nested_state()), "user.name()"),
            callback,
            WatchOptions::default(),
        );

        let reported = diagnostics::take();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].kind, DiagnosticKind::InvalidWatchPath);
        assert_eq!(handle.watcher().value(), Value::Undefined);
        assert_eq!(handle.watcher().dependency_count(), 0);
        assert!(log.borrow().is_empty());
        handle.unwatch();
    }

    #[test]
    fn unwatch_stops_callbacks() {
        let root = nested_state();
        let (log, callback) = logger();
        let handle = watch(
            WatchSource::getter({
                let root = root.clone();
                move || Ok(root.get("user"))
            }),
            callback,
            WatchOptions {
                sync: true,
                ..Default::default()
            },
        );

        handle.unwatch();
        root.set("user", Value::Null);
        assert!(log.borrow().is_empty());
        assert!(!handle.watcher().is_active());
    }
}
