//! Computed Values
//!
//! A computed value is a lazy watcher read on demand:
//!
//! 1. While clean, reading returns the cached value.
//!
//! 2. When a dependency changes, the watcher only flips to dirty. Nothing
//!    is recomputed until somebody reads it again.
//!
//! 3. A read from inside another watcher forwards the computed value's
//!    dependencies to that watcher, so the outer watcher is notified by
//!    the underlying properties directly.
//!
//! ```rust,ignore
//! let sum = Computed::new(move || Ok(Value::from(a() + b())));
//! assert_eq!(sum.get(), Value::from(3));
//! ```

use std::fmt;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::watcher::{Watcher, WatcherOptions};
use crate::diagnostics::{self, DiagnosticKind};
use crate::error::Result;
use crate::observer::Value;

pub type Setter = Rc<dyn Fn(Value)>;

#[derive(Clone)]
pub struct Computed {
    watcher: Watcher,
    setter: Option<Setter>,
}

impl Computed {
    pub fn new<G>(getter: G) -> Self
    where
        G: Fn() -> Result<Value> + 'static,
    {
        Self::labeled(getter, None)
    }

    /// Create a computed value with a name used in diagnostics.
    pub fn labeled<G>(getter: G, label: Option<String>) -> Self
    where
        G: Fn() -> Result<Value> + 'static,
    {
        let watcher = Watcher::with_options(
            getter,
            None,
            WatcherOptions {
                lazy: true,
                label,
                ..Default::default()
            },
        );
        Self {
            watcher,
            setter: None,
        }
    }

    /// Attach a setter that receives assigned values.
    pub fn with_setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(Value) + 'static,
    {
        self.setter = Some(Rc::new(setter));
        self
    }

    /// Read the value, recomputing first if a dependency changed.
    pub fn get(&self) -> Value {
        if self.watcher.is_dirty() {
            self.watcher.evaluate();
        }
        if ReactiveContext::is_active() {
            self.watcher.depend();
        }
        self.watcher.value()
    }

    /// Assign through the setter. Without one the assignment is reported
    /// and ignored.
    pub fn set(&self, value: Value) {
        match &self.setter {
            Some(setter) => setter(value),
            None => {
                let label = self.watcher.label().unwrap_or_default();
                diagnostics::report(
                    DiagnosticKind::ComputedWithoutSetter,
                    format!("computed property \"{label}\" was assigned to but it has no setter"),
                );
            }
        }
    }

    pub fn watcher(&self) -> Watcher {
        self.watcher
    }

    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    pub fn teardown(&self) {
        self.watcher.teardown();
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("watcher", &self.watcher)
            .field("has_setter", &self.setter.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
