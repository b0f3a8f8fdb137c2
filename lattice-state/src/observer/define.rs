//! Reactive property installation.
//!
//! [`define_reactive`] replaces one property slot of a record with a
//! [`ReactiveProperty`]: a cell that owns a dep, tracks reads, notifies on
//! changed writes, and keeps the nested value observed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::array::depend_array;
use super::record::{AccessorGet, AccessorSet, Record, Slot};
use super::value::{same_value, Value};
use super::{observe, Observer};
use crate::reactive::{untrack, Dep, DepId, ReactiveContext};

/// Options for [`define_reactive`].
#[derive(Clone, Default)]
pub struct DefineOptions {
    /// Runs before every accepted write, with the incoming value.
    pub custom_setter: Option<Rc<dyn Fn(&Value)>>,
    /// Do not observe the stored value.
    pub shallow: bool,
}

impl fmt::Debug for DefineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefineOptions")
            .field("custom_setter", &self.custom_setter.is_some())
            .field("shallow", &self.shallow)
            .finish()
    }
}

pub(crate) struct ReactiveProperty {
    dep: Dep,
    value: RefCell<Value>,
    getter: Option<AccessorGet>,
    setter: Option<AccessorSet>,
    child: RefCell<Option<Rc<Observer>>>,
    custom_setter: Option<Rc<dyn Fn(&Value)>>,
    shallow: bool,
}

impl ReactiveProperty {
    pub(crate) fn dep(&self) -> DepId {
        self.dep.id()
    }

    pub(crate) fn get(&self) -> Value {
        let value = match &self.getter {
            Some(getter) => getter(),
            None => self.value.borrow().clone(),
        };

        if ReactiveContext::is_active() {
            self.dep.depend();
            let child = self.child.borrow().clone();
            if let Some(child) = child {
                child.dep().depend();
                if let Value::List(list) = &value {
                    depend_array(list);
                }
            }
        }
        value
    }

    pub(crate) fn set(&self, new: Value) {
        let current = match &self.getter {
            Some(getter) => untrack(|| getter()),
            None => self.value.borrow().clone(),
        };
        if same_value(&new, &current) {
            return;
        }

        if let Some(custom_setter) = &self.custom_setter {
            custom_setter(&new);
        }

        // accessor without a setter: read-only
        if self.getter.is_some() && self.setter.is_none() {
            return;
        }

        match &self.setter {
            Some(setter) => setter(new.clone()),
            None => {
                let old = self.value.replace(new.clone());
                drop(old);
            }
        }

        let child = if self.shallow {
            None
        } else {
            observe(&new, false)
        };
        let old_child = self.child.replace(child);
        drop(old_child);

        self.dep.notify();
    }
}

/// Install a reactive property `key` on `record`.
///
/// With `initial` the property starts with that value; otherwise it keeps
/// the current one. A pre-existing accessor pair is preserved and wrapped.
/// Non-configurable properties are left alone, as are new keys on a
/// record that cannot grow.
pub fn define_reactive(record: &Record, key: &str, initial: Option<Value>, options: DefineOptions) {
    let existing = record.property(key);
    match &existing {
        Some(property) if !property.configurable => {
            tracing::trace!(key, "skipping non-configurable property");
            return;
        }
        None if !record.is_extensible() => return,
        _ => {}
    }

    let (getter, setter, current) = match existing.map(|p| p.slot) {
        Some(Slot::Data(value)) => (None, None, value),
        Some(Slot::Accessor { get, set }) => (get, set, Value::Undefined),
        Some(Slot::Reactive(cell)) => {
            let (g, s) = (cell.clone(), cell);
            let get: AccessorGet = Rc::new(move || g.get());
            let set: AccessorSet = Rc::new(move |value| s.set(value));
            (Some(get), Some(set), Value::Undefined)
        }
        None => (None, None, Value::Undefined),
    };

    let value = match initial {
        Some(value) => value,
        // a getter with no setter is never read at definition time
        None => match (&getter, &setter) {
            (Some(get), Some(_)) => untrack(|| get()),
            (Some(_), None) => Value::Undefined,
            _ => current,
        },
    };

    let child = if options.shallow {
        None
    } else {
        observe(&value, false)
    };

    let property = ReactiveProperty {
        dep: Dep::new(),
        value: RefCell::new(value),
        getter,
        setter,
        child: RefCell::new(child),
        custom_setter: options.custom_setter,
        shallow: options.shallow,
    };
    record.install(key, Slot::Reactive(Rc::new(property)));
}
