//! Keyed records.
//!
//! A record is a shared, ordered map of properties. Each property slot is
//! either plain data, a user accessor pair, or a reactive cell installed by
//! [`define_reactive`](super::define_reactive). Reads and writes go through
//! the slot, so a reactive slot tracks and notifies while plain data does
//! neither.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::define::ReactiveProperty;
use super::value::Value;
use super::Observer;
use crate::reactive::{untrack, DepId};

pub type AccessorGet = Rc<dyn Fn() -> Value>;
pub type AccessorSet = Rc<dyn Fn(Value)>;

#[derive(Clone)]
pub(crate) enum Slot {
    Data(Value),
    Accessor {
        get: Option<AccessorGet>,
        set: Option<AccessorSet>,
    },
    Reactive(Rc<ReactiveProperty>),
}

#[derive(Clone)]
pub(crate) struct Property {
    pub(crate) slot: Slot,
    pub(crate) configurable: bool,
    pub(crate) writable: bool,
}

impl Property {
    fn data(value: Value) -> Self {
        Self {
            slot: Slot::Data(value),
            configurable: true,
            writable: true,
        }
    }
}

struct RecordInner {
    props: RefCell<IndexMap<String, Property>>,
    observer: RefCell<Option<Rc<Observer>>>,
    extensible: Cell<bool>,
    frozen: Cell<bool>,
    raw: Cell<bool>,
}

#[derive(Clone)]
pub struct Record(Rc<RecordInner>);

impl Record {
    pub fn new() -> Self {
        Self(Rc::new(RecordInner {
            props: RefCell::new(IndexMap::new()),
            observer: RefCell::new(None),
            extensible: Cell::new(true),
            frozen: Cell::new(false),
            raw: Cell::new(false),
        }))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let record = Self::new();
        {
            let mut props = record.0.props.borrow_mut();
            for (key, value) in pairs {
                props.insert(key.into(), Property::data(value.into()));
            }
        }
        record
    }

    /// Read a property. Missing keys read as `Undefined`.
    pub fn get(&self, key: &str) -> Value {
        match self.slot(key) {
            None => Value::Undefined,
            Some(Slot::Data(value)) => value,
            Some(Slot::Accessor { get, .. }) => get.map(|get| get()).unwrap_or_default(),
            Some(Slot::Reactive(cell)) => cell.get(),
        }
    }

    /// Read without recording a dependency.
    pub fn peek(&self, key: &str) -> Value {
        untrack(|| self.get(key))
    }

    /// Write a property. An unknown key becomes a plain property, unless
    /// the record is not extensible. Writes to read-only properties are
    /// ignored.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let existing = self.0.props.borrow().get(key).map(|p| (p.slot.clone(), p.writable));
        match existing {
            None => {
                if self.is_extensible() {
                    self.0
                        .props
                        .borrow_mut()
                        .insert(key.to_string(), Property::data(value));
                }
            }
            Some((Slot::Data(_), writable)) => {
                if writable {
                    let old = self
                        .0
                        .props
                        .borrow_mut()
                        .get_mut(key)
                        .map(|p| std::mem::replace(&mut p.slot, Slot::Data(value)));
                    drop(old);
                }
            }
            Some((Slot::Accessor { set, .. }, _)) => {
                if let Some(set) = set {
                    set(value);
                }
            }
            Some((Slot::Reactive(cell), _)) => cell.set(value),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.props.borrow().keys().cloned().collect()
    }

    /// Untracked `(key, value)` snapshot in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        untrack(|| {
            self.keys()
                .into_iter()
                .map(|key| {
                    let value = self.get(&key);
                    (key, value)
                })
                .collect()
        })
    }

    pub fn len(&self) -> usize {
        self.0.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete a property. Returns `false` if it is missing or not
    /// configurable.
    pub fn remove(&self, key: &str) -> bool {
        let removed = {
            let mut props = self.0.props.borrow_mut();
            match props.get(key) {
                Some(p) if p.configurable => props.shift_remove(key),
                _ => None,
            }
        };
        removed.is_some()
    }

    /// Define (or redefine) a plain data property.
    pub fn define_value(&self, key: &str, value: impl Into<Value>, configurable: bool) -> bool {
        self.define(
            key,
            Property {
                slot: Slot::Data(value.into()),
                configurable,
                writable: true,
            },
        )
    }

    /// Define (or redefine) a property backed by user accessors. A missing
    /// getter reads `Undefined`; a missing setter makes the property read-only.
    pub fn define_accessor(
        &self,
        key: &str,
        get: Option<AccessorGet>,
        set: Option<AccessorSet>,
        configurable: bool,
    ) -> bool {
        self.define(
            key,
            Property {
                slot: Slot::Accessor { get, set },
                configurable,
                writable: true,
            },
        )
    }

    fn define(&self, key: &str, property: Property) -> bool {
        let previous = {
            let mut props = self.0.props.borrow_mut();
            match props.get_mut(key) {
                Some(existing) if !existing.configurable => return false,
                Some(existing) => Some(std::mem::replace(existing, property)),
                None if !self.0.extensible.get() => return false,
                None => props.insert(key.to_string(), property),
            }
        };
        drop(previous);
        true
    }

    pub(crate) fn property(&self, key: &str) -> Option<Property> {
        self.0.props.borrow().get(key).cloned()
    }

    fn slot(&self, key: &str) -> Option<Slot> {
        self.0.props.borrow().get(key).map(|p| p.slot.clone())
    }

    /// Replace a slot in place, keeping the key's position.
    pub(crate) fn install(&self, key: &str, slot: Slot) -> bool {
        self.define(
            key,
            Property {
                slot,
                configurable: true,
                writable: true,
            },
        )
    }

    /// Whether `key` is backed by a reactive cell.
    pub fn is_reactive(&self, key: &str) -> bool {
        matches!(self.slot(key), Some(Slot::Reactive(_)))
    }

    /// The dep of a reactive property.
    pub fn property_dep(&self, key: &str) -> Option<DepId> {
        match self.slot(key) {
            Some(Slot::Reactive(cell)) => Some(cell.dep()),
            _ => None,
        }
    }

    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    /// Make every property read-only and non-configurable and stop the
    /// record from growing. Frozen records are never observed.
    pub fn freeze(&self) {
        self.prevent_extensions();
        self.0.frozen.set(true);
        for property in self.0.props.borrow_mut().values_mut() {
            property.configurable = false;
            property.writable = false;
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    /// Exclude this record from observation.
    pub fn mark_raw(&self) {
        self.0.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.0.observer.borrow_mut() = Some(observer);
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl fmt::Debug for Record {
    /// Shallow: nested containers print as a marker, which keeps cyclic
    /// records printable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in self.entries() {
            match value {
                Value::Record(_) => map.entry(&key, &format_args!("Record {{ .. }}")),
                Value::List(_) => map.entry(&key, &format_args!("List [ .. ]")),
                other => map.entry(&key, &other),
            };
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn unknown_keys_become_plain_properties() {
        let record = Record::new();
        record.set("a", 1);

        assert_eq!(record.get("a"), Value::from(1));
        assert_eq!(record.get("missing"), Value::Undefined);
        assert!(!record.is_reactive("a"));
        assert!(record.property_dep("a").is_none());
    }

    #[test]
    fn keys_keep_insertion_order_across_removal() {
        let record = Record::from_pairs([("c", 1), ("a", 2), ("b", 3)]);
        assert!(record.remove("a"));
        assert!(!record.remove("a"));
        record.set("a", 4);

        assert_eq!(record.keys(), ["c", "b", "a"]);
    }

    #[test]
    fn accessors_route_reads_and_writes() {
        let stored = Rc::new(Cell::new(1.0));
        let record = Record::new();
        let (g, s) = (stored.clone(), stored.clone());
        record.define_accessor(
            "x",
            Some(Rc::new(move || Value::from(g.get()))),
            Some(Rc::new(move |v: Value| s.set(v.as_f64().unwrap_or(0.0)))),
            true,
        );

        record.set("x", 7);
        assert_eq!(stored.get(), 7.0);
        assert_eq!(record.get("x"), Value::from(7));
    }

    #[test]
    fn getter_only_accessor_is_read_only() {
        let record = Record::new();
        record.define_accessor("x", Some(Rc::new(|| Value::from(1))), None, true);
        record.set("x", 2);
        assert_eq!(record.get("x"), Value::from(1));
    }

    #[test]
    fn frozen_records_reject_writes_and_growth() {
        let record = Record::from_pairs([("a", 1)]);
        record.freeze();

        record.set("a", 2);
        record.set("b", 3);
        assert_eq!(record.get("a"), Value::from(1));
        assert!(!record.contains_key("b"));
        assert!(!record.remove("a"));
        assert!(!record.define_value("a", 5, true));
    }

    #[test]
    fn non_extensible_records_still_update_existing_keys() {
        let record = Record::from_pairs([("a", 1)]);
        record.prevent_extensions();

        record.set("a", 2);
        record.set("b", 3);
        assert_eq!(record.get("a"), Value::from(2));
        assert!(!record.contains_key("b"));
    }

    #[test]
    fn non_configurable_properties_cannot_be_redefined() {
        let record = Record::new();
        assert!(record.define_value("fixed", 1, false));
        assert!(!record.define_value("fixed", 2, true));
        assert!(!record.remove("fixed"));
        assert_eq!(record.get("fixed"), Value::from(1));
    }

    #[test]
    fn debug_output_survives_cycles() {
        let record = Record::from_pairs([("n", 1)]);
        record.set("me", record.clone());

        let printed = format!("{record:?}");
        assert!(printed.contains("\"n\": Number(1)"));
        assert!(printed.contains("Record { .. }"));
        record.remove("me");
    }
}
