//! Ordered lists.
//!
//! A list is a shared vector of values. Element reads record the list's
//! own observer dep, because list contents are not tracked per index: any
//! structural change notifies that single dep. Mutations dispatch through
//! the list's method table, which observation swaps for the intercepting
//! one (see [`array`](super::array)).

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::array::{ListMethods, NATIVE};
use super::value::Value;
use super::Observer;
use crate::reactive::ReactiveContext;

struct ListInner {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Rc<Observer>>>,
    methods: Cell<&'static dyn ListMethods>,
    extensible: Cell<bool>,
    raw: Cell<bool>,
}

#[derive(Clone)]
pub struct List(Rc<ListInner>);

impl List {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.track();
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, or `Undefined` past the end.
    pub fn get(&self, index: usize) -> Value {
        self.track();
        self.0.items.borrow().get(index).cloned().unwrap_or_default()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        self.peek_items()
    }

    /// Index write. Bypasses interception, so it is not observed; use
    /// [`set`](super::set) for a change that notifies.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let old = {
            let mut items = self.0.items.borrow_mut();
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            std::mem::replace(&mut items[index], value)
        };
        drop(old);
    }

    /// Append and return the new length.
    pub fn push(&self, item: impl Into<Value>) -> usize {
        self.methods().push(self, vec![item.into()])
    }

    pub fn push_many(&self, items: impl IntoIterator<Item = Value>) -> usize {
        self.methods().push(self, items.into_iter().collect())
    }

    pub fn pop(&self) -> Value {
        self.methods().pop(self)
    }

    pub fn shift(&self) -> Value {
        self.methods().shift(self)
    }

    /// Prepend and return the new length.
    pub fn unshift(&self, item: impl Into<Value>) -> usize {
        self.methods().unshift(self, vec![item.into()])
    }

    pub fn unshift_many(&self, items: impl IntoIterator<Item = Value>) -> usize {
        self.methods().unshift(self, items.into_iter().collect())
    }

    /// Remove `delete_count` items at `start` and insert `items` there.
    /// Both bounds are clamped to the list. Returns the removed items.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        self.methods()
            .splice(self, start, delete_count, items.into_iter().collect())
    }

    /// Stable sort with the default ordering: `Undefined` last, everything
    /// else by string form.
    pub fn sort(&self) {
        self.methods().sort(self, &Value::default_order);
    }

    pub fn sort_by(&self, compare: impl Fn(&Value, &Value) -> Ordering) {
        self.methods().sort(self, &compare);
    }

    pub fn reverse(&self) {
        self.methods().reverse(self);
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.borrow().clone()
    }

    /// Whether mutations go through the notifying method table.
    pub fn is_intercepted(&self) -> bool {
        self.methods().intercepts()
    }

    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    pub fn mark_raw(&self) {
        self.0.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }

    /// Untracked snapshot of the items.
    pub(crate) fn peek_items(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    pub(crate) fn items(&self) -> &RefCell<Vec<Value>> {
        &self.0.items
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>, methods: &'static dyn ListMethods) {
        *self.0.observer.borrow_mut() = Some(observer);
        self.0.methods.set(methods);
    }

    fn methods(&self) -> &'static dyn ListMethods {
        self.0.methods.get()
    }

    fn track(&self) {
        if ReactiveContext::is_active() {
            if let Some(observer) = self.observer() {
                observer.dep().depend();
            }
        }
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for List {
    fn from(items: Vec<Value>) -> Self {
        Self(Rc::new(ListInner {
            items: RefCell::new(items),
            observer: RefCell::new(None),
            methods: Cell::new(&NATIVE),
            extensible: Cell::new(true),
            raw: Cell::new(false),
        }))
    }
}

impl<V: Into<Value>> FromIterator<V> for List {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from(iter.into_iter().map(Into::into).collect::<Vec<_>>())
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for item in self.peek_items() {
            match item {
                Value::Record(_) => list.entry(&format_args!("Record {{ .. }}")),
                Value::List(_) => list.entry(&format_args!("List [ .. ]")),
                other => list.entry(&other),
            };
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(items: &[i32]) -> List {
        items.iter().copied().collect()
    }

    fn as_numbers(list: &List) -> Vec<f64> {
        list.to_vec().iter().filter_map(Value::as_f64).collect()
    }

    #[test]
    fn unobserved_mutators_behave_like_vec() {
        let list = numbers(&[1, 2, 3]);
        assert!(!list.is_intercepted());

        assert_eq!(list.push(4), 4);
        assert_eq!(list.pop(), Value::from(4));
        assert_eq!(list.shift(), Value::from(1));
        assert_eq!(list.unshift_many([Value::from(0), Value::from(1)]), 4);
        assert_eq!(as_numbers(&list), [0.0, 1.0, 2.0, 3.0]);

        list.reverse();
        assert_eq!(as_numbers(&list), [3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn splice_clamps_bounds() {
        let list = numbers(&[1, 2, 3]);

        let removed = list.splice(1, 10, [Value::from(9)]);
        assert_eq!(removed, vec![Value::from(2), Value::from(3)]);
        assert_eq!(as_numbers(&list), [1.0, 9.0]);

        assert!(list.splice(7, 1, [Value::from(5)]).is_empty());
        assert_eq!(as_numbers(&list), [1.0, 9.0, 5.0]);
    }

    #[test]
    fn empty_list_pops_undefined() {
        let list = List::new();
        assert_eq!(list.pop(), Value::Undefined);
        assert_eq!(list.shift(), Value::Undefined);
        assert_eq!(list.get(3), Value::Undefined);
    }

    #[test]
    fn default_sort_orders_by_string_form() {
        let list = List::from(vec![
            Value::from(10),
            Value::Undefined,
            Value::from(2),
            Value::from(1),
        ]);
        list.sort();
        assert_eq!(
            list.to_vec(),
            vec![Value::from(1), Value::from(10), Value::from(2), Value::Undefined]
        );

        list.sort_by(|a, b| {
            let (a, b) = (a.as_f64().unwrap_or(f64::MAX), b.as_f64().unwrap_or(f64::MAX));
            a.total_cmp(&b)
        });
        assert_eq!(
            list.to_vec(),
            vec![Value::from(1), Value::from(2), Value::from(10), Value::Undefined]
        );
    }

    #[test]
    fn set_index_pads_with_undefined() {
        let list = numbers(&[1]);
        list.set_index(3, 4);
        assert_eq!(
            list.to_vec(),
            vec![Value::from(1), Value::Undefined, Value::Undefined, Value::from(4)]
        );
    }
}
