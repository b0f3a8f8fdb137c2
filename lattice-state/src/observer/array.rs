//! Mutating-collection interception.
//!
//! Every list carries a method table for its seven mutators. Fresh lists
//! use [`Native`], which only edits the vector. Observing a list swaps in
//! [`Intercepted`], which runs the native operation, observes any inserted
//! items, and then notifies the list's observer dep.

use std::cmp::Ordering;

use super::list::List;
use super::observe;
use super::value::Value;

pub(crate) trait ListMethods {
    fn push(&self, list: &List, items: Vec<Value>) -> usize;
    fn pop(&self, list: &List) -> Value;
    fn shift(&self, list: &List) -> Value;
    fn unshift(&self, list: &List, items: Vec<Value>) -> usize;
    fn splice(&self, list: &List, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value>;
    fn sort(&self, list: &List, compare: &dyn Fn(&Value, &Value) -> Ordering);
    fn reverse(&self, list: &List);
    fn intercepts(&self) -> bool;
}

pub(crate) struct Native;
pub(crate) struct Intercepted;

pub(crate) static NATIVE: Native = Native;
pub(crate) static INTERCEPTED: Intercepted = Intercepted;

impl ListMethods for Native {
    fn push(&self, list: &List, items: Vec<Value>) -> usize {
        let mut vec = list.items().borrow_mut();
        vec.extend(items);
        vec.len()
    }

    fn pop(&self, list: &List) -> Value {
        let popped = list.items().borrow_mut().pop();
        popped.unwrap_or_default()
    }

    fn shift(&self, list: &List) -> Value {
        let mut vec = list.items().borrow_mut();
        if vec.is_empty() {
            Value::Undefined
        } else {
            vec.remove(0)
        }
    }

    fn unshift(&self, list: &List, items: Vec<Value>) -> usize {
        let mut vec = list.items().borrow_mut();
        vec.splice(0..0, items);
        vec.len()
    }

    fn splice(&self, list: &List, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let mut vec = list.items().borrow_mut();
        let start = start.min(vec.len());
        let end = start.saturating_add(delete_count).min(vec.len());
        vec.splice(start..end, items).collect()
    }

    fn sort(&self, list: &List, compare: &dyn Fn(&Value, &Value) -> Ordering) {
        // the comparator is user code: the cell stays unborrowed and keeps
        // its items until the sorted copy is complete
        let mut sorted = list.items().borrow().clone();
        sorted.sort_by(|a, b| compare(a, b));
        let previous = std::mem::replace(&mut *list.items().borrow_mut(), sorted);
        drop(previous);
    }

    fn reverse(&self, list: &List) {
        list.items().borrow_mut().reverse();
    }

    fn intercepts(&self) -> bool {
        false
    }
}

impl ListMethods for Intercepted {
    fn push(&self, list: &List, items: Vec<Value>) -> usize {
        let inserted = items.clone();
        let len = NATIVE.push(list, items);
        changed(list, "push", &inserted);
        len
    }

    fn pop(&self, list: &List) -> Value {
        let popped = NATIVE.pop(list);
        changed(list, "pop", &[]);
        popped
    }

    fn shift(&self, list: &List) -> Value {
        let shifted = NATIVE.shift(list);
        changed(list, "shift", &[]);
        shifted
    }

    fn unshift(&self, list: &List, items: Vec<Value>) -> usize {
        let inserted = items.clone();
        let len = NATIVE.unshift(list, items);
        changed(list, "unshift", &inserted);
        len
    }

    fn splice(&self, list: &List, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let inserted = items.clone();
        let removed = NATIVE.splice(list, start, delete_count, items);
        changed(list, "splice", &inserted);
        removed
    }

    fn sort(&self, list: &List, compare: &dyn Fn(&Value, &Value) -> Ordering) {
        NATIVE.sort(list, compare);
        changed(list, "sort", &[]);
    }

    fn reverse(&self, list: &List) {
        NATIVE.reverse(list);
        changed(list, "reverse", &[]);
    }

    fn intercepts(&self) -> bool {
        true
    }
}

/// Observe what was inserted, then notify.
fn changed(list: &List, method: &'static str, inserted: &[Value]) {
    let Some(observer) = list.observer() else {
        return;
    };
    observe_items(inserted);
    tracing::trace!(method, inserted = inserted.len(), "list mutated");
    observer.dep().notify();
}

pub(crate) fn observe_items(items: &[Value]) {
    for item in items {
        observe(item, false);
    }
}

/// Make the active watcher depend on every observed container inside
/// `list`, recursing into nested lists.
pub fn depend_array(list: &List) {
    for item in list.peek_items() {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::List(inner) = &item {
            depend_array(inner);
        }
    }
}
