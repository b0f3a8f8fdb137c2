use std::collections::HashSet;

use super::value::Value;

/// Read every nested value under `value` so that the active watcher
/// depends on all of it. Each container is visited once, which also stops
/// cycles. Frozen records are skipped.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    walk(value, &mut seen);
    tracing::trace!(containers = seen.len(), "deep traversal");
}

fn walk(value: &Value, seen: &mut HashSet<*const ()>) {
    match value {
        Value::Record(record) => {
            if record.is_frozen() || !seen.insert(record.as_ptr()) {
                return;
            }
            for key in record.keys() {
                walk(&record.get(&key), seen);
            }
        }
        Value::List(list) => {
            if !seen.insert(list.as_ptr()) {
                return;
            }
            for item in list.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{observe, List, Record};
    use crate::reactive::{Watcher, WatcherOptions};
    use std::cell::Cell;
    use std::rc::Rc;

    fn deep_watcher(root: Value, runs: Rc<Cell<u32>>) -> Watcher {
        Watcher::with_options(
            move || {
                runs.set(runs.get() + 1);
                Ok(root.clone())
            },
            None,
            WatcherOptions {
                sync: true,
                deep: true,
                ..Default::default()
            },
        )
    }

    #[test]
    fn deep_watcher_sees_nested_writes() {
        let leaf = Record::from_pairs([("n", 1)]);
        let items = List::from(vec![Value::from(leaf.clone())]);
        let root = Record::from_pairs([("items", Value::from(items.clone()))]);
        observe(&Value::from(root.clone()), false);

        let runs = Rc::new(Cell::new(0));
        let watcher = deep_watcher(Value::from(root), runs.clone());

        leaf.set("n", 2);
        assert_eq!(runs.get(), 2);
        items.push(3);
        assert_eq!(runs.get(), 3);
        watcher.teardown();
    }

    #[test]
    fn cycles_terminate() {
        let a = Record::new();
        let b = Record::from_pairs([("a", Value::from(a.clone()))]);
        a.set("b", b.clone());
        observe(&Value::from(a.clone()), false);

        let runs = Rc::new(Cell::new(0));
        let watcher = deep_watcher(Value::from(a.clone()), runs.clone());
        assert_eq!(runs.get(), 1);

        b.set("x", 1);
        a.remove("b");
        watcher.teardown();
    }

    #[test]
    fn frozen_records_are_not_descended() {
        let frozen = Record::from_pairs([("n", 1)]);
        frozen.freeze();
        let runs = Rc::new(Cell::new(0));
        let watcher = deep_watcher(Value::from(frozen), runs.clone());

        assert_eq!(watcher.dependency_count(), 0);
        watcher.teardown();
    }
}
