//! Subscriber identity.
//!
//! Watchers and deps live in arenas (see [`super::runtime`]) and are
//! addressed by versioned keys. A key that outlives its slot simply stops
//! resolving, which is what lets a dep keep a plain list of watcher keys
//! (and a watcher a plain set of dep keys) without either side owning
//! the other.

use std::cell::Cell;

slotmap::new_key_type! {
    /// Arena key of a watcher.
    pub struct WatcherId;

    /// Arena key of a dep.
    pub struct DepId;
}

thread_local! {
    static NEXT_UID: Cell<u64> = const { Cell::new(0) };
}

/// Creation-order number of a watcher.
///
/// Arena keys are reused after removal, so ordering (the scheduler flushes
/// in creation order) uses this counter instead.
pub(crate) fn next_uid() -> u64 {
    NEXT_UID.with(|uid| {
        let next = uid.get() + 1;
        uid.set(next);
        next
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uids_increase() {
        let a = next_uid();
        let b = next_uid();
        let c = next_uid();

        assert!(a < b);
        assert!(b < c);
    }
}
