//! Lattice State
//!
//! This crate provides the dependency-tracking state layer of the Lattice
//! reactive UI framework. It implements:
//!
//! - Observation of plain records and lists, turning every property into a
//!   tracked, notifying cell
//! - Watchers that record what they read and re-run when it changes,
//!   eagerly, lazily (computed values) or synchronously
//! - A scheduler that batches eager re-runs and flushes them in creation
//!   order
//! - Component-style state: props, data, computed properties, watches and
//!   a render watcher
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `observer`: the value model and the machinery that makes it reactive
//! - `reactive`: deps, watchers, computed values, explicit watches
//! - `scheduler`: batching and ordering of eager watchers
//! - `state`: the structure owner tying the pieces together
//! - `config`, `diagnostics`, `error`: runtime settings, non-fatal
//!   warnings and the error type for fallible user code
//!
//! All runtime state is thread-local. Nothing here is `Send`.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_state::{observe, scheduler, Record, Value, Watcher};
//!
//! let data = Record::from_pairs([("a", 1), ("b", 2)]);
//! observe(&Value::Record(data.clone()), true);
//!
//! let d = data.clone();
//! let sum = Watcher::new(move || {
//!     Ok(Value::from(d.get("a").try_f64()? + d.get("b").try_f64()?))
//! });
//! assert_eq!(sum.value(), Value::from(3));
//!
//! data.set("a", 10);
//! scheduler::flush();
//! assert_eq!(sum.value(), Value::from(12));
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod observer;
pub mod reactive;
pub mod scheduler;
pub mod state;

pub use config::Config;
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use error::{Error, Result};
pub use observer::{del, observe, set, List, Record, Value};
pub use reactive::{
    untrack, watch, Computed, Dep, DepId, WatchHandle, WatchOptions, WatchSource, Watcher,
    WatcherOptions, WatcherState,
};
pub use scheduler::{QueueScheduler, Scheduler};
pub use state::{ComputedDef, PropDef, State, StateBuilder, WatchDef};
