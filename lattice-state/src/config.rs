//! Runtime Configuration
//!
//! Configuration is per thread, like the rest of the runtime. It can be
//! built in code or parsed from JSON:
//!
//! ```rust,ignore
//! let config = Config::from_json_str(r#"{ "async_flush": false }"#)?;
//! lattice_state::config::set(config);
//! ```

use std::cell::RefCell;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Upper bound on how often one watcher may be re-queued during a single
/// scheduler flush before the flush is treated as an infinite loop.
pub const DEFAULT_MAX_UPDATE_COUNT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Suppress log output for diagnostics. Diagnostics are still
    /// collected and forwarded to an installed handler.
    pub silent: bool,

    /// When false, the default scheduler flushes synchronously on every
    /// schedule and deps notify their subscribers in creation order.
    pub async_flush: bool,

    /// See [`DEFAULT_MAX_UPDATE_COUNT`].
    pub max_update_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            silent: false,
            async_flush: true,
            max_update_count: DEFAULT_MAX_UPDATE_COUNT,
        }
    }
}

impl Config {
    /// Parse a configuration from a JSON document. Missing fields take
    /// their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Snapshot of the current thread's configuration.
pub fn get() -> Config {
    CONFIG.with(|config| config.borrow().clone())
}

/// Replace the current thread's configuration, returning the previous one.
pub fn set(config: Config) -> Config {
    CONFIG.with(|current| std::mem::replace(&mut *current.borrow_mut(), config))
}

/// Run `f` with `config` installed, restoring the previous configuration
/// afterwards (also on unwind).
pub fn with_config<R>(config: Config, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<Config>);

    impl Drop for Restore {
        fn drop(&mut self) {
            if let Some(previous) = self.0.take() {
                set(previous);
            }
        }
    }

    let _restore = Restore(Some(set(config)));
    f()
}

pub(crate) fn is_silent() -> bool {
    CONFIG.with(|config| config.borrow().silent)
}

pub(crate) fn is_async() -> bool {
    CONFIG.with(|config| config.borrow().async_flush)
}

pub(crate) fn max_update_count() -> usize {
    CONFIG.with(|config| config.borrow().max_update_count)
}
