//! Declarations a [`State`] is built from.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::State;
use crate::error::Result;
use crate::observer::Value;
use crate::reactive::WatchOptions;

pub type DataFactory = Rc<dyn Fn(&State) -> Result<Value>>;
pub type StateGetter = Rc<dyn Fn(&State) -> Result<Value>>;
pub type StateSetter = Rc<dyn Fn(&State, Value)>;
pub type StateHandler = Rc<dyn Fn(&State, &Value, &Value) -> Result<()>>;

/// A declared prop.
#[derive(Clone, Default)]
pub struct PropDef {
    pub(crate) default: Option<Rc<dyn Fn() -> Value>>,
}

impl PropDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory for the value used when the parent supplies none. Each
    /// state gets a fresh value.
    pub fn with_default(default: impl Fn() -> Value + 'static) -> Self {
        Self {
            default: Some(Rc::new(default)),
        }
    }
}

impl fmt::Debug for PropDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropDef")
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// A declared computed property.
#[derive(Clone)]
pub struct ComputedDef {
    pub(crate) get: StateGetter,
    pub(crate) set: Option<StateSetter>,
    pub(crate) cache: bool,
}

impl ComputedDef {
    pub fn new(get: impl Fn(&State) -> Result<Value> + 'static) -> Self {
        Self {
            get: Rc::new(get),
            set: None,
            cache: true,
        }
    }

    pub fn with_setter(mut self, set: impl Fn(&State, Value) + 'static) -> Self {
        self.set = Some(Rc::new(set));
        self
    }

    /// Call the getter on every read instead of caching.
    pub fn uncached(mut self) -> Self {
        self.cache = false;
        self
    }
}

impl fmt::Debug for ComputedDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedDef")
            .field("has_setter", &self.set.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}

/// A declared watch handler.
#[derive(Clone)]
pub struct WatchDef {
    pub(crate) handler: StateHandler,
    pub(crate) options: WatchOptions,
}

impl WatchDef {
    pub fn new(handler: impl Fn(&State, &Value, &Value) -> Result<()> + 'static) -> Self {
        Self {
            handler: Rc::new(handler),
            options: WatchOptions::default(),
        }
    }

    pub fn deep(mut self) -> Self {
        self.options.deep = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.options.immediate = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.options.sync = true;
        self
    }
}

impl fmt::Debug for WatchDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchDef")
            .field("options", &self.options)
            .finish()
    }
}

/// Builder for [`State`].
///
/// ```rust,ignore
/// let state = StateBuilder::new("counter")
///     .data(|_| Ok(Value::from_json(json!({ "count": 0 }))))
///     .computed("double", ComputedDef::new(|s| Ok(Value::from(s.get("count").try_f64()? * 2.0))))
///     .build();
/// ```
#[derive(Clone)]
pub struct StateBuilder {
    pub(crate) name: String,
    pub(crate) root: bool,
    pub(crate) props: IndexMap<String, PropDef>,
    pub(crate) props_data: IndexMap<String, Value>,
    pub(crate) data: Option<DataFactory>,
    pub(crate) computed: IndexMap<String, ComputedDef>,
    pub(crate) watch: IndexMap<String, Vec<WatchDef>>,
}

impl StateBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: true,
            props: IndexMap::new(),
            props_data: IndexMap::new(),
            data: None,
            computed: IndexMap::new(),
            watch: IndexMap::new(),
        }
    }

    /// Build a child state: prop values come from a parent and are not
    /// observed again, and writing them directly is reported.
    pub fn child(mut self) -> Self {
        self.root = false;
        self
    }

    pub fn prop(mut self, key: impl Into<String>, def: PropDef) -> Self {
        self.props.insert(key.into(), def);
        self
    }

    /// Supply a prop value, as a parent would.
    pub fn prop_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props_data.insert(key.into(), value.into());
        self
    }

    /// Factory for the root data record. It runs once, untracked, after
    /// props are initialised.
    pub fn data(mut self, factory: impl Fn(&State) -> Result<Value> + 'static) -> Self {
        self.data = Some(Rc::new(factory));
        self
    }

    pub fn computed(mut self, key: impl Into<String>, def: ComputedDef) -> Self {
        self.computed.insert(key.into(), def);
        self
    }

    /// Add a handler for `expression`. Several handlers may watch the same
    /// expression.
    pub fn watch(mut self, expression: impl Into<String>, def: WatchDef) -> Self {
        self.watch.entry(expression.into()).or_default().push(def);
        self
    }

    pub fn build(self) -> State {
        State::from_builder(self)
    }
}

impl fmt::Debug for StateBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBuilder")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("props", &self.props.keys().collect::<Vec<_>>())
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .field("watch", &self.watch.keys().collect::<Vec<_>>())
            .finish()
    }
}
