//! Dynamic values.
//!
//! State handed to the runtime is plain structured data: primitives,
//! keyed records and ordered lists. Records and lists are shared handles,
//! so two `Value`s can refer to the same container, and change detection
//! compares containers by identity.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use serde::{Serialize, Serializer};

use super::list::List;
use super::record::Record;
use super::Observer;
use crate::error::{Error, Result};

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Record(Record),
    List(List),
}

/// Change detection equality.
///
/// Primitives compare by value and strings by content; records and lists
/// by identity. NaN equals NaN, so writing NaN over NaN is not a change.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Record(a), Value::Record(b)) => Record::ptr_eq(a, b),
        (Value::List(a), Value::List(b)) => List::ptr_eq(a, b),
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Record(_) => "record",
            Self::List(_) => "list",
        }
    }

    /// Records and lists: the values the observer can make reactive.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Record(_) | Self::List(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Record(_) | Self::List(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn try_f64(&self) -> Result<f64> {
        self.as_f64().ok_or_else(|| self.mismatch("number"))
    }

    pub fn try_record(&self) -> Result<&Record> {
        self.as_record().ok_or_else(|| self.mismatch("record"))
    }

    pub fn try_list(&self) -> Result<&List> {
        self.as_list().ok_or_else(|| self.mismatch("list"))
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        Error::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }

    /// Read `key` the way property access would: a record property, or a
    /// list element when the key is an index. Anything else is `Undefined`.
    pub fn read_key(&self, key: &str) -> Value {
        match self {
            Self::Record(record) => record.get(key),
            Self::List(list) => match key.parse::<usize>() {
                Ok(index) => list.get(index),
                Err(_) if key == "length" => Value::from(list.len()),
                Err(_) => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    /// The observer attached to a record or list.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Self::Record(record) => record.observer(),
            Self::List(list) => list.observer(),
            _ => None,
        }
    }

    /// String conversion used by the default list ordering.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.to_string(),
            Self::Record(_) => "[object Object]".to_string(),
            Self::List(list) => list
                .peek_items()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Default list ordering: `Undefined` last, everything else by its
    /// string form.
    pub fn default_order(a: &Value, b: &Value) -> Ordering {
        match (a.is_undefined(), b.is_undefined()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => a.to_display_string().cmp(&b.to_display_string()),
        }
    }

    /// Build fresh, unobserved records and lists from JSON.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s.into()),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Record(Record::from_pairs(
                map.into_iter().map(|(k, v)| (k, Self::from_json(v))),
            )),
        }
    }

    /// JSON snapshot. Reads go through the normal accessors, so a snapshot
    /// taken inside a watcher depends on everything it serializes.
    /// `Undefined` and cyclic references become `null`; non-finite numbers
    /// as well, since JSON cannot represent them.
    pub fn to_json(&self) -> serde_json::Value {
        let mut ancestors = Vec::new();
        self.to_json_inner(&mut ancestors)
    }

    fn to_json_inner(&self, ancestors: &mut Vec<*const ()>) -> serde_json::Value {
        match self {
            Self::Undefined | Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(s.to_string()),
            Self::Record(record) => {
                let ptr = record.as_ptr();
                if ancestors.contains(&ptr) {
                    return serde_json::Value::Null;
                }
                ancestors.push(ptr);
                let map = record
                    .keys()
                    .into_iter()
                    .map(|key| {
                        let value = record.get(&key).to_json_inner(ancestors);
                        (key, value)
                    })
                    .collect();
                ancestors.pop();
                serde_json::Value::Object(map)
            }
            Self::List(list) => {
                let ptr = list.as_ptr();
                if ancestors.contains(&ptr) {
                    return serde_json::Value::Null;
                }
                ancestors.push(ptr);
                let items = list
                    .to_vec()
                    .iter()
                    .map(|item| item.to_json_inner(ancestors))
                    .collect();
                ancestors.pop();
                serde_json::Value::Array(items)
            }
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        // `Display` for f64 already prints integral values without a
        // fractional part.
        format!("{n}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Record(record) => record.fmt(f),
            Self::List(list) => list.fmt(f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

number_from!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::String(s)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Self::List(list)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(List::from(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}
