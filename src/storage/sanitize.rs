//! Filtering of state values before they reach the snapshot codec.
//!
//! Everything the engine persists is first lowered into a [`StateValue`].
//! Most kinds map directly onto the JSON snapshot codec; [`Opaque`] handles
//! and non-finite floats do not. [`sanitize`] rebuilds a value with those
//! leaves removed so a write never fails halfway through a structure.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A live in-process object that has no persisted form (locks, handles, clients).
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    handle: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            handle: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque<{}>", self.type_name)
    }
}

/// Generic persisted value. Container kinds are kept distinct so a
/// sanitized value comes back as the same kind it went in as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StateValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Seq(Vec<StateValue>),
    Tuple(Vec<StateValue>),
    Set(Vec<StateValue>),
    Map(BTreeMap<String, StateValue>),
    #[serde(skip)]
    Opaque(Opaque),
}

impl Default for StateValue {
    fn default() -> Self {
        StateValue::Map(BTreeMap::new())
    }
}

impl StateValue {
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, StateValue)>) -> Self {
        StateValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn text(value: impl Into<String>) -> Self {
        StateValue::Text(value.into())
    }

    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        StateValue::Opaque(Opaque::new(value))
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        match self {
            StateValue::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Whether this value, taken alone, can be written by the snapshot codec.
    ///
    /// Containers always qualify; their children are judged separately.
    pub fn is_persistable_leaf(&self) -> bool {
        match self {
            StateValue::Opaque(_) => false,
            StateValue::Float(f) => f.is_finite(),
            _ => true,
        }
    }

    /// Lowers any serde-serializable value into a `StateValue`.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(StateValue::from)
    }

    /// Reads a typed value back out. Sets and tuples are seen as sequences.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }

    /// JSON view of the value; opaque handles become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            StateValue::Null | StateValue::Opaque(_) => Value::Null,
            StateValue::Bool(b) => Value::Bool(*b),
            StateValue::Int(i) => Value::from(*i),
            StateValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            StateValue::Text(s) => Value::String(s.clone()),
            StateValue::Seq(items) | StateValue::Tuple(items) | StateValue::Set(items) => {
                Value::Array(items.iter().map(StateValue::to_json).collect())
            }
            StateValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for StateValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => StateValue::Null,
            Value::Bool(b) => StateValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => StateValue::Int(i),
                None => StateValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => StateValue::Text(s),
            Value::Array(items) => StateValue::Seq(items.into_iter().map(StateValue::from).collect()),
            Value::Object(entries) => {
                StateValue::Map(entries.into_iter().map(|(k, v)| (k, StateValue::from(v))).collect())
            }
        }
    }
}

/// Returns a copy of `value` with every unpersistable leaf removed.
///
/// Map entries whose value is dropped lose their key too; sequence, tuple
/// and set elements are dropped in place. Containers are rebuilt as the same
/// kind even when nothing survives. `None` means the value itself is an
/// unpersistable leaf.
pub fn sanitize(value: &StateValue) -> Option<StateValue> {
    let mut dropped = 0;
    filter(value, &mut dropped)
}

/// Like [`sanitize`], also reporting how many leaves were removed.
pub fn sanitize_report(value: &StateValue) -> (Option<StateValue>, usize) {
    let mut dropped = 0;
    let clean = filter(value, &mut dropped);
    (clean, dropped)
}

fn filter(value: &StateValue, dropped: &mut usize) -> Option<StateValue> {
    let keep = |items: &[StateValue], dropped: &mut usize| -> Vec<StateValue> {
        items.iter().filter_map(|item| filter(item, dropped)).collect()
    };

    match value {
        StateValue::Seq(items) => Some(StateValue::Seq(keep(items, dropped))),
        StateValue::Tuple(items) => Some(StateValue::Tuple(keep(items, dropped))),
        StateValue::Set(items) => Some(StateValue::Set(keep(items, dropped))),
        StateValue::Map(entries) => Some(StateValue::Map(
            entries
                .iter()
                .filter_map(|(k, v)| filter(v, dropped).map(|v| (k.clone(), v)))
                .collect(),
        )),
        leaf if leaf.is_persistable_leaf() => Some(leaf.clone()),
        _ => {
            *dropped += 1;
            None
        }
    }
}
