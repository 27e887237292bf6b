//! Variable scopes attached to flow sessions, executions and conversations.
//!
//! A [`Scope`] is an ordered map of named values. Most values are plain JSON
//! data and travel inside snapshots; [`ScopeValue::Transient`] holds a live
//! in-process object that exists only in memory and makes a snapshot fail
//! with `NotSerializable` if it is still present at capture time.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A single scoped variable.
#[derive(Clone)]
pub enum ScopeValue {
    Json(Value),
    Transient(Arc<dyn Any + Send + Sync>),
}

impl ScopeValue {
    pub fn transient<T: Any + Send + Sync>(value: T) -> Self {
        Self::Transient(Arc::new(value))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Transient(_) => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Json(_) => None,
            Self::Transient(value) => (**value).downcast_ref::<T>(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<Value> for ScopeValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

// Transient values compare by identity.
impl PartialEq for ScopeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Transient(a), Self::Transient(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Transient(_) => f.write_str("Transient(..)"),
        }
    }
}

impl Serialize for ScopeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Json(value) => value.serialize(serializer),
            Self::Transient(_) => Err(serde::ser::Error::custom(
                "transient scope value cannot be serialized",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for ScopeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::Json)
    }
}

/// Named variables, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    entries: BTreeMap<String, ScopeValue>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ScopeValue> {
        self.entries.get(name)
    }

    /// Shorthand for values known to be plain data.
    pub fn get_json(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(ScopeValue::as_json)
    }

    /// Insert or replace a value, returning the previous one.
    pub fn put(&mut self, name: impl Into<String>, value: impl Into<ScopeValue>) -> Option<ScopeValue> {
        self.entries.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<ScopeValue> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScopeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names of values that would block a snapshot.
    pub fn transient_names(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, value)| value.is_transient())
            .map(|(name, _)| name)
    }
}

impl<K: Into<String>, V: Into<ScopeValue>> FromIterator<(K, V)> for Scope {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
