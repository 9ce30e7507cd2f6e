//! Stash schema: the set of application keys and their defaults

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{StashError, StashResult};

/// Application keys and the value each one reads as when unset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    defaults: IndexMap<String, Value>,
}

impl Schema {
    /// Build a schema from `(key, default)` pairs
    pub fn new<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self {
            defaults: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Build a schema from a struct of defaults; each field becomes a key.
    ///
    /// Fails unless `defaults` serializes to a JSON object.
    pub fn from_defaults<T: Serialize>(defaults: &T) -> StashResult<Self> {
        match serde_json::to_value(defaults)? {
            Value::Object(fields) => Ok(Self {
                defaults: fields.into_iter().collect(),
            }),
            other => Err(StashError::config(format!(
                "schema defaults must serialize to an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Default for `key`, or `UnknownKey`
    pub fn default_for(&self, key: &str) -> StashResult<&Value> {
        self.defaults
            .get(key)
            .ok_or_else(|| StashError::UnknownKey(key.to_string()))
    }

    /// Fail with `UnknownKey` unless `key` belongs to the schema
    pub fn check(&self, key: &str) -> StashResult<()> {
        self.default_for(key).map(|_| ())
    }

    /// Whether `key` belongs to the schema
    pub fn contains(&self, key: &str) -> bool {
        self.defaults.contains_key(key)
    }

    /// Schema keys in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    /// Whether the schema declares no keys
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Schema {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::new(iter)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
