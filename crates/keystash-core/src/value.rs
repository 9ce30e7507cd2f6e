//! Stored value model
//!
//! Text-only engines persist strings; engines that declare structured support
//! may receive JSON values directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value as it crosses the engine boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StoredValue {
    /// Text envelope: JSON text, possibly encrypted
    Text(String),
    /// Structured value stored as-is by engines that support it
    Structured(Value),
}

impl StoredValue {
    /// Borrow the text form, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    /// Convert into the text form.
    ///
    /// Structured values are rendered as JSON text; text-only engines use this
    /// when a caller hands them a structured value anyway.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Structured(value) => value.to_string(),
        }
    }

    /// Approximate persisted size in bytes
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Structured(value) => value.to_string().len(),
        }
    }
}

impl From<String> for StoredValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for StoredValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Merge `update` over `previous`, one level deep.
///
/// Fields of `update` overwrite fields of `previous`; fields only present in
/// `previous` are kept. When either side is not a JSON object the update
/// replaces the previous value.
pub fn shallow_merge(previous: Value, update: Value) -> Value {
    match (previous, update) {
        (Value::Object(mut base), Value::Object(fields)) => {
            for (field, value) in fields {
                base.insert(field, value);
            }
            Value::Object(base)
        }
        (_, update) => update,
    }
}
