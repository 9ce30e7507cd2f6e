//! Value codec
//!
//! Encoding turns a JSON value into what the engine stores: the value itself
//! for structured engines without encryption, otherwise JSON text, encrypted
//! when a secret is configured.
//!
//! Decoding never fails. A value that cannot be decrypted or parsed is logged
//! and returned in the most useful form still available.

use keystash_core::{shallow_merge, Cipher, StoredValue};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::errors::StashResult;

/// Encodes values for, and decodes values from, the selected engine
pub struct Codec {
    cipher: Arc<dyn Cipher>,
    secret: Option<Zeroizing<String>>,
    increments: HashSet<String>,
}

impl Codec {
    /// Build a codec; `secret` enables encryption with `cipher`
    pub fn new(
        cipher: Arc<dyn Cipher>,
        secret: Option<Zeroizing<String>>,
        increments: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            cipher,
            secret: secret.filter(|s| !s.is_empty()),
            increments: increments.into_iter().collect(),
        }
    }

    /// Whether values are encrypted before they reach the engine
    pub fn is_encrypted(&self) -> bool {
        self.secret.is_some()
    }

    /// Whether writes to `key` merge onto the previous value
    pub fn is_increment(&self, key: &str) -> bool {
        self.increments.contains(key)
    }

    /// Apply the increment merge for `key`, if configured
    pub fn merge(&self, key: &str, previous: Value, update: Value) -> Value {
        if self.is_increment(key) {
            shallow_merge(previous, update)
        } else {
            update
        }
    }

    /// Encode `value` for an engine with or without structured support
    pub fn encode(&self, value: Value, structured: bool) -> StashResult<StoredValue> {
        let secret = match &self.secret {
            None if structured => return Ok(StoredValue::Structured(value)),
            None => return Ok(StoredValue::Text(serde_json::to_string(&value)?)),
            Some(secret) => secret,
        };

        let text = serde_json::to_string(&value)?;
        let sealed = self.cipher.encrypt(&text, secret)?;
        Ok(StoredValue::Text(sealed))
    }

    /// Decode what the engine returned for `key`.
    ///
    /// `None` yields `default` and `Structured` values pass through. `Text` is
    /// always treated as the JSON envelope, whichever engine it came from: a
    /// structured engine holding text written by an older or text-only writer
    /// reads `"123"` back as the number `123`. Text that is not JSON comes
    /// back as a string.
    pub fn decode(&self, key: &str, stored: Option<StoredValue>, default: &Value) -> Value {
        let text = match stored {
            None => return default.clone(),
            Some(StoredValue::Structured(value)) => return value,
            Some(StoredValue::Text(text)) => text,
        };

        if let Some(secret) = &self.secret {
            match self.cipher.decrypt(&text, secret) {
                Ok(plain) => match serde_json::from_str(&plain) {
                    Ok(value) => return value,
                    Err(e) => {
                        tracing::warn!(key, error = %e, "decrypted value is not valid JSON");
                    }
                },
                Err(e) => {
                    tracing::warn!(key, error = %e, "failed to decrypt stored value");
                }
            }
        }

        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "stored value is not valid JSON; returning raw text");
                Value::String(text)
            }
        }
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("encrypted", &self.is_encrypted())
            .field("increments", &self.increments)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystash_effects::AesGcmCipher;
    use proptest::prelude::*;
    use serde_json::json;

    fn plain() -> Codec {
        Codec::new(Arc::new(AesGcmCipher), None, Vec::new())
    }

    fn encrypted() -> Codec {
        Codec::new(
            Arc::new(AesGcmCipher),
            Some(Zeroizing::new("hunter2".to_string())),
            Vec::new(),
        )
    }

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            ".*".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                    .prop_map(|fields| Value::Object(fields.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn text_envelope_round_trips(value in json_value(), encrypt in any::<bool>()) {
            let codec = if encrypt { encrypted() } else { plain() };
            let stored = codec.encode(value.clone(), false).unwrap();
            prop_assert!(stored.as_text().is_some());
            prop_assert_eq!(codec.decode("k", Some(stored), &Value::Null), value);
        }
    }

    #[test]
    fn structured_engine_without_secret_stores_value_as_is() {
        let stored = plain().encode(json!({"a": 1}), true).unwrap();
        assert_eq!(stored, StoredValue::Structured(json!({"a": 1})));
    }

    #[test]
    fn secret_forces_text_even_for_structured_engines() {
        let codec = encrypted();
        let stored = codec.encode(json!({"a": 1}), true).unwrap();
        let text = stored.as_text().unwrap().to_string();
        assert!(!text.contains("\"a\""));
        assert_eq!(codec.decode("k", Some(stored), &Value::Null), json!({"a": 1}));
    }

    #[test]
    fn absent_value_reads_as_default() {
        assert_eq!(plain().decode("k", None, &json!("dflt")), json!("dflt"));
    }

    #[test]
    fn invalid_json_falls_back_to_raw_text() {
        let value = plain().decode("k", Some("not json {".into()), &Value::Null);
        assert_eq!(value, json!("not json {"));
    }

    #[test]
    fn undecryptable_json_text_still_parses() {
        // written before encryption was turned on
        let value = encrypted().decode("k", Some(r#"{"legacy":true}"#.into()), &Value::Null);
        assert_eq!(value, json!({"legacy": true}));
    }

    #[test]
    fn text_from_a_structured_engine_is_still_the_json_envelope() {
        let codec = plain();
        assert_eq!(
            codec.decode("k", Some(StoredValue::Text("123".into())), &Value::Null),
            json!(123)
        );
        assert_eq!(
            codec.decode("k", Some(StoredValue::Structured(json!("123"))), &Value::Null),
            json!("123")
        );
    }

    #[test]
    fn increment_merge_only_for_configured_keys() {
        let codec = Codec::new(Arc::new(AesGcmCipher), None, vec!["profile".to_string()]);
        assert_eq!(
            codec.merge("profile", json!({"a": 1, "b": 2}), json!({"a": 99})),
            json!({"a": 99, "b": 2})
        );
        assert_eq!(
            codec.merge("other", json!({"a": 1, "b": 2}), json!({"a": 99})),
            json!({"a": 99})
        );
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", encrypted());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("encrypted: true"));
    }
}
