//! Logical key to engine key mapping

use keystash_core::KeyHasher;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::schema::Schema;

/// Derives engine keys from schema keys, optionally through a hasher
#[derive(Clone, Default)]
pub struct KeyTransform {
    hasher: Option<Arc<dyn KeyHasher>>,
}

impl KeyTransform {
    /// Keys pass through unchanged
    pub fn identity() -> Self {
        Self::default()
    }

    /// Keys are replaced by their digest
    pub fn hashed(hasher: Arc<dyn KeyHasher>) -> Self {
        Self {
            hasher: Some(hasher),
        }
    }

    /// Whether keys are hashed
    pub fn is_hashed(&self) -> bool {
        self.hasher.is_some()
    }

    /// Engine key for `key`
    pub fn derive_key(&self, key: &str) -> String {
        match &self.hasher {
            Some(hasher) => hasher.hash(key),
            None => key.to_string(),
        }
    }

    /// Map engine keys back to schema keys, in schema order.
    ///
    /// Engine keys that no schema key derives to are ignored.
    pub fn reverse_lookup(&self, engine_keys: &[String], schema: &Schema) -> Vec<String> {
        let derived: HashMap<String, &str> = schema
            .keys()
            .map(|key| (self.derive_key(key), key))
            .collect();
        let mut present: Vec<&str> = engine_keys
            .iter()
            .filter_map(|engine_key| derived.get(engine_key).copied())
            .collect();
        present.sort_by_key(|key| schema.keys().position(|k| k == *key));
        present.dedup();
        present.into_iter().map(str::to_string).collect()
    }
}

impl fmt::Debug for KeyTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyTransform")
            .field("hashed", &self.is_hashed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystash_effects::Md5Hasher;
    use serde_json::json;

    #[test]
    fn identity_passes_keys_through() {
        assert_eq!(KeyTransform::identity().derive_key("theme"), "theme");
    }

    #[test]
    fn hashing_is_deterministic() {
        let transform = KeyTransform::hashed(Arc::new(Md5Hasher));
        assert_eq!(transform.derive_key("abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(transform.derive_key("abc"), transform.derive_key("abc"));
    }

    #[test]
    fn reverse_lookup_follows_schema_order() {
        let schema = Schema::new([("a", json!(1)), ("b", json!(2)), ("c", json!(3))]);
        let transform = KeyTransform::hashed(Arc::new(|key: &str| format!("h-{key}")));

        let engine_keys = vec!["h-c".to_string(), "stray".to_string(), "h-a".to_string()];
        assert_eq!(
            transform.reverse_lookup(&engine_keys, &schema),
            vec!["a".to_string(), "c".to_string()]
        );
    }
}
