//! Storage engine capability contracts

use async_trait::async_trait;

use crate::errors::{EngineError, EngineResult};
use crate::value::StoredValue;

/// Asynchronous storage engine.
///
/// The core operations are `set_item`, `get_item` and `remove_item`. The
/// remaining methods have defaults so a minimal engine only implements those
/// three plus [`kind`](AsyncStorageEngine::kind).
///
/// | Method | Default |
/// |--------|---------|
/// | `supports_structured_values` | `false`: the façade always hands over text |
/// | `is_supported` | `true`: used by probing selection |
/// | `has_ready_hook` / `on_ready` | no hook: immediately ready |
/// | `keys` / `clear` | `EngineError::Unsupported` |
#[async_trait]
pub trait AsyncStorageEngine: Send + Sync {
    /// Short engine name used in logs
    fn kind(&self) -> &str;

    /// Whether the engine stores and returns JSON values directly
    fn supports_structured_values(&self) -> bool {
        false
    }

    /// Runtime probe: whether the engine is usable in this environment
    fn is_supported(&self) -> bool {
        true
    }

    /// Whether [`on_ready`](AsyncStorageEngine::on_ready) must be awaited
    /// before the engine counts as ready
    fn has_ready_hook(&self) -> bool {
        false
    }

    /// Resolve once the engine finished its open/upgrade handshake
    async fn on_ready(&self) {}

    /// Persist `value` under `key`
    async fn set_item(&self, key: &str, value: StoredValue) -> EngineResult<()>;

    /// Read the value stored under `key`, `None` when unset
    async fn get_item(&self, key: &str) -> EngineResult<Option<StoredValue>>;

    /// Remove the value stored under `key`
    async fn remove_item(&self, key: &str) -> EngineResult<()>;

    /// List every engine key this engine owns
    async fn keys(&self) -> EngineResult<Vec<String>> {
        Err(EngineError::unsupported("keys"))
    }

    /// Remove every entry this engine owns
    async fn clear(&self) -> EngineResult<()> {
        Err(EngineError::unsupported("clear"))
    }
}

/// Synchronous storage engine.
///
/// Same contract as [`AsyncStorageEngine`] without awaiting and without a
/// readiness hook.
pub trait SyncStorageEngine: Send + Sync {
    /// Short engine name used in logs
    fn kind(&self) -> &str;

    /// Whether the engine stores and returns JSON values directly
    fn supports_structured_values(&self) -> bool {
        false
    }

    /// Runtime probe: whether the engine is usable in this environment
    fn is_supported(&self) -> bool {
        true
    }

    /// Persist `value` under `key`
    fn set_item(&self, key: &str, value: StoredValue) -> EngineResult<()>;

    /// Read the value stored under `key`, `None` when unset
    fn get_item(&self, key: &str) -> EngineResult<Option<StoredValue>>;

    /// Remove the value stored under `key`
    fn remove_item(&self, key: &str) -> EngineResult<()>;

    /// List every engine key this engine owns
    fn keys(&self) -> EngineResult<Vec<String>> {
        Err(EngineError::unsupported("keys"))
    }

    /// Remove every entry this engine owns
    fn clear(&self) -> EngineResult<()> {
        Err(EngineError::unsupported("clear"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Minimal {
        data: Mutex<HashMap<String, StoredValue>>,
    }

    #[async_trait]
    impl AsyncStorageEngine for Minimal {
        fn kind(&self) -> &str {
            "minimal"
        }

        async fn set_item(&self, key: &str, value: StoredValue) -> EngineResult<()> {
            self.data.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }

        async fn get_item(&self, key: &str) -> EngineResult<Option<StoredValue>> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        async fn remove_item(&self, key: &str) -> EngineResult<()> {
            self.data.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn defaults_describe_a_plain_text_engine() {
        let engine = Minimal::default();
        assert!(!engine.supports_structured_values());
        assert!(engine.is_supported());
        assert!(!engine.has_ready_hook());
        engine.on_ready().await;
        assert_eq!(
            engine.keys().await,
            Err(EngineError::unsupported("keys"))
        );
    }
}
