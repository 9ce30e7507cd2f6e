//! Asynchronous storage façade

use keystash_core::AsyncStorageEngine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::codec::Codec;
use crate::errors::{StashError, StashResult};
use crate::keys::KeyTransform;
use crate::notify::{ChangeNotifier, Unsubscribe};
use crate::options::StashOptions;
use crate::ready::ReadinessGate;
use crate::schema::Schema;
use crate::select::{select, select_named, AsyncCandidate, EngineInit, EngineRegistry};

/// Typed key/value stash over one [`AsyncStorageEngine`].
///
/// Data operations do not wait for readiness themselves; engines with an
/// open handshake queue or reject early calls on their own terms. Call
/// [`on_ready`](AsyncStash::on_ready) first when that matters.
pub struct AsyncStash {
    schema: Schema,
    engine: Option<Arc<dyn AsyncStorageEngine>>,
    codec: Codec,
    keys: KeyTransform,
    gate: ReadinessGate,
    notifier: ChangeNotifier,
}

impl AsyncStash {
    /// Select an engine from `candidates` and build the stash.
    ///
    /// Never fails: without a usable engine every data operation returns
    /// [`StashError::NoEngine`].
    pub fn new<I>(schema: Schema, candidates: I, options: StashOptions) -> Self
    where
        I: IntoIterator<Item = Option<AsyncCandidate>>,
    {
        let engine = select(candidates, options.selection());
        Self::with_engine(schema, engine, options)
    }

    /// Build the stash from engines registered under `names`
    pub fn from_registry(
        schema: Schema,
        registry: &EngineRegistry<dyn AsyncStorageEngine>,
        names: &[&str],
        init: &EngineInit,
        options: StashOptions,
    ) -> Self {
        let engine = select_named(registry, names, init, options.selection());
        Self::with_engine(schema, engine, options)
    }

    /// Build the stash over an already selected engine
    pub fn with_engine(
        schema: Schema,
        engine: Option<Arc<dyn AsyncStorageEngine>>,
        options: StashOptions,
    ) -> Self {
        let gate = match &engine {
            Some(engine) => ReadinessGate::for_engine(engine.clone()),
            None => ReadinessGate::ready(),
        };
        Self {
            schema,
            engine,
            codec: options.codec(),
            keys: options.key_transform(),
            gate,
            notifier: options.notifier(),
        }
    }

    fn engine(&self) -> StashResult<&Arc<dyn AsyncStorageEngine>> {
        self.engine.as_ref().ok_or(StashError::NoEngine)
    }

    /// Resolve once the engine finished initializing
    pub async fn on_ready(&self) {
        self.gate.wait().await;
    }

    /// Whether the engine finished initializing
    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Whether an engine was selected
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Name of the selected engine
    pub fn engine_kind(&self) -> Option<&str> {
        self.engine.as_deref().map(|engine| engine.kind())
    }

    /// The stash schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Read `key`, falling back to its default when unset
    pub async fn get(&self, key: &str) -> StashResult<Value> {
        let engine = self.engine()?;
        let default = self.schema.default_for(key)?;
        let stored = engine.get_item(&self.keys.derive_key(key)).await?;
        Ok(self.codec.decode(key, stored, default))
    }

    /// Write `value` under `key`, then notify subscribers
    pub async fn set(&self, key: &str, value: Value) -> StashResult<()> {
        let engine = self.engine()?;
        self.schema.check(key)?;

        let value = if self.codec.is_increment(key) {
            let previous = self.get(key).await?;
            self.codec.merge(key, previous, value)
        } else {
            value
        };
        let stored = self
            .codec
            .encode(value, engine.supports_structured_values())?;
        engine.set_item(&self.keys.derive_key(key), stored).await?;

        self.notifier.publish(key);
        Ok(())
    }

    /// Remove `key`, then notify subscribers
    pub async fn remove(&self, key: &str) -> StashResult<()> {
        let engine = self.engine()?;
        self.schema.check(key)?;
        engine.remove_item(&self.keys.derive_key(key)).await?;
        self.notifier.publish(key);
        Ok(())
    }

    /// Read `key` as `T`
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> StashResult<T> {
        Ok(serde_json::from_value(self.get(key).await?)?)
    }

    /// Write a serializable `value` under `key`
    pub async fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StashResult<()> {
        self.set(key, serde_json::to_value(value)?).await
    }

    /// Schema keys that currently have a stored value
    pub async fn keys(&self) -> StashResult<Vec<String>> {
        let engine = self.engine()?;
        let engine_keys = engine.keys().await?;
        Ok(self.keys.reverse_lookup(&engine_keys, &self.schema))
    }

    /// Remove every schema key; subscribers see one batch.
    ///
    /// When a removal fails, the keys removed before it are still published.
    pub async fn clear(&self) -> StashResult<()> {
        let engine = self.engine()?;
        let mut removed = Vec::with_capacity(self.schema.len());
        for key in self.schema.keys() {
            if let Err(e) = engine.remove_item(&self.keys.derive_key(key)).await {
                self.notifier.publish_all(removed);
                return Err(e.into());
            }
            removed.push(key);
        }
        self.notifier.publish_all(removed);
        Ok(())
    }

    /// Call `callback` now and after every flush touching `keys`.
    ///
    /// `None` watches every key. An empty list calls `callback` once and
    /// registers nothing.
    pub fn subscribe<F>(&self, callback: F, keys: Option<&[&str]>) -> Option<Unsubscribe>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback, keys)
    }
}

impl fmt::Debug for AsyncStash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncStash")
            .field("engine", &self.engine_kind())
            .field("keys", &self.schema.len())
            .field("codec", &self.codec)
            .field("key_transform", &self.keys)
            .field("gate", &self.gate)
            .field("notifier", &self.notifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystash_core::{EngineError, StoredValue};
    use keystash_testkit::{FailingEngine, RawEngine};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new([("theme", json!("light")), ("count", json!(0))])
    }

    #[tokio::test]
    async fn unknown_key_is_rejected_before_touching_the_engine() {
        let raw = RawEngine::new();
        let stash = AsyncStash::new(
            schema(),
            [Some(AsyncCandidate::engine(raw.clone()))],
            StashOptions::new(),
        );
        assert!(matches!(
            stash.set("nope", json!(1)).await,
            Err(StashError::UnknownKey(_))
        ));
        assert_eq!(raw.writes(), 0);
    }

    #[tokio::test]
    async fn engine_errors_propagate_unchanged() {
        let stash = AsyncStash::new(
            schema(),
            [Some(AsyncCandidate::engine(FailingEngine::new(
                EngineError::QuotaExceeded,
            )))],
            StashOptions::new(),
        );
        assert!(matches!(
            stash.set("theme", json!("dark")).await,
            Err(StashError::Engine(EngineError::QuotaExceeded))
        ));
        assert!(matches!(
            stash.get("theme").await,
            Err(StashError::Engine(EngineError::QuotaExceeded))
        ));
    }

    #[tokio::test]
    async fn structured_engines_receive_values_directly() {
        let raw = RawEngine::structured();
        let stash = AsyncStash::new(
            schema(),
            [Some(AsyncCandidate::engine(raw.clone()))],
            StashOptions::new(),
        );
        stash.set("count", json!(3)).await.unwrap();
        assert_eq!(raw.raw("count"), Some(StoredValue::Structured(json!(3))));
        assert_eq!(stash.engine_kind(), Some("raw"));
    }
}
