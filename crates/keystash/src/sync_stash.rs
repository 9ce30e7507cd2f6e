//! Synchronous storage façade

use keystash_core::SyncStorageEngine;
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
use crate::schema::Schema;
use crate::select::{select, select_named, EngineInit, EngineRegistry, SyncCandidate};

/// Typed key/value stash over one [`SyncStorageEngine`].
///
/// Same contract as [`AsyncStash`](crate::AsyncStash) without awaiting and
/// without a readiness gate.
///
/// The default [`TokioScheduler`](crate::TokioScheduler) flushes inline when
/// no tokio runtime is running, so a stash used outside a runtime notifies
/// once per write. Pass a [`ManualScheduler`](crate::ManualScheduler) through
/// [`StashOptions::with_scheduler`] to batch writes there.
pub struct SyncStash {
    schema: Schema,
    engine: Option<Arc<dyn SyncStorageEngine>>,
    codec: Codec,
    keys: KeyTransform,
    notifier: ChangeNotifier,
}

impl SyncStash {
    /// Select an engine from `candidates` and build the stash
    pub fn new<I>(schema: Schema, candidates: I, options: StashOptions) -> Self
    where
        I: IntoIterator<Item = Option<SyncCandidate>>,
    {
        let engine = select(candidates, options.selection());
        Self::with_engine(schema, engine, options)
    }

    /// Build the stash from engines registered under `names`
    pub fn from_registry(
        schema: Schema,
        registry: &EngineRegistry<dyn SyncStorageEngine>,
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
        engine: Option<Arc<dyn SyncStorageEngine>>,
        options: StashOptions,
    ) -> Self {
        Self {
            schema,
            engine,
            codec: options.codec(),
            keys: options.key_transform(),
            notifier: options.notifier(),
        }
    }

    fn engine(&self) -> StashResult<&Arc<dyn SyncStorageEngine>> {
        self.engine.as_ref().ok_or(StashError::NoEngine)
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
    pub fn get(&self, key: &str) -> StashResult<Value> {
        let engine = self.engine()?;
        let default = self.schema.default_for(key)?;
        let stored = engine.get_item(&self.keys.derive_key(key))?;
        Ok(self.codec.decode(key, stored, default))
    }

    /// Write `value` under `key`, then notify subscribers
    pub fn set(&self, key: &str, value: Value) -> StashResult<()> {
        let engine = self.engine()?;
        self.schema.check(key)?;

        let value = if self.codec.is_increment(key) {
            self.codec.merge(key, self.get(key)?, value)
        } else {
            value
        };
        let stored = self
            .codec
            .encode(value, engine.supports_structured_values())?;
        engine.set_item(&self.keys.derive_key(key), stored)?;

        self.notifier.publish(key);
        Ok(())
    }

    /// Remove `key`, then notify subscribers
    pub fn remove(&self, key: &str) -> StashResult<()> {
        let engine = self.engine()?;
        self.schema.check(key)?;
        engine.remove_item(&self.keys.derive_key(key))?;
        self.notifier.publish(key);
        Ok(())
    }

    /// Read `key` as `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StashResult<T> {
        Ok(serde_json::from_value(self.get(key)?)?)
    }

    /// Write a serializable `value` under `key`
    pub fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StashResult<()> {
        self.set(key, serde_json::to_value(value)?)
    }

    /// Schema keys that currently have a stored value
    pub fn keys(&self) -> StashResult<Vec<String>> {
        let engine_keys = self.engine()?.keys()?;
        Ok(self.keys.reverse_lookup(&engine_keys, &self.schema))
    }

    /// Remove every schema key; subscribers see one batch.
    ///
    /// When a removal fails, the keys removed before it are still published.
    pub fn clear(&self) -> StashResult<()> {
        let engine = self.engine()?;
        let mut removed = Vec::with_capacity(self.schema.len());
        for key in self.schema.keys() {
            if let Err(e) = engine.remove_item(&self.keys.derive_key(key)) {
                self.notifier.publish_all(removed);
                return Err(e.into());
            }
            removed.push(key);
        }
        self.notifier.publish_all(removed);
        Ok(())
    }

    /// Call `callback` now and after every flush touching `keys`
    pub fn subscribe<F>(&self, callback: F, keys: Option<&[&str]>) -> Option<Unsubscribe>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback, keys)
    }
}

impl fmt::Debug for SyncStash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncStash")
            .field("engine", &self.engine_kind())
            .field("keys", &self.schema.len())
            .field("codec", &self.codec)
            .field("key_transform", &self.keys)
            .field("notifier", &self.notifier)
            .finish()
    }
}
