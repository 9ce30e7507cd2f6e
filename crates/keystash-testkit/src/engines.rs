//! Scripted engines
//!
//! - [`RawEngine`]: in-memory map whose stored values tests can seed and inspect
//! - [`GatedEngine`]: a [`RawEngine`] with a ready hook released by a [`ReadyTrigger`]
//! - [`FailingEngine`]: every operation fails with a chosen error

use async_trait::async_trait;
use keystash_core::{
    AsyncStorageEngine, EngineError, EngineResult, StoredValue, SyncStorageEngine,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Default)]
struct RawState {
    entries: BTreeMap<String, StoredValue>,
    writes: usize,
    /// Removals still allowed before `remove_item` starts failing
    removals_left: Option<usize>,
}

/// In-memory engine exposing its stored values.
///
/// Clones share state, so a test can keep a handle after giving the engine to
/// a stash.
#[derive(Debug, Clone, Default)]
pub struct RawEngine {
    state: Arc<Mutex<RawState>>,
    structured: bool,
}

impl RawEngine {
    /// Text-only engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine declaring structured value support
    pub fn structured() -> Self {
        Self {
            structured: true,
            ..Self::default()
        }
    }

    /// Let `count` removals succeed, then fail every later one
    pub fn fail_removals_after(self, count: usize) -> Self {
        self.state.lock().removals_left = Some(count);
        self
    }

    /// Store `value` under the engine key `key`, bypassing the façade
    pub fn seed(&self, key: &str, value: impl Into<StoredValue>) {
        self.state
            .lock()
            .entries
            .insert(key.to_string(), value.into());
    }

    /// Value stored under the engine key `key`
    pub fn raw(&self, key: &str) -> Option<StoredValue> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Engine keys currently stored
    pub fn engine_keys(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    /// Number of successful `set_item` calls
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }
}

impl SyncStorageEngine for RawEngine {
    fn kind(&self) -> &str {
        "raw"
    }

    fn supports_structured_values(&self) -> bool {
        self.structured
    }

    fn set_item(&self, key: &str, value: StoredValue) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.entries.insert(key.to_string(), value);
        state.writes += 1;
        Ok(())
    }

    fn get_item(&self, key: &str) -> EngineResult<Option<StoredValue>> {
        Ok(self.raw(key))
    }

    fn remove_item(&self, key: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        match &mut state.removals_left {
            Some(0) => return Err(EngineError::Failed("removal refused".to_string())),
            Some(left) => *left -= 1,
            None => {}
        }
        state.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> EngineResult<Vec<String>> {
        Ok(self.engine_keys())
    }

    fn clear(&self) -> EngineResult<()> {
        self.state.lock().entries.clear();
        Ok(())
    }
}

#[async_trait]
impl AsyncStorageEngine for RawEngine {
    fn kind(&self) -> &str {
        "raw"
    }

    fn supports_structured_values(&self) -> bool {
        self.structured
    }

    async fn set_item(&self, key: &str, value: StoredValue) -> EngineResult<()> {
        SyncStorageEngine::set_item(self, key, value)
    }

    async fn get_item(&self, key: &str) -> EngineResult<Option<StoredValue>> {
        SyncStorageEngine::get_item(self, key)
    }

    async fn remove_item(&self, key: &str) -> EngineResult<()> {
        SyncStorageEngine::remove_item(self, key)
    }

    async fn keys(&self) -> EngineResult<Vec<String>> {
        SyncStorageEngine::keys(self)
    }

    async fn clear(&self) -> EngineResult<()> {
        SyncStorageEngine::clear(self)
    }
}

/// Releases a [`GatedEngine`]'s ready hook
#[derive(Debug, Clone)]
pub struct ReadyTrigger {
    ready: Arc<watch::Sender<bool>>,
}

impl ReadyTrigger {
    /// Let `on_ready` resolve
    pub fn release(&self) {
        self.ready.send_replace(true);
    }
}

/// In-memory engine that becomes ready only when its trigger fires.
///
/// Data operations work before readiness, like an engine that queues calls
/// until its handle exists.
#[derive(Debug, Clone)]
pub struct GatedEngine {
    store: RawEngine,
    ready: Arc<watch::Sender<bool>>,
}

impl GatedEngine {
    /// Create the engine and the trigger releasing it
    pub fn new() -> (Self, ReadyTrigger) {
        let (ready, _) = watch::channel(false);
        let ready = Arc::new(ready);
        (
            Self {
                store: RawEngine::new(),
                ready: ready.clone(),
            },
            ReadyTrigger { ready },
        )
    }

    /// Backing store, for inspection
    pub fn store(&self) -> &RawEngine {
        &self.store
    }
}

#[async_trait]
impl AsyncStorageEngine for GatedEngine {
    fn kind(&self) -> &str {
        "gated"
    }

    fn has_ready_hook(&self) -> bool {
        true
    }

    async fn on_ready(&self) {
        let mut rx = self.ready.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }

    async fn set_item(&self, key: &str, value: StoredValue) -> EngineResult<()> {
        SyncStorageEngine::set_item(&self.store, key, value)
    }

    async fn get_item(&self, key: &str) -> EngineResult<Option<StoredValue>> {
        SyncStorageEngine::get_item(&self.store, key)
    }

    async fn remove_item(&self, key: &str) -> EngineResult<()> {
        SyncStorageEngine::remove_item(&self.store, key)
    }
}

/// Engine whose every operation fails
#[derive(Debug, Clone)]
pub struct FailingEngine {
    error: EngineError,
    supported: bool,
}

impl FailingEngine {
    /// Fail every operation with `error`
    pub fn new(error: EngineError) -> Self {
        Self {
            error,
            supported: true,
        }
    }

    /// Engine whose support probe reports it unusable
    pub fn unsupported() -> Self {
        Self {
            error: EngineError::Unavailable,
            supported: false,
        }
    }
}

impl SyncStorageEngine for FailingEngine {
    fn kind(&self) -> &str {
        "failing"
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn set_item(&self, _key: &str, _value: StoredValue) -> EngineResult<()> {
        Err(self.error.clone())
    }

    fn get_item(&self, _key: &str) -> EngineResult<Option<StoredValue>> {
        Err(self.error.clone())
    }

    fn remove_item(&self, _key: &str) -> EngineResult<()> {
        Err(self.error.clone())
    }
}

#[async_trait]
impl AsyncStorageEngine for FailingEngine {
    fn kind(&self) -> &str {
        "failing"
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn set_item(&self, _key: &str, _value: StoredValue) -> EngineResult<()> {
        Err(self.error.clone())
    }

    async fn get_item(&self, _key: &str) -> EngineResult<Option<StoredValue>> {
        Err(self.error.clone())
    }

    async fn remove_item(&self, _key: &str) -> EngineResult<()> {
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_releases_gated_engine() {
        let (engine, trigger) = GatedEngine::new();
        AsyncStorageEngine::set_item(&engine, "k", "v".into()).await.unwrap();
        trigger.release();
        engine.on_ready().await;
        assert_eq!(engine.store().raw("k"), Some(StoredValue::Text("v".into())));
    }

    #[test]
    fn raw_engine_clones_share_entries() {
        let engine = RawEngine::new();
        let handle = engine.clone();
        SyncStorageEngine::set_item(&engine, "k", "v".into()).unwrap();
        assert_eq!(handle.writes(), 1);
        assert_eq!(handle.engine_keys(), vec!["k".to_string()]);
    }

    #[test]
    fn removals_fail_once_the_allowance_is_spent() {
        let engine = RawEngine::new().fail_removals_after(1);
        engine.seed("a", "1");
        engine.seed("b", "2");
        SyncStorageEngine::remove_item(&engine, "a").unwrap();
        assert!(SyncStorageEngine::remove_item(&engine, "b").is_err());
        assert_eq!(engine.engine_keys(), vec!["b".to_string()]);
    }
}
