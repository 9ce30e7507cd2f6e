//! Local key/value area engine
//!
//! A [`LocalArea`] is a process-wide string map shared by every engine built
//! on it. Each [`LocalEngine`] namespaces its keys as `"{name}_{key}"`, so
//! several stashes can share one area.

use async_trait::async_trait;
use keystash_core::{
    AsyncStorageEngine, EngineError, EngineResult, StoredValue, SyncStorageEngine,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

const PROBE_KEY: &str = "__keystash_probe__";

/// Shared string map backing local engines
#[derive(Debug, Clone, Default)]
pub struct LocalArea {
    inner: Arc<RwLock<AreaState>>,
}

#[derive(Debug, Default)]
struct AreaState {
    entries: HashMap<String, String>,
    quota_bytes: Option<usize>,
    disabled: bool,
}

impl AreaState {
    fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl LocalArea {
    /// Create an unbounded area
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an area that rejects writes once `quota_bytes` would be exceeded
    pub fn with_quota(quota_bytes: usize) -> Self {
        let area = Self::new();
        area.inner.write().quota_bytes = Some(quota_bytes);
        area
    }

    /// Create an area that refuses every operation, like a storage area
    /// blocked by the host environment
    pub fn disabled() -> Self {
        let area = Self::new();
        area.inner.write().disabled = true;
        area
    }

    /// Bytes currently used by keys and values
    pub fn used_bytes(&self) -> usize {
        self.inner.read().used_bytes()
    }

    /// Number of entries across every namespace
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether the area holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a raw entry
    pub fn set(&self, key: &str, value: String) -> EngineResult<()> {
        let mut state = self.inner.write();
        if state.disabled {
            return Err(EngineError::Unavailable);
        }
        if let Some(quota) = state.quota_bytes {
            let previous = state
                .entries
                .get(key)
                .map(|v| key.len() + v.len())
                .unwrap_or(0);
            let projected = state.used_bytes() - previous + key.len() + value.len();
            if projected > quota {
                return Err(EngineError::QuotaExceeded);
            }
        }
        state.entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Read a raw entry
    pub fn get(&self, key: &str) -> EngineResult<Option<String>> {
        let state = self.inner.read();
        if state.disabled {
            return Err(EngineError::Unavailable);
        }
        Ok(state.entries.get(key).cloned())
    }

    /// Remove a raw entry
    pub fn remove(&self, key: &str) -> EngineResult<()> {
        let mut state = self.inner.write();
        if state.disabled {
            return Err(EngineError::Unavailable);
        }
        state.entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> EngineResult<Vec<String>> {
        let state = self.inner.read();
        if state.disabled {
            return Err(EngineError::Unavailable);
        }
        let mut keys: Vec<String> = state
            .entries
            .keys()
            .filter_map(|k| k.strip_prefix(prefix).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Text-only engine over a namespaced slice of a [`LocalArea`]
#[derive(Debug, Clone)]
pub struct LocalEngine {
    area: LocalArea,
    prefix: String,
}

impl LocalEngine {
    /// Default namespace
    pub const DEFAULT_NAME: &'static str = "LS";

    /// Build an engine without checking the area
    pub fn new(area: LocalArea, name: &str) -> Self {
        Self {
            area,
            prefix: format!("{name}_"),
        }
    }

    /// Build an engine after a write/read probe of the area.
    ///
    /// Returns `None` when the area cannot round-trip a test entry.
    pub fn probe(area: LocalArea, name: &str) -> Option<Self> {
        let round_trip = area
            .set(PROBE_KEY, PROBE_KEY.to_string())
            .and_then(|()| area.get(PROBE_KEY))
            .and_then(|read| area.remove(PROBE_KEY).map(|()| read));

        match round_trip {
            Ok(Some(read)) if read == PROBE_KEY => Some(Self::new(area, name)),
            Ok(_) => {
                tracing::error!(engine = "local", "probe entry did not round-trip");
                None
            }
            Err(e) => {
                tracing::error!(engine = "local", error = %e, "local area unavailable");
                None
            }
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// The backing area
    pub fn area(&self) -> &LocalArea {
        &self.area
    }
}

impl SyncStorageEngine for LocalEngine {
    fn kind(&self) -> &str {
        "local"
    }

    fn set_item(&self, key: &str, value: StoredValue) -> EngineResult<()> {
        self.area.set(&self.full_key(key), value.into_text())
    }

    fn get_item(&self, key: &str) -> EngineResult<Option<StoredValue>> {
        Ok(self.area.get(&self.full_key(key))?.map(StoredValue::Text))
    }

    fn remove_item(&self, key: &str) -> EngineResult<()> {
        self.area.remove(&self.full_key(key))
    }

    fn keys(&self) -> EngineResult<Vec<String>> {
        self.area.keys_with_prefix(&self.prefix)
    }

    fn clear(&self) -> EngineResult<()> {
        for key in self.area.keys_with_prefix(&self.prefix)? {
            self.area.remove(&self.full_key(&key))?;
        }
        Ok(())
    }
}

#[async_trait]
impl AsyncStorageEngine for LocalEngine {
    fn kind(&self) -> &str {
        "local"
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
