//! File-backed object store engine
//!
//! Models an object database: a named, versioned file holding one or more
//! object stores. Opening is asynchronous. A missing file or an older stored
//! version runs the upgrade step, which creates the configured store; a newer
//! stored version fails the open.
//!
//! Until the open completes, operations either wait for it
//! (`queue_before_open`, the default) or fail with [`EngineError::NotReady`].

use async_trait::async_trait;
use keystash_core::{AsyncStorageEngine, EngineError, EngineResult, StoredValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, MutexGuard};

/// Open parameters for an [`ObjectStoreEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreOptions {
    /// Directory holding database files
    pub dir: PathBuf,
    /// Database name; the file is `{dir}/{name}.db.json`
    pub name: String,
    /// Requested schema version
    pub version: u32,
    /// Object store used for every entry
    pub store_name: String,
    /// Wait for the open handshake instead of failing with `NotReady`
    pub queue_before_open: bool,
}

impl ObjectStoreOptions {
    /// Default database and store name
    pub const DEFAULT_NAME: &'static str = "keystash";

    /// Options for the default database under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            name: Self::DEFAULT_NAME.to_string(),
            version: 1,
            store_name: Self::DEFAULT_NAME.to_string(),
            queue_before_open: true,
        }
    }

    /// Set the database name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the requested schema version
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the object store name
    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = store_name.into();
        self
    }

    /// Choose between queueing and `NotReady` before the open completes
    pub fn with_queue_before_open(mut self, queue: bool) -> Self {
        self.queue_before_open = queue;
        self
    }

    fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.db.json", self.name))
    }
}

/// On-disk database layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DatabaseFile {
    version: u32,
    stores: BTreeMap<String, BTreeMap<String, StoredValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum OpenState {
    Opening,
    Open,
    Failed(String),
}

#[derive(Debug)]
struct Shared {
    options: ObjectStoreOptions,
    path: PathBuf,
    state: watch::Sender<OpenState>,
    db: Mutex<Option<DatabaseFile>>,
}

/// Structured-value engine over a versioned database file
#[derive(Debug, Clone)]
pub struct ObjectStoreEngine {
    shared: Arc<Shared>,
}

impl ObjectStoreEngine {
    /// Start opening the database described by `options`.
    ///
    /// Returns `None` outside a tokio runtime, where the open handshake cannot
    /// be driven.
    pub fn open(options: ObjectStoreOptions) -> Option<Self> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::error!(
                    engine = "object_store",
                    "no async runtime available to open the object store"
                );
                return None;
            }
        };

        let (state, _) = watch::channel(OpenState::Opening);
        let shared = Arc::new(Shared {
            path: options.path(),
            options,
            state,
            db: Mutex::new(None),
        });

        let task_shared = shared.clone();
        handle.spawn(async move {
            match handshake(&task_shared).await {
                Ok(db) => {
                    *task_shared.db.lock().await = Some(db);
                    task_shared.state.send_replace(OpenState::Open);
                    tracing::debug!(
                        engine = "object_store",
                        path = %task_shared.path.display(),
                        "object store open"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        engine = "object_store",
                        path = %task_shared.path.display(),
                        error = %e,
                        "failed to open object store"
                    );
                    task_shared.state.send_replace(OpenState::Failed(e.to_string()));
                }
            }
        });

        Some(Self { shared })
    }

    /// Whether the open handshake has completed successfully
    pub fn is_open(&self) -> bool {
        *self.shared.state.borrow() == OpenState::Open
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    async fn open_db(&self) -> EngineResult<MutexGuard<'_, Option<DatabaseFile>>> {
        let current = self.shared.state.borrow().clone();
        let state = match current {
            OpenState::Opening if self.shared.options.queue_before_open => {
                let mut rx = self.shared.state.subscribe();
                let settled = rx
                    .wait_for(|state| *state != OpenState::Opening)
                    .await
                    .map_err(|_| EngineError::Unavailable)?;
                settled.clone()
            }
            OpenState::Opening => return Err(EngineError::NotReady),
            other => other,
        };

        match state {
            OpenState::Open => Ok(self.shared.db.lock().await),
            _ => Err(EngineError::Unavailable),
        }
    }

    fn store<'a>(
        &self,
        db: &'a Option<DatabaseFile>,
    ) -> EngineResult<&'a BTreeMap<String, StoredValue>> {
        db.as_ref()
            .ok_or(EngineError::Unavailable)?
            .stores
            .get(&self.shared.options.store_name)
            .ok_or_else(store_not_found)
    }

    /// Apply `change` to a copy of the database and keep it only once it is
    /// on disk. `change` returns whether anything changed.
    async fn update<F>(&self, change: F) -> EngineResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, StoredValue>) -> bool + Send,
    {
        let mut db = self.open_db().await?;
        let mut next = db.clone().ok_or(EngineError::Unavailable)?;
        let store = next
            .stores
            .get_mut(&self.shared.options.store_name)
            .ok_or_else(store_not_found)?;
        if !change(store) {
            return Ok(());
        }

        persist(&self.shared.path, &next).await?;
        *db = Some(next);
        Ok(())
    }
}

fn store_not_found() -> EngineError {
    EngineError::Failed("object store not found".to_string())
}

async fn handshake(shared: &Shared) -> EngineResult<DatabaseFile> {
    let options = &shared.options;
    tokio::fs::create_dir_all(&options.dir).await?;

    let mut db = match tokio::fs::read(&shared.path).await {
        Ok(bytes) => serde_json::from_slice::<DatabaseFile>(&bytes)
            .map_err(|e| EngineError::Corrupt(e.to_string()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => DatabaseFile::default(),
        Err(e) => return Err(e.into()),
    };

    if db.version > options.version {
        return Err(EngineError::Failed(format!(
            "stored version {} is newer than requested version {}",
            db.version, options.version
        )));
    }

    if db.version < options.version {
        tracing::info!(
            engine = "object_store",
            from = db.version,
            to = options.version,
            store = %options.store_name,
            "upgrading object store"
        );
        db.stores.entry(options.store_name.clone()).or_default();
        db.version = options.version;
        persist(&shared.path, &db).await?;
    }

    Ok(db)
}

async fn persist(path: &Path, db: &DatabaseFile) -> EngineResult<()> {
    let bytes = serde_json::to_vec_pretty(db).map_err(|e| EngineError::Failed(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl AsyncStorageEngine for ObjectStoreEngine {
    fn kind(&self) -> &str {
        "object_store"
    }

    fn supports_structured_values(&self) -> bool {
        true
    }

    fn has_ready_hook(&self) -> bool {
        true
    }

    async fn on_ready(&self) {
        let mut rx = self.shared.state.subscribe();
        let opened = rx.wait_for(|state| *state == OpenState::Open).await.is_ok();
        // a failed open never becomes ready
        if !opened {
            std::future::pending::<()>().await;
        }
    }

    async fn set_item(&self, key: &str, value: StoredValue) -> EngineResult<()> {
        self.update(|store| {
            store.insert(key.to_string(), value);
            true
        })
        .await
    }

    async fn get_item(&self, key: &str) -> EngineResult<Option<StoredValue>> {
        let db = self.open_db().await?;
        Ok(self.store(&db)?.get(key).cloned())
    }

    async fn remove_item(&self, key: &str) -> EngineResult<()> {
        self.update(|store| store.remove(key).is_some()).await
    }

    async fn keys(&self) -> EngineResult<Vec<String>> {
        let db = self.open_db().await?;
        Ok(self.store(&db)?.keys().cloned().collect())
    }

    async fn clear(&self) -> EngineResult<()> {
        self.update(|store| {
            let changed = !store.is_empty();
            store.clear();
            changed
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn values_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ObjectStoreEngine::open(ObjectStoreOptions::new(dir.path())).unwrap();
        engine.on_ready().await;
        assert!(engine.is_open());

        engine
            .set_item("obj", StoredValue::Structured(json!({"a": 1})))
            .await
            .unwrap();
        engine.set_item("num", "123".into()).await.unwrap();
        drop(engine);

        let reopened = ObjectStoreEngine::open(ObjectStoreOptions::new(dir.path())).unwrap();
        assert_eq!(
            reopened.get_item("obj").await.unwrap(),
            Some(StoredValue::Structured(json!({"a": 1})))
        );
        // text stays text, it is not re-parsed as a number
        assert_eq!(
            reopened.get_item("num").await.unwrap(),
            Some(StoredValue::Text("123".into()))
        );
        assert_eq!(
            reopened.keys().await.unwrap(),
            vec!["num".to_string(), "obj".to_string()]
        );
    }

    #[tokio::test]
    async fn operations_queue_until_open() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ObjectStoreEngine::open(ObjectStoreOptions::new(dir.path())).unwrap();
        assert!(!engine.is_open());

        engine.set_item("early", "1".into()).await.unwrap();
        assert!(engine.is_open());
        assert_eq!(
            engine.get_item("early").await.unwrap(),
            Some(StoredValue::Text("1".into()))
        );
    }

    #[tokio::test]
    async fn not_ready_when_queueing_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ObjectStoreEngine::open(
            ObjectStoreOptions::new(dir.path()).with_queue_before_open(false),
        )
        .unwrap();

        assert_eq!(
            engine.set_item("k", "v".into()).await,
            Err(EngineError::NotReady)
        );

        engine.on_ready().await;
        engine.set_item("k", "v".into()).await.unwrap();
    }

    #[tokio::test]
    async fn newer_stored_version_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let v2 = ObjectStoreEngine::open(ObjectStoreOptions::new(dir.path()).with_version(2))
            .unwrap();
        v2.on_ready().await;
        drop(v2);

        let v1 = ObjectStoreEngine::open(ObjectStoreOptions::new(dir.path())).unwrap();
        assert_eq!(v1.get_item("k").await, Err(EngineError::Unavailable));
        assert!(tokio::time::timeout(Duration::from_millis(50), v1.on_ready())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn upgrade_creates_new_store_and_keeps_old_ones() {
        let dir = tempfile::tempdir().unwrap();
        let options = ObjectStoreOptions::new(dir.path()).with_store_name("a");
        let a = ObjectStoreEngine::open(options.clone()).unwrap();
        a.set_item("k", "from a".into()).await.unwrap();
        drop(a);

        let b = ObjectStoreEngine::open(options.clone().with_version(2).with_store_name("b"))
            .unwrap();
        b.set_item("k", "from b".into()).await.unwrap();
        drop(b);

        let a_again = ObjectStoreEngine::open(options.clone().with_version(2)).unwrap();
        assert_eq!(
            a_again.get_item("k").await.unwrap(),
            Some(StoredValue::Text("from a".into()))
        );

        // same version, so no upgrade runs and the store is never created
        let missing = ObjectStoreEngine::open(options.with_version(2).with_store_name("c"))
            .unwrap();
        assert_eq!(
            missing.get_item("k").await,
            Err(EngineError::Failed("object store not found".into()))
        );
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ObjectStoreEngine::open(ObjectStoreOptions::new(dir.path())).unwrap();
        engine.set_item("a", "1".into()).await.unwrap();
        engine.set_item("b", "2".into()).await.unwrap();

        engine.remove_item("a").await.unwrap();
        assert_eq!(engine.get_item("a").await.unwrap(), None);

        engine.clear().await.unwrap();
        assert!(engine.keys().await.unwrap().is_empty());
    }

    #[test]
    fn open_without_runtime_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ObjectStoreEngine::open(ObjectStoreOptions::new(dir.path())).is_none());
    }

    #[tokio::test]
    async fn failed_persist_leaves_the_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ObjectStoreEngine::open(ObjectStoreOptions::new(dir.path())).unwrap();
        engine.set_item("kept", "1".into()).await.unwrap();

        // a directory in the temp file's place makes every write fail
        let tmp = engine.path().with_extension("json.tmp");
        std::fs::create_dir(&tmp).unwrap();

        assert!(matches!(
            engine.set_item("k", "v".into()).await,
            Err(EngineError::Io(_))
        ));
        assert!(engine.remove_item("kept").await.is_err());
        assert!(engine.clear().await.is_err());
        assert_eq!(engine.get_item("k").await.unwrap(), None);
        assert_eq!(engine.keys().await.unwrap(), vec!["kept".to_string()]);

        std::fs::remove_dir(&tmp).unwrap();
        engine.set_item("other", "2".into()).await.unwrap();
        drop(engine);

        let reopened = ObjectStoreEngine::open(ObjectStoreOptions::new(dir.path())).unwrap();
        assert_eq!(
            reopened.keys().await.unwrap(),
            vec!["kept".to_string(), "other".to_string()]
        );
    }
}
