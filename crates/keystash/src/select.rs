//! Engine selection
//!
//! A stash is built from an ordered list of candidates: ready engines or lazy
//! factories that return `None` when their medium is unavailable. Selection
//! picks exactly one engine (or none) at construction.
//!
//! Engines can also be named through an [`EngineRegistry`] injected by the
//! caller; there is no process-wide registry.

use indexmap::IndexMap;
use keystash_core::{AsyncStorageEngine, SyncStorageEngine};
use keystash_effects::{
    CookieEngine, CookieJar, LocalArea, LocalEngine, ObjectStoreEngine, ObjectStoreOptions,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// How candidates are resolved into the selected engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// Resolve candidates in order and take the first one whose support probe
    /// passes
    #[default]
    ProbeSupport,
    /// Take whatever the first candidate resolves to, without probing
    FirstCandidate,
}

/// Support probe shared by both engine contracts
pub trait Probe {
    /// Engine name for logs
    fn engine_kind(&self) -> &str;

    /// Whether the engine is usable here
    fn probe(&self) -> bool;
}

impl Probe for dyn AsyncStorageEngine {
    fn engine_kind(&self) -> &str {
        self.kind()
    }

    fn probe(&self) -> bool {
        self.is_supported()
    }
}

impl Probe for dyn SyncStorageEngine {
    fn engine_kind(&self) -> &str {
        self.kind()
    }

    fn probe(&self) -> bool {
        self.is_supported()
    }
}

/// One entry of the candidate list
pub enum EngineCandidate<E: ?Sized> {
    /// A constructed engine
    Instance(Arc<E>),
    /// A factory run during selection; `None` when unavailable
    Factory(Box<dyn FnOnce() -> Option<Arc<E>> + Send>),
}

/// Candidate for [`AsyncStash`](crate::AsyncStash)
pub type AsyncCandidate = EngineCandidate<dyn AsyncStorageEngine>;

/// Candidate for [`SyncStash`](crate::SyncStash)
pub type SyncCandidate = EngineCandidate<dyn SyncStorageEngine>;

impl<E: ?Sized> EngineCandidate<E> {
    fn resolve(self) -> Option<Arc<E>> {
        match self {
            Self::Instance(engine) => Some(engine),
            Self::Factory(factory) => factory(),
        }
    }
}

impl EngineCandidate<dyn AsyncStorageEngine> {
    /// Wrap a constructed engine
    pub fn engine<T: AsyncStorageEngine + 'static>(engine: T) -> Self {
        Self::Instance(Arc::new(engine))
    }

    /// Wrap a lazy engine factory
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: AsyncStorageEngine + 'static,
        F: FnOnce() -> Option<T> + Send + 'static,
    {
        Self::Factory(Box::new(move || {
            factory().map(|engine| Arc::new(engine) as Arc<dyn AsyncStorageEngine>)
        }))
    }
}

impl EngineCandidate<dyn SyncStorageEngine> {
    /// Wrap a constructed engine
    pub fn engine<T: SyncStorageEngine + 'static>(engine: T) -> Self {
        Self::Instance(Arc::new(engine))
    }

    /// Wrap a lazy engine factory
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: SyncStorageEngine + 'static,
        F: FnOnce() -> Option<T> + Send + 'static,
    {
        Self::Factory(Box::new(move || {
            factory().map(|engine| Arc::new(engine) as Arc<dyn SyncStorageEngine>)
        }))
    }
}

impl<E: ?Sized> fmt::Debug for EngineCandidate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(_) => f.write_str("EngineCandidate::Instance"),
            Self::Factory(_) => f.write_str("EngineCandidate::Factory"),
        }
    }
}

/// Pick one engine from `candidates`. `None` entries are discarded first.
pub fn select<E, I>(candidates: I, strategy: SelectionStrategy) -> Option<Arc<E>>
where
    E: ?Sized + Probe,
    I: IntoIterator<Item = Option<EngineCandidate<E>>>,
{
    let mut candidates = candidates.into_iter().flatten();
    let selected = match strategy {
        SelectionStrategy::FirstCandidate => candidates.next().and_then(EngineCandidate::resolve),
        SelectionStrategy::ProbeSupport => candidates
            .filter_map(EngineCandidate::resolve)
            .find(|engine| {
                let supported = engine.probe();
                if !supported {
                    tracing::debug!(engine = engine.engine_kind(), "engine not supported, skipping");
                }
                supported
            }),
    };

    match &selected {
        Some(engine) => {
            tracing::debug!(engine = engine.engine_kind(), ?strategy, "engine selected");
        }
        None => tracing::warn!(?strategy, "no storage engine selected"),
    }
    selected
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters handed to registered engine factories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInit {
    /// Namespace or database name
    pub name: String,
    /// Object store name, for engines that have one
    pub store_name: String,
}

impl Default for EngineInit {
    fn default() -> Self {
        Self {
            name: ObjectStoreOptions::DEFAULT_NAME.to_string(),
            store_name: ObjectStoreOptions::DEFAULT_NAME.to_string(),
        }
    }
}

impl EngineInit {
    /// Init parameters with `name` for both the namespace and the store
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            store_name: name.clone(),
            name,
        }
    }
}

/// Registered engine factory
pub type EngineFactory<E> = Arc<dyn Fn(&EngineInit) -> Option<Arc<E>> + Send + Sync>;

/// Named engine factories
pub struct EngineRegistry<E: ?Sized> {
    factories: IndexMap<String, EngineFactory<E>>,
}

impl<E: ?Sized> Default for EngineRegistry<E> {
    fn default() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }
}

impl<E: ?Sized + 'static> EngineRegistry<E> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any previous entry
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&EngineInit) -> Option<Arc<E>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Lazy candidate for `name`; `None` when unregistered
    pub fn candidate(&self, name: &str, init: &EngineInit) -> Option<EngineCandidate<E>> {
        let Some(factory) = self.factories.get(name) else {
            tracing::warn!(engine = name, "engine is not registered");
            return None;
        };
        let factory = factory.clone();
        let init = init.clone();
        Some(EngineCandidate::Factory(Box::new(move || factory(&init))))
    }
}

impl EngineRegistry<dyn AsyncStorageEngine> {
    /// Registry of the bundled async engines: `local`, `object_store` and
    /// `cookie`
    pub fn bundled_async(area: LocalArea, jar: CookieJar, object_dir: impl Into<PathBuf>) -> Self {
        let object_dir = object_dir.into();
        let mut registry = Self::new();
        registry
            .register("local", move |init| {
                LocalEngine::probe(area.clone(), &init.name)
                    .map(|engine| Arc::new(engine) as Arc<dyn AsyncStorageEngine>)
            })
            .register("object_store", move |init| {
                let options = ObjectStoreOptions::new(object_dir.clone())
                    .with_name(init.name.clone())
                    .with_store_name(init.store_name.clone());
                ObjectStoreEngine::open(options)
                    .map(|engine| Arc::new(engine) as Arc<dyn AsyncStorageEngine>)
            })
            .register("cookie", move |_| {
                CookieEngine::probe(jar.clone())
                    .map(|engine| Arc::new(engine) as Arc<dyn AsyncStorageEngine>)
            });
        registry
    }
}

impl EngineRegistry<dyn SyncStorageEngine> {
    /// Registry of the bundled sync engines: `local` and `cookie`
    pub fn bundled_sync(area: LocalArea, jar: CookieJar) -> Self {
        let mut registry = Self::new();
        registry
            .register("local", move |init| {
                LocalEngine::probe(area.clone(), &init.name)
                    .map(|engine| Arc::new(engine) as Arc<dyn SyncStorageEngine>)
            })
            .register("cookie", move |_| {
                CookieEngine::probe(jar.clone())
                    .map(|engine| Arc::new(engine) as Arc<dyn SyncStorageEngine>)
            });
        registry
    }
}

impl<E: ?Sized> fmt::Debug for EngineRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Run selection over registered engines, in the order of `names`
pub fn select_named<E>(
    registry: &EngineRegistry<E>,
    names: &[&str],
    init: &EngineInit,
    strategy: SelectionStrategy,
) -> Option<Arc<E>>
where
    E: ?Sized + Probe + 'static,
{
    select(
        names.iter().map(|name| registry.candidate(name, init)),
        strategy,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystash_testkit::{FailingEngine, RawEngine};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn probe_support_skips_unsupported_and_unavailable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let candidates = vec![
            None,
            Some(AsyncCandidate::factory(|| None::<RawEngine>)),
            Some(AsyncCandidate::engine(FailingEngine::unsupported())),
            Some(AsyncCandidate::engine(RawEngine::structured())),
            Some(AsyncCandidate::factory(move || {
                counted.fetch_add(1, Ordering::SeqCst);
                Some(RawEngine::new())
            })),
        ];

        let engine = select(candidates, SelectionStrategy::ProbeSupport).unwrap();
        assert!(engine.supports_structured_values());
        // later factories are never run
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn first_candidate_does_not_fall_back() {
        let candidates = vec![
            None,
            Some(AsyncCandidate::factory(|| None::<RawEngine>)),
            Some(AsyncCandidate::engine(RawEngine::new())),
        ];
        assert!(select(candidates, SelectionStrategy::FirstCandidate).is_none());

        let candidates = vec![
            Some(AsyncCandidate::engine(FailingEngine::unsupported())),
            Some(AsyncCandidate::engine(RawEngine::new())),
        ];
        let engine = select(candidates, SelectionStrategy::FirstCandidate).unwrap();
        assert_eq!(engine.kind(), "failing");
    }

    #[test]
    fn empty_list_selects_nothing() {
        let none: Vec<Option<SyncCandidate>> = vec![None, None];
        assert!(select(none, SelectionStrategy::ProbeSupport).is_none());
    }

    #[test]
    fn registry_resolves_names_in_order() {
        let mut registry = EngineRegistry::<dyn SyncStorageEngine>::new();
        registry
            .register("broken", |_| {
                Some(Arc::new(FailingEngine::unsupported()) as Arc<dyn SyncStorageEngine>)
            })
            .register("raw", |_| {
                Some(Arc::new(RawEngine::new()) as Arc<dyn SyncStorageEngine>)
            });

        let init = EngineInit::default();
        let engine = select_named(
            &registry,
            &["missing", "broken", "raw"],
            &init,
            SelectionStrategy::ProbeSupport,
        )
        .unwrap();
        assert_eq!(engine.kind(), "raw");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["broken", "raw"]);
    }

    #[test]
    fn bundled_sync_registry_prefers_local() {
        let registry = EngineRegistry::bundled_sync(LocalArea::disabled(), CookieJar::new());
        let engine = select_named(
            &registry,
            &["local", "cookie"],
            &EngineInit::named("app"),
            SelectionStrategy::ProbeSupport,
        )
        .unwrap();
        assert_eq!(engine.kind(), "cookie");
    }
}
