//! # Keystash - Storage Façade
//!
//! **Purpose**: Put one typed key/value interface over whichever storage
//! engine is usable, with optional encryption, key hashing and debounced
//! change notification.
//!
//! # Architecture Constraints
//!
//! - YES engine selection and the injected engine registry
//! - YES readiness gate over asynchronous engine initialization
//! - YES value codec (JSON envelope, encryption, increment merge)
//! - YES change notification with pluggable flush scheduling
//! - NO concrete engines or crypto primitives (those live in `keystash-effects`)
//!
//! ## Data flow
//!
//! - `set(key, value)`: schema check, increment merge, encode, engine write,
//!   publish `key`
//! - `get(key)`: engine read, decode, fall back to the schema default
//!
//! ## Example
//!
//! ```rust,no_run
//! use keystash::{AsyncCandidate, AsyncStash, Schema, StashOptions};
//! use keystash::effects::{LocalArea, LocalEngine};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), keystash::StashError> {
//! let stash = AsyncStash::new(
//!     Schema::new([("theme", json!("light"))]),
//!     [Some(AsyncCandidate::factory(|| {
//!         LocalEngine::probe(LocalArea::new(), LocalEngine::DEFAULT_NAME)
//!     }))],
//!     StashOptions::new().with_secret_key("passphrase"),
//! );
//! stash.on_ready().await;
//! stash.set("theme", json!("dark")).await?;
//! assert_eq!(stash.get("theme").await?, json!("dark"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod async_stash;
mod sync_stash;

/// Value codec
pub mod codec;

/// Stash error type
pub mod errors;

/// Logical to engine key mapping
pub mod keys;

/// Change notification and flush scheduling
pub mod notify;

/// Options and configuration files
pub mod options;

/// Readiness gate
pub mod ready;

/// Stash schema
pub mod schema;

/// Engine selection and registry
pub mod select;

pub use async_stash::AsyncStash;
pub use errors::{StashError, StashResult};
pub use notify::{
    Callback, ChangeNotifier, FlushScheduler, ManualScheduler, SubscriptionId, TokioScheduler,
    Unsubscribe,
};
pub use options::{StashConfig, StashOptions};
pub use schema::Schema;
pub use select::{
    select, select_named, AsyncCandidate, EngineCandidate, EngineInit, EngineRegistry,
    SelectionStrategy, SyncCandidate,
};
pub use sync_stash::SyncStash;

pub use keystash_core::{
    AsyncStorageEngine, Cipher, CipherError, EngineError, KeyHasher, StoredValue,
    SyncStorageEngine,
};
pub use keystash_effects as effects;
