//! # Keystash Core - Layer 1: Capability Contracts
//!
//! **Purpose**: Define the minimal shape every storage engine must satisfy, the
//! value model that crosses the engine boundary, and the error types shared by
//! engines and the stash façade.
//!
//! # Architecture Constraints
//!
//! - YES engine capability traits (async and sync variants)
//! - YES stored value model and the shallow merge used by increment keys
//! - YES cipher and key hasher traits
//! - NO concrete engines or crypto primitives (those live in `keystash-effects`)
//! - NO façade logic (that's `keystash`)
//! - NO I/O of any kind
//!
//! ## Core Concepts
//!
//! - **Engine**: a storage medium adapter; get/set/remove by string key
//! - **Structured support**: engines that store JSON values directly skip the
//!   text envelope
//! - **Ready hook**: engines with an asynchronous open handshake announce
//!   readiness through `on_ready`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Unified error types for engines and ciphers
pub mod errors;

/// Engine, cipher and hasher capability traits
pub mod effects;

/// Value model crossing the engine boundary
pub mod value;

pub use effects::{AsyncStorageEngine, Cipher, KeyHasher, SyncStorageEngine};
pub use errors::{CipherError, EngineError, EngineResult};
pub use value::{shallow_merge, StoredValue};
