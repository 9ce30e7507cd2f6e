//! # Keystash Effects - Layer 2: Engine and Crypto Handlers
//!
//! Concrete implementations of the capability contracts in `keystash-core`.
//!
//! # Architecture Constraints
//!
//! - YES storage engines: local key/value area, file-backed object store, cookie jar
//! - YES default ciphers (AES-256-GCM, ChaCha20-Poly1305) and key hashers
//! - NO façade logic: encoding, readiness and notifications live in `keystash`
//! - NO test doubles (those belong in `keystash-testkit`)
//!
//! Every engine constructor that depends on its environment returns `Option`:
//! `None` means the medium is unavailable here, which lets the façade's
//! selection fall through to the next candidate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Default ciphers and key hashers
pub mod crypto;

/// Storage engines
pub mod engines;

pub use crypto::{AesGcmCipher, Blake3Hasher, ChaChaCipher, Md5Hasher, Sha256Hasher};
pub use engines::{
    CookieEngine, CookieJar, LocalArea, LocalEngine, ObjectStoreEngine, ObjectStoreOptions,
};
