//! Capability traits consumed by the stash façade
//!
//! Engines come in two variants: [`AsyncStorageEngine`] for media with an
//! asynchronous open handshake or awaitable I/O, and [`SyncStorageEngine`] for
//! media that complete every call before returning.

pub mod crypto;
pub mod storage;

pub use crypto::{Cipher, KeyHasher};
pub use storage::{AsyncStorageEngine, SyncStorageEngine};
