//! Storage engine handlers
//!
//! - [`LocalEngine`]: simple synchronous key/value area, text only
//! - [`ObjectStoreEngine`]: file-backed object database with an asynchronous,
//!   schema-versioned open handshake; stores structured values
//! - [`CookieEngine`]: name/value text pairs in a [`CookieJar`]

mod cookie;
mod local;
mod object_store;

pub use cookie::{CookieEngine, CookieJar};
pub use local::{LocalArea, LocalEngine};
pub use object_store::{ObjectStoreEngine, ObjectStoreOptions};
