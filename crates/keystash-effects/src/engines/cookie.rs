//! Cookie jar engine
//!
//! Entries are name/value text pairs. Names and values are percent-encoded the
//! way `encodeURIComponent` does, written with a far-future expiry and the
//! `secure` attribute, and removed by writing an expiry in the past.

use async_trait::async_trait;
use indexmap::IndexMap;
use keystash_core::{
    AsyncStorageEngine, EngineError, EngineResult, StoredValue, SyncStorageEngine,
};
use parking_lot::Mutex;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Characters `encodeURIComponent` escapes
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Attribute names that cannot be used as cookie names
const RESERVED_NAMES: [&str; 5] = ["expires", "max-age", "path", "domain", "secure"];

/// Fri, 31 Dec 9999 23:59:59 GMT
const FAR_FUTURE_SECS: u64 = 253_402_300_799;

const PROBE_NAME: &str = "test";

#[derive(Debug, Clone)]
struct Cookie {
    value: String,
    expires: SystemTime,
    secure: bool,
}

#[derive(Debug, Default)]
struct JarState {
    cookies: IndexMap<String, Cookie>,
    disabled: bool,
}

/// In-process cookie jar keyed by encoded cookie name
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    inner: Arc<Mutex<JarState>>,
}

impl CookieJar {
    /// Create an empty jar
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a jar that silently drops writes, like a host with cookies off
    pub fn disabled() -> Self {
        let jar = Self::new();
        jar.inner.lock().disabled = true;
        jar
    }

    /// Write an already-encoded cookie; an expiry in the past evicts it
    fn write(&self, name: String, value: String, expires: SystemTime, secure: bool) {
        let mut state = self.inner.lock();
        if state.disabled {
            return;
        }
        if expires <= SystemTime::now() {
            state.cookies.shift_remove(&name);
            return;
        }
        state.cookies.insert(
            name,
            Cookie {
                value,
                expires,
                secure,
            },
        );
    }

    /// Read the encoded value of a live cookie
    fn read(&self, name: &str) -> Option<String> {
        let state = self.inner.lock();
        state
            .cookies
            .get(name)
            .filter(|cookie| cookie.expires > SystemTime::now())
            .map(|cookie| cookie.value.clone())
    }

    fn names(&self) -> Vec<String> {
        let now = SystemTime::now();
        self.inner
            .lock()
            .cookies
            .iter()
            .filter(|(_, cookie)| cookie.expires > now)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Render live cookies as a `name=value; name=value` header
    pub fn header(&self) -> String {
        let now = SystemTime::now();
        self.inner
            .lock()
            .cookies
            .iter()
            .filter(|(_, cookie)| cookie.expires > now)
            .map(|(name, cookie)| format!("{name}={}", cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Whether the named (encoded) cookie carries the `secure` attribute
    pub fn is_secure(&self, encoded_name: &str) -> bool {
        self.inner
            .lock()
            .cookies
            .get(encoded_name)
            .is_some_and(|cookie| cookie.secure)
    }
}

/// Text-only engine storing entries as cookies
#[derive(Debug, Clone)]
pub struct CookieEngine {
    jar: CookieJar,
}

impl CookieEngine {
    /// Build an engine without checking the jar
    pub fn new(jar: CookieJar) -> Self {
        Self { jar }
    }

    /// Build an engine after checking that the jar accepts a test cookie.
    ///
    /// Returns `None` when cookies are disabled.
    pub fn probe(jar: CookieJar) -> Option<Self> {
        jar.write(
            PROBE_NAME.to_string(),
            PROBE_NAME.to_string(),
            far_future(),
            false,
        );
        if jar.read(PROBE_NAME).as_deref() != Some(PROBE_NAME) {
            tracing::error!(engine = "cookie", "cookie jar unavailable");
            return None;
        }
        jar.write(PROBE_NAME.to_string(), String::new(), UNIX_EPOCH, false);
        Some(Self::new(jar))
    }

    /// The backing jar
    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    fn validate_name(key: &str) -> EngineResult<()> {
        if key.is_empty() {
            return Err(EngineError::invalid_key("Invalid key or attribute name."));
        }
        if RESERVED_NAMES
            .iter()
            .any(|reserved| key.eq_ignore_ascii_case(reserved))
        {
            return Err(EngineError::invalid_key("Invalid key or attribute name."));
        }
        Ok(())
    }

    fn encode(component: &str) -> String {
        utf8_percent_encode(component, COMPONENT).to_string()
    }

    fn decode(component: &str) -> EngineResult<String> {
        percent_decode_str(component)
            .decode_utf8()
            .map(|decoded| decoded.into_owned())
            .map_err(|e| EngineError::Corrupt(format!("cookie is not valid UTF-8: {e}")))
    }
}

fn far_future() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(FAR_FUTURE_SECS)
}

impl SyncStorageEngine for CookieEngine {
    fn kind(&self) -> &str {
        "cookie"
    }

    fn set_item(&self, key: &str, value: StoredValue) -> EngineResult<()> {
        Self::validate_name(key)?;
        self.jar.write(
            Self::encode(key),
            Self::encode(&value.into_text()),
            far_future(),
            true,
        );
        Ok(())
    }

    fn get_item(&self, key: &str) -> EngineResult<Option<StoredValue>> {
        match self.jar.read(&Self::encode(key)) {
            Some(encoded) => {
                let decoded = Self::decode(&encoded)?;
                // an empty cookie reads as unset
                Ok((!decoded.is_empty()).then_some(StoredValue::Text(decoded)))
            }
            None => Ok(None),
        }
    }

    fn remove_item(&self, key: &str) -> EngineResult<()> {
        self.jar
            .write(Self::encode(key), String::new(), UNIX_EPOCH, false);
        Ok(())
    }

    fn keys(&self) -> EngineResult<Vec<String>> {
        self.jar
            .names()
            .iter()
            .map(|name| Self::decode(name))
            .collect()
    }

    fn clear(&self) -> EngineResult<()> {
        for name in self.jar.names() {
            self.jar.write(name, String::new(), UNIX_EPOCH, false);
        }
        Ok(())
    }
}

#[async_trait]
impl AsyncStorageEngine for CookieEngine {
    fn kind(&self) -> &str {
        "cookie"
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
