//! Stash options and configuration files
//!
//! [`StashOptions`] is the programmatic builder. [`StashConfig`] is its serde
//! form, loaded from TOML or JSON:
//!
//! ```toml
//! secret_key = "correct horse battery staple"
//! hash_keys = true
//! hasher = "sha256"
//! cipher = "chacha20-poly1305"
//! increments = ["profile"]
//! selection = "first-candidate"
//! ```

use keystash_core::{Cipher, KeyHasher};
use keystash_effects::{AesGcmCipher, Blake3Hasher, ChaChaCipher, Md5Hasher, Sha256Hasher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::codec::Codec;
use crate::errors::{StashError, StashResult};
use crate::keys::KeyTransform;
use crate::notify::{ChangeNotifier, FlushScheduler, TokioScheduler};
use crate::select::SelectionStrategy;

/// Options shared by [`AsyncStash`](crate::AsyncStash) and
/// [`SyncStash`](crate::SyncStash)
#[derive(Clone)]
pub struct StashOptions {
    secret_key: Option<Zeroizing<String>>,
    cipher: Arc<dyn Cipher>,
    hash_keys: bool,
    hasher: Arc<dyn KeyHasher>,
    increments: Vec<String>,
    selection: SelectionStrategy,
    scheduler: Arc<dyn FlushScheduler>,
}

impl Default for StashOptions {
    fn default() -> Self {
        Self {
            secret_key: None,
            cipher: Arc::new(AesGcmCipher),
            hash_keys: false,
            hasher: Arc::new(Md5Hasher),
            increments: Vec::new(),
            selection: SelectionStrategy::default(),
            scheduler: Arc::new(TokioScheduler::default()),
        }
    }
}

impl StashOptions {
    /// Plain text values, unhashed keys, probing selection
    pub fn new() -> Self {
        Self::default()
    }

    /// Encrypt values with `secret_key`; an empty key disables encryption
    pub fn with_secret_key(mut self, secret_key: impl Into<String>) -> Self {
        self.secret_key = Some(Zeroizing::new(secret_key.into()));
        self
    }

    /// Replace the default AES-256-GCM cipher
    pub fn with_cipher(mut self, cipher: impl Cipher + 'static) -> Self {
        self.cipher = Arc::new(cipher);
        self
    }

    /// Hash logical keys before they reach the engine
    pub fn with_hashed_keys(mut self, enabled: bool) -> Self {
        self.hash_keys = enabled;
        self
    }

    /// Replace the default MD5 key hasher
    pub fn with_hasher(mut self, hasher: impl KeyHasher + 'static) -> Self {
        self.hasher = Arc::new(hasher);
        self
    }

    /// Keys whose writes merge onto the previous value
    pub fn with_increments<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.increments = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Engine selection strategy
    pub fn with_selection(mut self, selection: SelectionStrategy) -> Self {
        self.selection = selection;
        self
    }

    /// Scheduler for notification flushes
    pub fn with_scheduler(mut self, scheduler: impl FlushScheduler + 'static) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    /// Configured selection strategy
    pub fn selection(&self) -> SelectionStrategy {
        self.selection
    }

    /// Whether values will be encrypted
    pub fn is_encrypted(&self) -> bool {
        self.secret_key.as_ref().is_some_and(|key| !key.is_empty())
    }

    pub(crate) fn codec(&self) -> Codec {
        Codec::new(
            self.cipher.clone(),
            self.secret_key.clone(),
            self.increments.iter().cloned(),
        )
    }

    pub(crate) fn key_transform(&self) -> KeyTransform {
        if self.hash_keys {
            KeyTransform::hashed(self.hasher.clone())
        } else {
            KeyTransform::identity()
        }
    }

    pub(crate) fn notifier(&self) -> ChangeNotifier {
        ChangeNotifier::new(self.scheduler.clone())
    }
}

impl fmt::Debug for StashOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StashOptions")
            .field("encrypted", &self.is_encrypted())
            .field("hash_keys", &self.hash_keys)
            .field("increments", &self.increments)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

/// Serializable stash configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StashConfig {
    /// Enables encryption when set
    pub secret_key: Option<String>,
    /// Hash logical keys
    pub hash_keys: bool,
    /// `md5`, `sha256` or `blake3`
    pub hasher: String,
    /// `aes-256-gcm` or `chacha20-poly1305`
    pub cipher: String,
    /// Keys whose writes merge onto the previous value
    pub increments: Vec<String>,
    /// Engine selection strategy
    pub selection: SelectionStrategy,
}

impl Default for StashConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            hash_keys: false,
            hasher: "md5".to_string(),
            cipher: "aes-256-gcm".to_string(),
            increments: Vec::new(),
            selection: SelectionStrategy::default(),
        }
    }
}

impl StashConfig {
    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> StashResult<Self> {
        toml::from_str(text).map_err(|e| StashError::config(e.to_string()))
    }

    /// Parse JSON text
    pub fn from_json_str(text: &str) -> StashResult<Self> {
        serde_json::from_str(text).map_err(|e| StashError::config(e.to_string()))
    }

    /// Load a `.toml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> StashResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StashError::config(format!("failed to read {}: {e}", path.display())))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(StashError::config(format!(
                "unsupported config format: {}",
                path.display()
            ))),
        }
    }

    /// Validate algorithm names and build options
    pub fn into_options(self) -> StashResult<StashOptions> {
        let mut options = StashOptions::new()
            .with_hashed_keys(self.hash_keys)
            .with_increments(self.increments)
            .with_selection(self.selection);

        options = match self.hasher.to_ascii_lowercase().as_str() {
            "md5" => options.with_hasher(Md5Hasher),
            "sha256" | "sha-256" => options.with_hasher(Sha256Hasher),
            "blake3" => options.with_hasher(Blake3Hasher),
            other => return Err(StashError::config(format!("unknown hasher: {other}"))),
        };
        options = match self.cipher.to_ascii_lowercase().as_str() {
            "aes-256-gcm" | "aes" => options.with_cipher(AesGcmCipher),
            "chacha20-poly1305" | "chacha" => options.with_cipher(ChaChaCipher),
            other => return Err(StashError::config(format!("unknown cipher: {other}"))),
        };
        if let Some(secret_key) = self.secret_key {
            options = options.with_secret_key(secret_key);
        }
        Ok(options)
    }
}

impl fmt::Debug for StashConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StashConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("hash_keys", &self.hash_keys)
            .field("hasher", &self.hasher)
            .field("cipher", &self.cipher)
            .field("increments", &self.increments)
            .field("selection", &self.selection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_config_builds_options() {
        let config = StashConfig::from_toml_str(
            r#"
            secret_key = "s3cret"
            hash_keys = true
            hasher = "sha256"
            cipher = "chacha20-poly1305"
            increments = ["profile"]
            selection = "first-candidate"
            "#,
        )
        .unwrap();
        assert_eq!(config.selection, SelectionStrategy::FirstCandidate);

        let options = config.into_options().unwrap();
        assert!(options.is_encrypted());
        assert!(options.key_transform().is_hashed());
        assert!(options.codec().is_increment("profile"));
        assert_eq!(options.selection(), SelectionStrategy::FirstCandidate);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = StashConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StashConfig::default());
        let options = config.into_options().unwrap();
        assert!(!options.is_encrypted());
        assert_eq!(options.selection(), SelectionStrategy::ProbeSupport);
    }

    #[test]
    fn unknown_algorithms_are_config_errors() {
        let config = StashConfig {
            hasher: "crc32".into(),
            ..StashConfig::default()
        };
        assert!(matches!(config.into_options(), Err(StashError::Config(msg)) if msg.contains("crc32")));

        let config = StashConfig {
            cipher: "rot13".into(),
            ..StashConfig::default()
        };
        assert!(matches!(config.into_options(), Err(StashError::Config(_))));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            StashConfig::from_toml_str("secrt_key = \"typo\""),
            Err(StashError::Config(_))
        ));
    }

    #[test]
    fn load_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stash.json");
        std::fs::write(&path, r#"{"hash_keys": true}"#).unwrap();
        assert!(StashConfig::load(&path).unwrap().hash_keys);

        let path = dir.path().join("stash.yaml");
        std::fs::write(&path, "hash_keys: true").unwrap();
        assert!(matches!(StashConfig::load(&path), Err(StashError::Config(_))));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = StashConfig {
            secret_key: Some("hunter2".into()),
            ..StashConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
        let options = config.into_options().unwrap();
        assert!(!format!("{options:?}").contains("hunter2"));
    }
}
