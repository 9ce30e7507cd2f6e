//! Stash error type

use keystash_core::{CipherError, EngineError};

/// Result alias for stash operations
pub type StashResult<T> = Result<T, StashError>;

/// Failure reported by [`AsyncStash`](crate::AsyncStash) and
/// [`SyncStash`](crate::SyncStash)
#[derive(Debug, thiserror::Error)]
pub enum StashError {
    /// No engine was selected; every data operation fails with this
    #[error("No storage engine")]
    NoEngine,

    /// The selected engine failed; propagated unchanged
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The key is not part of the stash schema
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// Encrypting a value before writing failed
    #[error("encryption failed: {0}")]
    Encryption(#[from] CipherError),

    /// A value could not be converted to or from JSON
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Options or a configuration file are invalid
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StashError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error means the stash has no engine
    pub fn is_no_engine(&self) -> bool {
        matches!(self, Self::NoEngine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_pass_through_unchanged() {
        let err: StashError = EngineError::QuotaExceeded.into();
        assert_eq!(err.to_string(), EngineError::QuotaExceeded.to_string());
        assert!(matches!(err, StashError::Engine(EngineError::QuotaExceeded)));
    }

    #[test]
    fn no_engine_message() {
        assert_eq!(StashError::NoEngine.to_string(), "No storage engine");
        assert!(StashError::NoEngine.is_no_engine());
    }
}
