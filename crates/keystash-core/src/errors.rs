//! Error types shared across engines
//!
//! Engines report failures through [`EngineError`]; the façade propagates them
//! to callers unchanged. Ciphers report through [`CipherError`], which the
//! façade only ever logs on the read path.

use serde::{Deserialize, Serialize};

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Failure reported by a storage engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum EngineError {
    /// The storage medium is not usable in this environment
    #[error("storage engine is unavailable")]
    Unavailable,

    /// The engine has not finished its open handshake and does not queue calls
    #[error("storage engine is not ready")]
    NotReady,

    /// The write would exceed the medium's quota
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// The key cannot be stored by this engine
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },

    /// The engine does not implement an optional operation
    #[error("operation not supported by this engine: {operation}")]
    Unsupported {
        /// Name of the unsupported operation
        operation: String,
    },

    /// Underlying I/O failed
    #[error("engine I/O failed: {0}")]
    Io(String),

    /// Persisted data has an unexpected shape
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    /// Any other engine failure
    #[error("engine operation failed: {0}")]
    Failed(String),
}

impl EngineError {
    /// Create an invalid key error
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl std::fmt::Display) -> Self {
        Self::Io(message.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failure reported by a [`Cipher`](crate::Cipher)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    /// Ciphertext is not in the cipher's envelope format
    #[error("ciphertext has an invalid format")]
    InvalidFormat,

    /// Envelope version byte is not one this cipher understands
    #[error("unsupported ciphertext version {0}")]
    UnsupportedVersion(u8),

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// Decryption failed (wrong secret or tampered data)
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_to_engine_io() {
        let err: EngineError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, EngineError::Io(ref msg) if msg.contains("denied")));
    }

    #[test]
    fn display_includes_reason() {
        let err = EngineError::invalid_key("reserved attribute name");
        assert_eq!(err.to_string(), "invalid key: reserved attribute name");
    }
}
