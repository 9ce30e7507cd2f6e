//! Cipher and key hasher contracts
//!
//! Both operate on text: the façade encrypts the JSON envelope and hashes the
//! logical key's string form.

use crate::errors::CipherError;

/// Symmetric cipher keyed by a passphrase
pub trait Cipher: Send + Sync {
    /// Encrypt `plaintext` with `secret`, returning a text-safe ciphertext
    fn encrypt(&self, plaintext: &str, secret: &str) -> Result<String, CipherError>;

    /// Decrypt a ciphertext produced by [`encrypt`](Cipher::encrypt)
    fn decrypt(&self, ciphertext: &str, secret: &str) -> Result<String, CipherError>;
}

/// One-way digest used to derive opaque engine keys
pub trait KeyHasher: Send + Sync {
    /// Digest `message` into a text key
    fn hash(&self, message: &str) -> String;
}

impl<F> KeyHasher for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn hash(&self, message: &str) -> String {
        self(message)
    }
}
