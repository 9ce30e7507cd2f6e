//! Default cipher and key hasher handlers
//!
//! Ciphers derive a 256-bit key from the passphrase with HKDF-SHA256 and seal
//! the plaintext with an AEAD. The text form is base64 of
//! `version (1 byte) || nonce (12 bytes) || ciphertext`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, Nonce};
use aes_gcm::Aes256Gcm;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::ChaCha20Poly1305;
use hkdf::Hkdf;
use keystash_core::{Cipher, CipherError, KeyHasher};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Nonce size shared by both AEADs (96 bits = 12 bytes)
const NONCE_SIZE: usize = 12;

/// Envelope version byte for AES-256-GCM
const AES_GCM_VERSION: u8 = 0x01;

/// Envelope version byte for ChaCha20-Poly1305
const CHACHA_VERSION: u8 = 0x02;

const KDF_SALT: &[u8] = b"keystash-passphrase-v1";

/// AES-256-GCM cipher, the default for encrypted stashes
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmCipher;

/// ChaCha20-Poly1305 cipher
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaChaCipher;

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str, secret: &str) -> Result<String, CipherError> {
        seal::<Aes256Gcm>(AES_GCM_VERSION, b"keystash-aes-256-gcm", plaintext, secret)
    }

    fn decrypt(&self, ciphertext: &str, secret: &str) -> Result<String, CipherError> {
        open::<Aes256Gcm>(AES_GCM_VERSION, b"keystash-aes-256-gcm", ciphertext, secret)
    }
}

impl Cipher for ChaChaCipher {
    fn encrypt(&self, plaintext: &str, secret: &str) -> Result<String, CipherError> {
        seal::<ChaCha20Poly1305>(CHACHA_VERSION, b"keystash-chacha20-poly1305", plaintext, secret)
    }

    fn decrypt(&self, ciphertext: &str, secret: &str) -> Result<String, CipherError> {
        open::<ChaCha20Poly1305>(CHACHA_VERSION, b"keystash-chacha20-poly1305", ciphertext, secret)
    }
}

fn derive_key(secret: &str, info: &[u8]) -> Result<Zeroizing<[u8; 32]>, CipherError> {
    let hkdf = Hkdf::<Sha256>::new(Some(KDF_SALT), secret.as_bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(info, &mut key[..])
        .map_err(|e| CipherError::Encrypt(format!("key derivation failed: {e}")))?;
    Ok(key)
}

fn seal<C>(version: u8, info: &[u8], plaintext: &str, secret: &str) -> Result<String, CipherError>
where
    C: Aead + AeadCore + KeyInit,
{
    let key = derive_key(secret, info)?;
    let cipher = C::new_from_slice(&key[..]).map_err(|e| CipherError::Encrypt(e.to_string()))?;
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| CipherError::Encrypt(e.to_string()))?;

    let mut blob = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
    blob.push(version);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

fn open<C>(version: u8, info: &[u8], ciphertext: &str, secret: &str) -> Result<String, CipherError>
where
    C: Aead + AeadCore + KeyInit,
{
    let blob = STANDARD
        .decode(ciphertext.trim())
        .map_err(|_| CipherError::InvalidFormat)?;
    if blob.len() < 1 + NONCE_SIZE {
        return Err(CipherError::InvalidFormat);
    }
    if blob[0] != version {
        return Err(CipherError::UnsupportedVersion(blob[0]));
    }

    let key = derive_key(secret, info)?;
    let cipher = C::new_from_slice(&key[..]).map_err(|e| CipherError::Decrypt(e.to_string()))?;
    let nonce = Nonce::<C>::from_slice(&blob[1..1 + NONCE_SIZE]);
    let plaintext = cipher
        .decrypt(nonce, &blob[1 + NONCE_SIZE..])
        .map_err(|e| CipherError::Decrypt(e.to_string()))?;

    String::from_utf8(plaintext).map_err(|e| CipherError::Decrypt(e.to_string()))
}

/// MD5 key hasher, the default for hashed engine keys.
///
/// Opaque keys only need to be stable and short; MD5 is not used for secrecy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Hasher;

impl KeyHasher for Md5Hasher {
    fn hash(&self, message: &str) -> String {
        format!("{:x}", md5::compute(message.as_bytes()))
    }
}

/// SHA-256 key hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl KeyHasher for Sha256Hasher {
    fn hash(&self, message: &str) -> String {
        hex::encode(Sha256::digest(message.as_bytes()))
    }
}

/// BLAKE3 key hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl KeyHasher for Blake3Hasher {
    fn hash(&self, message: &str) -> String {
        blake3::hash(message.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_round_trip() {
        let sealed = AesGcmCipher.encrypt(r#"{"a":1}"#, "hunter2").unwrap();
        assert_ne!(sealed, r#"{"a":1}"#);
        assert_eq!(AesGcmCipher.decrypt(&sealed, "hunter2").unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn chacha_round_trip() {
        let sealed = ChaChaCipher.encrypt("plain", "k").unwrap();
        assert_eq!(ChaChaCipher.decrypt(&sealed, "k").unwrap(), "plain");
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let a = AesGcmCipher.encrypt("same", "k").unwrap();
        let b = AesGcmCipher.encrypt("same", "k").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_secret_fails_to_decrypt() {
        let sealed = AesGcmCipher.encrypt("secret data", "right").unwrap();
        assert!(matches!(
            AesGcmCipher.decrypt(&sealed, "wrong"),
            Err(CipherError::Decrypt(_))
        ));
    }

    #[test]
    fn version_byte_separates_ciphers() {
        let sealed = ChaChaCipher.encrypt("x", "k").unwrap();
        assert_eq!(
            AesGcmCipher.decrypt(&sealed, "k"),
            Err(CipherError::UnsupportedVersion(CHACHA_VERSION))
        );
    }

    #[test]
    fn non_base64_is_invalid_format() {
        assert_eq!(
            AesGcmCipher.decrypt("not base64 at all!", "k"),
            Err(CipherError::InvalidFormat)
        );
        assert_eq!(
            AesGcmCipher.decrypt("AQID", "k"),
            Err(CipherError::InvalidFormat)
        );
    }

    #[test]
    fn hashers_produce_known_digests() {
        assert_eq!(Md5Hasher.hash("abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            Sha256Hasher.hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(Blake3Hasher.hash("abc").len(), 64);
    }
}
