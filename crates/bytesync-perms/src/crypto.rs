//! Key material and the ChaCha20-Poly1305 primitive.
//!
//! Master keys can be derived from a passphrase with Argon2id.

use argon2::Argon2;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PermsError, Result};

/// Minimum salt length accepted by [`MasterKey::derive`].
pub const MIN_SALT_LEN: usize = 8;

/// A 256-bit symmetric encryption key for ChaCha20-Poly1305.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Import from a byte slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PermsError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt data with this key.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| PermsError::EncryptionError(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| PermsError::EncryptionError(e.to_string()))
    }

    /// Decrypt data with this key.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| PermsError::DecryptionError(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| PermsError::DecryptionError(e.to_string()))
    }
}

// Key bytes never reach logs.
impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 12];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// The caller-held key that seals each version's key and metadata.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey(EncryptionKey);

impl MasterKey {
    /// Derive a master key from a passphrase with Argon2id (default parameters).
    ///
    /// The same passphrase and salt always yield the same key. The salt must be
    /// at least [`MIN_SALT_LEN`] bytes.
    pub fn derive(passphrase: &str, salt: &[u8]) -> Result<Self> {
        let mut out = [0u8; 32];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut out)
            .map_err(|e| PermsError::KeyDerivationError(e.to_string()))?;
        Ok(Self(EncryptionKey(out)))
    }

    /// Generate a random master key.
    pub fn generate() -> Self {
        Self(EncryptionKey::generate())
    }

    /// The underlying symmetric key.
    pub fn key(&self) -> &EncryptionKey {
        &self.0
    }

    /// Unwrap into the underlying symmetric key.
    pub fn into_key(self) -> EncryptionKey {
        self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = EncryptionKey::generate();
        let nonce = EncryptionNonce::generate();
        let plaintext = b"hello, world!";

        let ciphertext = key.encrypt(plaintext, &nonce).unwrap();
        assert_ne!(ciphertext, plaintext);
        // 16-byte Poly1305 tag
        assert_eq!(ciphertext.len(), plaintext.len() + 16);

        let decrypted = key.decrypt(&ciphertext, &nonce).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();
        let nonce = EncryptionNonce::generate();

        let ciphertext = key1.encrypt(b"secret", &nonce).unwrap();

        assert!(matches!(
            key2.decrypt(&ciphertext, &nonce),
            Err(PermsError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_key_from_slice_length() {
        assert!(EncryptionKey::from_slice(&[0u8; 32]).is_ok());
        assert!(matches!(
            EncryptionKey::from_slice(&[0u8; 16]),
            Err(PermsError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn test_master_key_derivation_deterministic() {
        let k1 = MasterKey::derive("passphrase", b"salt-1234").unwrap();
        let k2 = MasterKey::derive("passphrase", b"salt-1234").unwrap();
        let k3 = MasterKey::derive("passphrase", b"salt-5678").unwrap();
        let k4 = MasterKey::derive("other", b"salt-1234").unwrap();

        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert_ne!(k1, k4);
    }

    #[test]
    fn test_master_key_short_salt_rejected() {
        assert!(matches!(
            MasterKey::derive("passphrase", b"abc"),
            Err(PermsError::KeyDerivationError(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let key = EncryptionKey::from_bytes([0xab; 32]);
        assert_eq!(format!("{:?}", key), "EncryptionKey(..)");
    }
}
