//! Encrypted payload envelope.
//!
//! Block data and version info are wrapped in an [`EncryptedPayload`] before
//! they leave the client. The server only ever sees the CBOR encoding of the
//! envelope.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptionKey, EncryptionNonce, MasterKey};
use crate::error::{PermsError, Result};

/// Format identifier for encrypted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionFormat {
    /// ChaCha20-Poly1305 with 256-bit key.
    ChaCha20Poly1305 = 1,
}

/// An encrypted payload envelope.
///
/// This structure wraps encrypted data and provides the metadata
/// needed to decrypt it (assuming the recipient has the key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Encryption algorithm used.
    pub format: EncryptionFormat,

    /// Nonce used for encryption (fresh per encryption).
    pub nonce: EncryptionNonce,

    /// The encrypted data (includes authentication tag).
    pub ciphertext: Bytes,
}

impl EncryptedPayload {
    /// Encrypt plaintext with the given key under a fresh random nonce.
    pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> Result<Self> {
        let nonce = EncryptionNonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce)?;

        Ok(Self {
            format: EncryptionFormat::ChaCha20Poly1305,
            nonce,
            ciphertext: Bytes::from(ciphertext),
        })
    }

    /// Decrypt with the given key.
    pub fn decrypt(&self, key: &EncryptionKey) -> Result<Vec<u8>> {
        match self.format {
            EncryptionFormat::ChaCha20Poly1305 => key.decrypt(&self.ciphertext, &self.nonce),
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| PermsError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| PermsError::SerializationError(e.to_string()))
    }

    /// Get the size of the ciphertext.
    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }
}

/// Symmetric encrypt/decrypt/key-derive capability.
///
/// The client is generic over this so a different primitive can be plugged
/// in without touching the sync driver. Implementations must never reuse a
/// nonce under the same key.
pub trait SymmetricCipher: Send + Sync {
    /// Key type handled by this cipher.
    type Key: Clone + Send + Sync;

    /// Derive a key from a passphrase and salt.
    fn derive_key(&self, passphrase: &str, salt: &[u8]) -> Result<Self::Key>;

    /// Generate a random key.
    fn generate_key(&self) -> Self::Key;

    /// Export a key to bytes so it can be sealed inside version info.
    fn export_key(&self, key: &Self::Key) -> Vec<u8>;

    /// Import a key previously produced by [`SymmetricCipher::export_key`].
    fn import_key(&self, bytes: &[u8]) -> Result<Self::Key>;

    /// Encrypt to opaque bytes.
    fn encrypt(&self, key: &Self::Key, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt opaque bytes produced by [`SymmetricCipher::encrypt`].
    fn decrypt(&self, key: &Self::Key, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// ChaCha20-Poly1305 envelopes with Argon2id passphrase derivation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaChaCipher;

impl SymmetricCipher for ChaChaCipher {
    type Key = EncryptionKey;

    fn derive_key(&self, passphrase: &str, salt: &[u8]) -> Result<EncryptionKey> {
        MasterKey::derive(passphrase, salt).map(MasterKey::into_key)
    }

    fn generate_key(&self) -> EncryptionKey {
        EncryptionKey::generate()
    }

    fn export_key(&self, key: &EncryptionKey) -> Vec<u8> {
        key.as_bytes().to_vec()
    }

    fn import_key(&self, bytes: &[u8]) -> Result<EncryptionKey> {
        EncryptionKey::from_slice(bytes)
    }

    fn encrypt(&self, key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
        EncryptedPayload::encrypt(plaintext, key)?.to_bytes()
    }

    fn decrypt(&self, key: &EncryptionKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
        EncryptedPayload::from_bytes(ciphertext)?.decrypt(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::generate();
        let plaintext = b"hello, encrypted world!";

        let envelope = EncryptedPayload::encrypt(plaintext, &key).unwrap();
        let decrypted = envelope.decrypt(&key).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_envelope_serialization() {
        let key = EncryptionKey::generate();
        let envelope = EncryptedPayload::encrypt(b"test", &key).unwrap();

        let bytes = envelope.to_bytes().unwrap();
        let recovered = EncryptedPayload::from_bytes(&bytes).unwrap();

        assert_eq!(envelope, recovered);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();

        let envelope = EncryptedPayload::encrypt(b"secret", &key1).unwrap();

        assert!(envelope.decrypt(&key2).is_err());
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let cipher = ChaChaCipher;
        let key = cipher.generate_key();

        let a = cipher.encrypt(&key, b"same").unwrap();
        let b = cipher.encrypt(&key, b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_garbage_is_not_an_envelope() {
        let cipher = ChaChaCipher;
        let key = cipher.generate_key();
        assert!(matches!(
            cipher.decrypt(&key, b"plain bytes"),
            Err(PermsError::SerializationError(_))
        ));
    }

    #[test]
    fn test_key_export_import() {
        let cipher = ChaChaCipher;
        let key = cipher.generate_key();
        let imported = cipher.import_key(&cipher.export_key(&key)).unwrap();
        assert_eq!(key, imported);
    }

    proptest! {
        #[test]
        fn test_cipher_roundtrip(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let cipher = ChaChaCipher;
            let key = cipher.generate_key();
            let sealed = cipher.encrypt(&key, &data).unwrap();
            prop_assert_eq!(cipher.decrypt(&key, &sealed).unwrap(), data);
        }
    }
}
