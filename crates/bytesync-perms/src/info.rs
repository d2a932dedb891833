//! Per-version metadata sealed under the master key.
//!
//! Each version gets a fresh random key. That key travels inside the
//! version's `info` bytes together with the caller's metadata, encrypted
//! under the master key, so a reader must open `info` before any block of
//! the version can be decrypted.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::envelope::SymmetricCipher;
use crate::error::{PermsError, Result};

/// Caller metadata plus the key that encrypts a version's blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo<K> {
    /// Caller-defined metadata, opaque to bytesync.
    pub info: Bytes,
    /// Version key.
    pub key: K,
}

#[derive(Serialize, Deserialize)]
struct SealedInfo {
    info: Bytes,
    key: Bytes,
}

impl<K> VersionInfo<K> {
    /// Pair metadata with a version key.
    pub fn new(info: Bytes, key: K) -> Self {
        Self { info, key }
    }

    /// Encrypt under `master` into the bytes the server stores as `info`.
    pub fn seal<C>(&self, cipher: &C, master: &K) -> Result<Vec<u8>>
    where
        C: SymmetricCipher<Key = K>,
    {
        let sealed = SealedInfo {
            info: self.info.clone(),
            key: Bytes::from(cipher.export_key(&self.key)),
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&sealed, &mut buf)
            .map_err(|e| PermsError::SerializationError(e.to_string()))?;
        cipher.encrypt(master, &buf)
    }

    /// Decrypt stored `info` bytes with `master`.
    pub fn open<C>(cipher: &C, master: &K, sealed: &[u8]) -> Result<Self>
    where
        C: SymmetricCipher<Key = K>,
    {
        let plain = cipher.decrypt(master, sealed)?;
        let opened: SealedInfo = ciborium::from_reader(plain.as_slice())
            .map_err(|e| PermsError::SerializationError(e.to_string()))?;
        Ok(Self {
            info: opened.info,
            key: cipher.import_key(&opened.key)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ChaChaCipher;

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = ChaChaCipher;
        let master = cipher.generate_key();
        let info = VersionInfo::new(Bytes::from_static(b"meta"), cipher.generate_key());

        let sealed = info.seal(&cipher, &master).unwrap();
        let opened = VersionInfo::open(&cipher, &master, &sealed).unwrap();

        assert_eq!(opened, info);
    }

    #[test]
    fn test_sealed_info_hides_key() {
        let cipher = ChaChaCipher;
        let master = cipher.generate_key();
        let key = cipher.generate_key();
        let info = VersionInfo::new(Bytes::new(), key.clone());

        let sealed = info.seal(&cipher, &master).unwrap();
        let raw = key.as_bytes();
        assert!(!sealed.windows(raw.len()).any(|w| w == raw));
    }

    #[test]
    fn test_open_with_wrong_master_fails() {
        let cipher = ChaChaCipher;
        let info = VersionInfo::new(Bytes::from_static(b"meta"), cipher.generate_key());
        let sealed = info.seal(&cipher, &cipher.generate_key()).unwrap();

        assert!(matches!(
            VersionInfo::open(&cipher, &cipher.generate_key(), &sealed),
            Err(PermsError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_blocks_need_version_key() {
        let cipher = ChaChaCipher;
        let master = cipher.derive_key("passphrase", b"bytesync-test").unwrap();
        let info = VersionInfo::new(Bytes::new(), cipher.generate_key());
        let block = cipher.encrypt(&info.key, b"entry").unwrap();

        assert!(cipher.decrypt(&master, &block).is_err());
        assert_eq!(cipher.decrypt(&info.key, &block).unwrap(), b"entry");
    }
}
