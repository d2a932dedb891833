//! # Bytesync Permissions
//!
//! Capability checks and envelope encryption.
//!
//! ## Overview
//!
//! The server consults an [`Auth`] policy before every storage call. The
//! client wraps every payload in an encryption envelope before it reaches the
//! server, which only ever stores opaque bytes.
//!
//! ## Encryption Model
//!
//! Encrypted stacks use a two-layer key model:
//!
//! 1. **Version Key**: a random symmetric key (ChaCha20-Poly1305) generated per
//!    version that encrypts that version's blocks
//! 2. **Master Key**: a caller-held key, usually derived from a passphrase with
//!    Argon2, that seals the version key together with the version's metadata
//!    into the version's `info` bytes
//!
//! This allows:
//! - Key rotation on every new version
//! - Reading a version only after its `info` has been opened
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use bytesync_perms::{ChaChaCipher, SymmetricCipher, VersionInfo};
//!
//! let cipher = ChaChaCipher;
//! let master = cipher.derive_key("correct horse", b"bytesync-salt").unwrap();
//!
//! let info = VersionInfo::new(Bytes::from_static(b"{\"title\":\"notes\"}"), cipher.generate_key());
//! let sealed = info.seal(&cipher, &master).unwrap();
//! let block = cipher.encrypt(&info.key, b"first entry").unwrap();
//!
//! let opened = VersionInfo::open(&cipher, &master, &sealed).unwrap();
//! assert_eq!(cipher.decrypt(&opened.key, &block).unwrap(), b"first entry");
//! ```

pub mod auth;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod info;

pub use auth::{AllowAll, Auth, Grant, GrantAuth, PermissionScope};
pub use crypto::{EncryptionKey, EncryptionNonce, MasterKey};
pub use envelope::{ChaChaCipher, EncryptedPayload, EncryptionFormat, SymmetricCipher};
pub use error::{PermsError, Result};
pub use info::VersionInfo;
