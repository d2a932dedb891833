//! # Bytesync
//!
//! Versioned, append-only, hash-chained stacks of opaque encrypted blocks,
//! synchronised between clients through a server that never sees plaintext.
//!
//! ## Overview
//!
//! - **Stacks**: a stack is a sequence of versions; each version is an
//!   append-only list of blocks plus an opaque `info` blob
//! - **Hash chain**: every version carries a SHA-256 hash chained over its
//!   block hashes, so equal positions imply equal contents
//! - **Conditional writes**: an append succeeds only against the exact latest
//!   `(version, height, hash)`; concurrent writers never fork a stack
//! - **Incremental sync**: a client asks for one missing block or version per
//!   round trip until it holds the latest state
//! - **Envelope encryption**: per-version keys sealed under a caller-held
//!   master key
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use bytesync::{Client, SecureClient, Server, ServerConfig};
//! use bytesync::perms::{ChaChaCipher, SymmetricCipher};
//!
//! async fn example() -> bytesync::Result<()> {
//!     let server = Server::open(&ServerConfig::from_env()?)?;
//!     let client = SecureClient::new(Client::new(server.local_transport()));
//!
//!     let master = ChaChaCipher.derive_key("correct horse", b"per-user-salt")?;
//!     let stack = client.create(&master, Bytes::from_static(b"notes"), b"first").await?;
//!     let stack = client.block(&stack, b"second").await?;
//!     assert_eq!(stack.stack.height, 2);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `bytesync::core` - Identifiers, the hash chain and wire data types
//! - `bytesync::store` - Storage trait, SQLite and in-memory stores
//! - `bytesync::sync` - Messages, reconciliation, dispatcher and client driver
//! - `bytesync::perms` - Authorization policies and envelope encryption

pub mod config;
pub mod error;
pub mod secure;
pub mod server;

// Re-export component crates
pub use bytesync_core as core;
pub use bytesync_perms as perms;
pub use bytesync_store as store;
pub use bytesync_sync as sync;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use error::{BytesyncError, Result};
pub use secure::{SecureClient, SecureHandler, StackInfo};
pub use server::Server;

pub use bytesync_core::{Block, Sha256Hash, Stack, StackId, StackView};
pub use bytesync_sync::{Client, ClientConfig, Outcome, SyncHandler, SyncReport, Transport};
