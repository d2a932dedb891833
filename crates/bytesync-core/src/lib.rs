//! # Bytesync Core
//!
//! Pure primitives for bytesync: stack identifiers, the SHA-256 hash chain,
//! and the data types exchanged between clients and the server.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`StackId`] - Stable identifier of a stack (UUID v4)
//! - [`Sha256Hash`] - Content hash and chained version hash
//! - [`Stack`] - Server projection of a stack's latest (or a specific) version
//! - [`StackView`] - A client's claimed position in a stack
//! - [`Block`] - One opaque payload unit within a version
//!
//! ## Hash Chain
//!
//! Every version carries a running hash over its blocks. See the [`chain`] module.
//!
//! ```rust
//! use bytesync_core::chain::{block_hash, first_version_hash, next_version_hash};
//!
//! let h0 = first_version_hash(block_hash(b"A"));
//! let h1 = next_version_hash(&h0, &block_hash(b"B"));
//! assert_ne!(h0, h1);
//! ```

pub mod chain;
pub mod encoding;
pub mod error;
pub mod stack;
pub mod types;

pub use chain::{
    block_hash, first_version_hash, next_version_hash, verify_block, verify_chain,
    verify_version_hash, ChainAccumulator,
};
pub use error::CoreError;
pub use stack::{Block, BlockRef, BlockSize, SizeEntry, Stack, StackView, VersionRef, VersionSize};
pub use types::{now_millis, Sha256Hash, StackId};
