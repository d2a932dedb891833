//! # Bytesync Store
//!
//! Storage engine for bytesync. Provides a trait-based interface over the
//! persistent stack, version and block records, with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! The [`Store`] trait owns every persisted row. No other component mutates
//! stack data directly. The primary implementation is [`SqliteStore`], with
//! [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`AppendBlock`] / [`AppendVersion`] - Conditional write requests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use bytesync_core::{block_hash, StackId};
//! use bytesync_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("bytesync.db").unwrap();
//!
//!     let data = Bytes::from_static(b"first block");
//!     let hash = block_hash(&data);
//!     let stack = store
//!         .create(&StackId::generate(), Bytes::from_static(b"info"), data, hash)
//!         .await
//!         .unwrap();
//!     assert_eq!(stack.height, 1);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Conditional writes**: appends succeed only when the caller's claimed
//!   `(version, height, hash)` is exactly the stack's latest state. Anything
//!   else is [`StoreError::Conflict`].
//! - **Single serialization point**: every mutation runs in one transaction;
//!   there is no other locking.
//! - **Vacuum**: superseded versions are deleted together with their blocks;
//!   the latest version of a stack is never touched.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AppendBlock, AppendVersion, Store};
