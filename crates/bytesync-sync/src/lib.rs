//! # Bytesync Sync
//!
//! Sync protocol for bytesync stacks: request/response messages, the
//! reconciliation state machine, the server-side dispatcher and the client
//! sync driver.
//!
//! ## Overview
//!
//! A client claims a position `{uuid, version, height, hash}`. The server
//! answers with the single next thing the client is missing: a block, a new
//! version, or nothing. The client applies it and asks again until it is
//! synced. Writes are conditional on the claimed position being current, so
//! concurrent writers never fork a stack; the loser gets a `conflict` error,
//! resyncs and retries.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use bytesync_store::MemoryStore;
//! use bytesync_sync::{Client, Dispatcher, LocalTransport};
//!
//! async fn example() -> bytesync_sync::Result<()> {
//!     let dispatcher = Arc::new(Dispatcher::new(Arc::new(MemoryStore::new())));
//!     let client = Client::new(LocalTransport::new(dispatcher));
//!
//!     let stack = client.create(Bytes::new(), Bytes::from_static(b"A")).await?;
//!     let outcome = client.block(&stack.view(), Bytes::from_static(b"B")).await?;
//!     assert!(outcome.is_synced());
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Client                                  Server
//!   |-- request.sync {v0,h0} ------------->|
//!   |<------------- response.version v1 ---|  info1, block A
//!   |-- request.sync {v1,h1} ------------->|
//!   |<--------------- response.block B ----|
//!   |-- request.sync {v1,h2} ------------->|
//!   |<------------- response.version v2 ---|  info2, block C
//!   |-- request.sync {v2,h1} ------------->|
//!   |<---------------- response.sync ------|
//! ```

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod messages;
pub mod reconcile;
pub mod transport;

pub use client::{Client, ClientConfig, SyncHandler, SyncReport};
pub use dispatcher::{Dispatcher, DispatcherConfig, DEFAULT_MAX_BLOCK_BYTES};
pub use error::{Result, SyncError};
pub use messages::{ErrorCode, Request, Response};
pub use reconcile::{reconcile, Outcome, ReconcileConfig};
pub use transport::{
    channel::serve, channel::ChannelTransport, JsonTransport, LocalTransport, Transport,
};
