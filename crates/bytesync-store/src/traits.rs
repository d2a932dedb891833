//! Store trait: the abstract interface for stack persistence.
//!
//! This trait allows the dispatcher to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use bytes::Bytes;
use bytesync_core::{Block, Sha256Hash, SizeEntry, Stack, StackId};

use crate::error::Result;

/// Conditional request to append one block to the latest version of a stack.
///
/// The write is applied only if `(version, height, expected_hash)` is exactly
/// the stack's current latest state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendBlock {
    pub uuid: StackId,
    /// Version the caller believes is latest.
    pub version: u64,
    /// Height the caller believes that version has.
    pub height: u64,
    /// Version hash the caller believes is current.
    pub expected_hash: Sha256Hash,
    pub data: Bytes,
    /// Content hash of `data`.
    pub block_hash: Sha256Hash,
    /// Version hash after the append.
    pub next_hash: Sha256Hash,
}

/// Conditional request to start a new version of a stack.
///
/// The new version is `version + 1` and starts at height 1 with `data` as
/// its first block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendVersion {
    pub uuid: StackId,
    /// Version the caller believes is latest.
    pub version: u64,
    /// Version hash the caller believes is current.
    pub expected_hash: Sha256Hash,
    pub info: Bytes,
    pub data: Bytes,
    /// Content hash of `data`; also the new version's hash.
    pub block_hash: Sha256Hash,
}

/// The Store trait: async interface for stack persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Conditional writes**: `append_block` and `append_version` fail with
///   `Conflict` unless the claimed position is exactly current. The check and
///   the write happen atomically.
/// - **Absence**: reads of a missing stack, version or block return `NotFound`.
///   A rejected conditional write on a missing stack is also `NotFound`.
/// - **Vacuum** never removes the latest version of a stack.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a stack with version 1 and a single block at index 0.
    ///
    /// Fails with `Conflict` if `uuid` is already taken.
    async fn create(
        &self,
        uuid: &StackId,
        info: Bytes,
        data: Bytes,
        hash: Sha256Hash,
    ) -> Result<Stack>;

    /// Append a block to the latest version, conditional on the claimed position.
    async fn append_block(&self, request: AppendBlock) -> Result<Stack>;

    /// Start a new version, conditional on the claimed version and hash.
    async fn append_version(&self, request: AppendVersion) -> Result<Stack>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The latest version of a stack.
    async fn read_stack(&self, uuid: &StackId) -> Result<Stack>;

    /// A specific version of a stack.
    async fn read_version(&self, uuid: &StackId, version: u64) -> Result<Stack>;

    /// The info blob of a specific version.
    async fn read_info(&self, uuid: &StackId, version: u64) -> Result<Bytes>;

    /// A block by `(uuid, version, index)`.
    async fn read_block(&self, uuid: &StackId, version: u64, index: u64) -> Result<Block>;

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Byte usage report.
    ///
    /// Without a stack, one `size.version` entry per stored version across all
    /// stacks. With a stack, one `size.block` entry per stored block of it.
    async fn size(&self, uuid: Option<&StackId>) -> Result<Vec<SizeEntry>>;

    /// Delete every non-latest version and its blocks, then compact.
    ///
    /// Returns the number of versions removed.
    async fn vacuum(&self) -> Result<usize>;
}
