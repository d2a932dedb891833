//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use bytesync_core::{
    first_version_hash, now_millis, Block, BlockSize, Sha256Hash, SizeEntry, Stack, StackId,
    VersionSize,
};

use crate::error::{Result, StoreError};
use crate::traits::{AppendBlock, AppendVersion, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; the
/// write lock is the serialization point for conditional writes.
pub struct MemoryStore {
    inner: RwLock<HashMap<StackId, StackRecord>>,
}

#[derive(Default)]
struct StackRecord {
    versions: BTreeMap<u64, VersionRecord>,
}

struct VersionRecord {
    info: Bytes,
    created: i64,
    updated: i64,
    hash: Sha256Hash,
    blocks: Vec<Block>,
}

impl VersionRecord {
    fn new(info: Bytes, block: Block) -> Self {
        Self {
            info,
            created: block.created,
            updated: block.created,
            hash: first_version_hash(block.hash),
            blocks: vec![block],
        }
    }

    fn project(&self, uuid: StackId, version: u64) -> Stack {
        Stack {
            uuid,
            created: self.created,
            updated: self.updated,
            version,
            height: self.blocks.len() as u64,
            hash: self.hash,
        }
    }
}

impl StackRecord {
    fn latest(&self) -> Option<(u64, &VersionRecord)> {
        self.versions.iter().next_back().map(|(v, r)| (*v, r))
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<StackId, StackRecord>>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<StackId, StackRecord>>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn stack_not_found(uuid: &StackId) -> StoreError {
    StoreError::NotFound(format!("stack {}", uuid))
}

fn version_not_found(uuid: &StackId, version: u64) -> StoreError {
    StoreError::NotFound(format!("version {} of stack {}", version, uuid))
}

fn stale(uuid: &StackId) -> StoreError {
    tracing::warn!(stack = %uuid.short(), "rejected stale conditional write");
    StoreError::Conflict(format!("stack {} is not at the claimed position", uuid))
}

#[async_trait]
impl Store for MemoryStore {
    async fn create(
        &self,
        uuid: &StackId,
        info: Bytes,
        data: Bytes,
        hash: Sha256Hash,
    ) -> Result<Stack> {
        let mut inner = self.write()?;

        if inner.contains_key(uuid) {
            return Err(StoreError::Conflict(format!("stack {} already exists", uuid)));
        }

        let block = Block {
            created: now_millis(),
            index: 0,
            data,
            hash,
        };
        let record = VersionRecord::new(info, block);
        let stack = record.project(*uuid, 1);

        let mut versions = BTreeMap::new();
        versions.insert(1, record);
        inner.insert(*uuid, StackRecord { versions });

        Ok(stack)
    }

    async fn append_block(&self, request: AppendBlock) -> Result<Stack> {
        let mut inner = self.write()?;
        let record = inner
            .get_mut(&request.uuid)
            .ok_or_else(|| stack_not_found(&request.uuid))?;

        let latest = record.versions.keys().next_back().copied();
        if latest != Some(request.version) {
            return Err(stale(&request.uuid));
        }
        let version = record
            .versions
            .get_mut(&request.version)
            .ok_or_else(|| stale(&request.uuid))?;
        if version.blocks.len() as u64 != request.height || version.hash != request.expected_hash
        {
            return Err(stale(&request.uuid));
        }

        let now = now_millis();
        version.blocks.push(Block {
            created: now,
            index: request.height,
            data: request.data,
            hash: request.block_hash,
        });
        version.hash = request.next_hash;
        version.updated = now;

        Ok(version.project(request.uuid, request.version))
    }

    async fn append_version(&self, request: AppendVersion) -> Result<Stack> {
        let mut inner = self.write()?;
        let record = inner
            .get_mut(&request.uuid)
            .ok_or_else(|| stack_not_found(&request.uuid))?;

        match record.latest() {
            Some((version, current))
                if version == request.version && current.hash == request.expected_hash => {}
            _ => return Err(stale(&request.uuid)),
        }

        let block = Block {
            created: now_millis(),
            index: 0,
            data: request.data,
            hash: request.block_hash,
        };
        let next = request.version + 1;
        let version = VersionRecord::new(request.info, block);
        let stack = version.project(request.uuid, next);
        record.versions.insert(next, version);

        Ok(stack)
    }

    async fn read_stack(&self, uuid: &StackId) -> Result<Stack> {
        let inner = self.read()?;
        inner
            .get(uuid)
            .and_then(StackRecord::latest)
            .map(|(version, record)| record.project(*uuid, version))
            .ok_or_else(|| stack_not_found(uuid))
    }

    async fn read_version(&self, uuid: &StackId, version: u64) -> Result<Stack> {
        let inner = self.read()?;
        inner
            .get(uuid)
            .and_then(|s| s.versions.get(&version))
            .map(|record| record.project(*uuid, version))
            .ok_or_else(|| version_not_found(uuid, version))
    }

    async fn read_info(&self, uuid: &StackId, version: u64) -> Result<Bytes> {
        let inner = self.read()?;
        inner
            .get(uuid)
            .and_then(|s| s.versions.get(&version))
            .map(|record| record.info.clone())
            .ok_or_else(|| version_not_found(uuid, version))
    }

    async fn read_block(&self, uuid: &StackId, version: u64, index: u64) -> Result<Block> {
        let inner = self.read()?;
        inner
            .get(uuid)
            .and_then(|s| s.versions.get(&version))
            .and_then(|record| record.blocks.get(index as usize))
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "block {} of version {} of stack {}",
                    index, version, uuid
                ))
            })
    }

    async fn size(&self, uuid: Option<&StackId>) -> Result<Vec<SizeEntry>> {
        let inner = self.read()?;

        match uuid {
            None => {
                let mut stacks: Vec<_> = inner.iter().collect();
                stacks.sort_by_key(|(id, _)| id.to_string());

                Ok(stacks
                    .into_iter()
                    .flat_map(|(id, stack)| {
                        stack.versions.iter().map(move |(version, record)| {
                            let projected = record.project(*id, *version);
                            SizeEntry::Version(VersionSize {
                                uuid: projected.uuid,
                                created: projected.created,
                                updated: projected.updated,
                                version: projected.version,
                                height: projected.height,
                                hash: projected.hash,
                                size: record.blocks.iter().map(|b| b.data.len() as u64).sum(),
                            })
                        })
                    })
                    .collect())
            }
            Some(uuid) => {
                let stack = inner.get(uuid).ok_or_else(|| stack_not_found(uuid))?;

                Ok(stack
                    .versions
                    .iter()
                    .flat_map(|(version, record)| {
                        record.blocks.iter().map(move |block| {
                            SizeEntry::Block(BlockSize {
                                version: *version,
                                created: block.created,
                                index: block.index,
                                hash: block.hash,
                                size: block.data.len() as u64,
                            })
                        })
                    })
                    .collect())
            }
        }
    }

    async fn vacuum(&self) -> Result<usize> {
        let mut inner = self.write()?;
        let mut removed = 0;

        for (uuid, stack) in inner.iter_mut() {
            if let Some(latest) = stack.versions.keys().next_back().copied() {
                let kept = stack.versions.split_off(&latest);
                for version in stack.versions.keys() {
                    tracing::debug!(stack = %uuid.short(), version, "vacuuming version");
                }
                removed += stack.versions.len();
                stack.versions = kept;
            }
        }

        tracing::info!(removed, "vacuumed superseded versions");
        Ok(removed)
    }
}
