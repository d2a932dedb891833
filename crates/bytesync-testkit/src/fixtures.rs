//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use bytesync::{Server, ServerConfig};
use bytesync_core::{Block, Stack};
use bytesync_perms::AllowAll;
use bytesync_store::{MemoryStore, SqliteStore, Store};
use bytesync_sync::{Client, JsonTransport, LocalTransport, SyncHandler};

/// A server over a fresh store, with clients wired to it in-process.
pub struct TestFixture<S: Store = MemoryStore> {
    pub server: Server<S, AllowAll>,
}

impl TestFixture<MemoryStore> {
    /// Fixture over an empty in-memory store.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for TestFixture<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture<SqliteStore> {
    /// Fixture over an in-memory SQLite database.
    pub fn sqlite() -> Self {
        Self::with_store(SqliteStore::open_memory().expect("open in-memory sqlite"))
    }
}

impl<S: Store> TestFixture<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            server: Server::with_store(Arc::new(store), AllowAll, &ServerConfig::default()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        self.server.store()
    }

    /// Client calling the dispatcher with typed messages.
    pub fn client(&self) -> Client<LocalTransport<S>> {
        Client::new(self.server.local_transport())
    }

    /// Client going through the JSON wire form.
    pub fn json_client(&self) -> Client<JsonTransport<S>> {
        Client::new(self.server.json_transport())
    }

    /// Build a stack from blocks grouped by version.
    ///
    /// Version `n` gets the info returned by [`info_for`]. Every version must
    /// have at least one block.
    pub async fn create_stack(&self, versions: &[Vec<Vec<u8>>]) -> Stack {
        let client = self.client();
        let mut stack: Option<Stack> = None;

        for (i, blocks) in versions.iter().enumerate() {
            let (first, rest) = blocks.split_first().expect("version without blocks");
            let info = info_for(i as u64 + 1);
            let first = Bytes::copy_from_slice(first);

            let mut current = match stack {
                None => client.create(info, first).await.expect("create"),
                Some(previous) => client
                    .version(&previous.view(), info, first)
                    .await
                    .expect("append version")
                    .stack()
                    .clone(),
            };
            for data in rest {
                current = client
                    .block(&current.view(), Bytes::copy_from_slice(data))
                    .await
                    .expect("append block")
                    .stack()
                    .clone();
            }
            stack = Some(current);
        }

        stack.expect("at least one version")
    }

    /// Blocks `A`, `B` in version 1 and `C` in version 2.
    pub async fn scenario(&self) -> Stack {
        self.create_stack(&[vec![b"A".to_vec(), b"B".to_vec()], vec![b"C".to_vec()]])
            .await
    }
}

/// Info blob used by [`TestFixture::create_stack`] for a version.
pub fn info_for(version: u64) -> Bytes {
    Bytes::from(format!("info{}", version))
}

/// One delivery observed by a [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Version { version: u64, info: Bytes, data: Bytes },
    Block { version: u64, index: u64, data: Bytes },
}

impl SyncEvent {
    pub fn data(&self) -> &Bytes {
        match self {
            SyncEvent::Version { data, .. } | SyncEvent::Block { data, .. } => data,
        }
    }
}

/// Sync handler that records every delivery.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub events: Vec<SyncEvent>,
    cancel_after: Option<usize>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report cancellation once `events` deliveries have been recorded.
    pub fn cancel_after(events: usize) -> Self {
        Self {
            events: Vec::new(),
            cancel_after: Some(events),
        }
    }

    /// Delivered block payloads, in order.
    pub fn data(&self) -> Vec<Bytes> {
        self.events.iter().map(|e| e.data().clone()).collect()
    }
}

#[async_trait]
impl SyncHandler for RecordingHandler {
    async fn on_block(&mut self, stack: &Stack, block: &Block) -> bytesync_sync::Result<()> {
        self.events.push(SyncEvent::Block {
            version: stack.version,
            index: block.index,
            data: block.data.clone(),
        });
        Ok(())
    }

    async fn on_version(
        &mut self,
        stack: &Stack,
        info: &Bytes,
        block: &Block,
    ) -> bytesync_sync::Result<()> {
        self.events.push(SyncEvent::Version {
            version: stack.version,
            info: info.clone(),
            data: block.data.clone(),
        });
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_after
            .map_or(false, |limit| self.events.len() >= limit)
    }
}
