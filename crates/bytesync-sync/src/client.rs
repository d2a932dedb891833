//! Client sync driver.
//!
//! The driver holds a cursor `{uuid, version, height, hash}` and repeatedly
//! asks the server what it is missing, handing each block or version to a
//! [`SyncHandler`] until the server answers `Synced`. Every step strictly
//! advances the cursor, so the loop terminates.

use async_trait::async_trait;
use bytes::Bytes;

use bytesync_core::{
    first_version_hash, verify_block, verify_version_hash, Block, BlockRef, ChainAccumulator,
    SizeEntry, Stack, StackId, StackView, VersionRef,
};

use crate::error::{Result, SyncError};
use crate::messages::{Request, Response};
use crate::reconcile::Outcome;
use crate::transport::Transport;

/// Configuration for the client driver.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Check block content hashes and the cursor's chained hash against the
    /// server's.
    pub verify_chain: bool,
    /// Give up after this many sync round trips.
    pub max_round_trips: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            verify_chain: true,
            max_round_trips: None,
        }
    }
}

/// Receives what the driver pulls from the server.
#[async_trait]
pub trait SyncHandler: Send {
    /// Called with the next block of the version the cursor is on.
    async fn on_block(&mut self, stack: &Stack, block: &Block) -> Result<()>;

    /// Called when the cursor moves to a new version, with its info and block 0.
    async fn on_version(&mut self, stack: &Stack, info: &Bytes, block: &Block) -> Result<()>;

    /// Checked once before every round trip.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Result of a completed sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Server state the client now holds.
    pub stack: Stack,
    /// Blocks delivered through [`SyncHandler::on_block`].
    pub blocks: usize,
    /// Versions delivered through [`SyncHandler::on_version`].
    pub versions: usize,
    /// Sync requests sent, including the final one.
    pub round_trips: usize,
}

/// Typed client over a [`Transport`].
pub struct Client<T: Transport> {
    transport: T,
    config: ClientConfig,
}

impl<T: Transport> Client<T> {
    /// Create a client with default configuration.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: ClientConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn request(&self, request: Request) -> Result<Response> {
        match self.transport.send(request).await? {
            Response::Error { error, code } => Err(SyncError::Remote {
                code,
                message: error,
            }),
            response => Ok(response),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a stack; returns its first state.
    pub async fn create(&self, info: Bytes, block: Bytes) -> Result<Stack> {
        match self.request(Request::Create { info, block }).await? {
            Response::Create { stack } => Ok(stack),
            other => Err(unexpected("response.create", &other)),
        }
    }

    /// Append a block to the version `stack` is on.
    ///
    /// Fails with a `conflict` remote error if `stack` is not the latest state.
    pub async fn block(&self, stack: &StackView, block: Bytes) -> Result<Outcome> {
        let response = self
            .request(Request::Block {
                stack: stack.clone(),
                block,
            })
            .await?;
        Outcome::try_from(response)
    }

    /// Seal the version `stack` is on and open a new one.
    pub async fn version(&self, stack: &StackView, info: Bytes, block: Bytes) -> Result<Outcome> {
        let response = self
            .request(Request::Version {
                stack: stack.clone(),
                info,
                block,
            })
            .await?;
        Outcome::try_from(response)
    }

    /// One reconciliation round trip.
    pub async fn sync_once(&self, cursor: &StackView) -> Result<Outcome> {
        let response = self
            .request(Request::Sync {
                stack: cursor.clone(),
            })
            .await?;
        Outcome::try_from(response)
    }

    /// Byte usage of one stack, or of every stack.
    pub async fn size(&self, stack: Option<&StackView>) -> Result<Vec<SizeEntry>> {
        match self
            .request(Request::Size {
                stack: stack.cloned(),
            })
            .await?
        {
            Response::Size { size } => Ok(size),
            other => Err(unexpected("response.size", &other)),
        }
    }

    /// Random access to one block of one version.
    pub async fn read(&self, uuid: &StackId, version: u64, index: u64) -> Result<(Stack, Block)> {
        let request = Request::Read {
            stack: VersionRef {
                uuid: *uuid,
                version,
            },
            block: BlockRef { index },
        };
        match self.request(request).await? {
            Response::Block { stack, block } => Ok((stack, block)),
            other => Err(unexpected("response.block", &other)),
        }
    }

    /// Delete superseded versions on the server.
    pub async fn vacuum(&self) -> Result<()> {
        match self.request(Request::Vacuum).await? {
            Response::Vacuum => Ok(()),
            other => Err(unexpected("response.vacuum", &other)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Pull everything after `cursor` into `handler`.
    ///
    /// Any error response ends the loop; retrying is up to the caller.
    pub async fn sync<H>(&self, cursor: &StackView, handler: &mut H) -> Result<SyncReport>
    where
        H: SyncHandler + ?Sized,
    {
        let mut cursor = cursor.clone();
        let mut blocks = 0;
        let mut versions = 0;
        let mut round_trips = 0;

        loop {
            if handler.is_cancelled() {
                tracing::debug!(cursor = %cursor, "sync cancelled");
                return Err(SyncError::Cancelled);
            }
            if let Some(max) = self.config.max_round_trips {
                if round_trips >= max {
                    return Err(SyncError::RoundTripLimit(max));
                }
            }

            let outcome = self.sync_once(&cursor).await?;
            round_trips += 1;
            cursor = self.advance(&cursor, &outcome)?;

            match outcome {
                Outcome::Synced(stack) => {
                    tracing::debug!(stack = %stack, blocks, versions, round_trips, "sync complete");
                    return Ok(SyncReport {
                        stack,
                        blocks,
                        versions,
                        round_trips,
                    });
                }
                Outcome::NeedBlock { stack, block } => {
                    handler.on_block(&stack, &block).await?;
                    blocks += 1;
                }
                Outcome::NeedVersion { stack, info, block } => {
                    handler.on_version(&stack, &info, &block).await?;
                    versions += 1;
                }
            }
        }
    }

    /// The cursor after applying `outcome`.
    fn advance(&self, cursor: &StackView, outcome: &Outcome) -> Result<StackView> {
        let stack = outcome.stack();
        if stack.uuid != cursor.uuid {
            return Err(SyncError::UnexpectedResponse(format!(
                "response for stack {} while syncing {}",
                stack.uuid, cursor.uuid
            )));
        }

        match outcome {
            Outcome::Synced(stack) => {
                if (stack.version, stack.height) != (cursor.version, cursor.height) {
                    return Err(SyncError::UnexpectedResponse(format!(
                        "synced at {} but cursor is {}",
                        stack, cursor
                    )));
                }
                self.adopt(cursor.clone(), stack)
            }
            Outcome::NeedBlock { stack, block } => {
                if stack.version != cursor.version || block.index != cursor.height {
                    return Err(SyncError::UnexpectedResponse(format!(
                        "block {} of version {} does not follow {}",
                        block.index, stack.version, cursor
                    )));
                }
                self.check_block(block)?;
                let hash = if block.index == 0 {
                    Some(ChainAccumulator::new().push_hash(block.hash))
                } else {
                    cursor
                        .hash
                        .map(|h| ChainAccumulator::resume(h, cursor.height).push_hash(block.hash))
                };
                self.adopt(
                    StackView {
                        uuid: cursor.uuid,
                        version: stack.version,
                        height: block.index + 1,
                        hash,
                    },
                    stack,
                )
            }
            Outcome::NeedVersion { stack, block, .. } => {
                // A cursor at height 0 has not opened its version yet.
                if !cursor.is_behind_or_at(stack.version, 0) || block.index != 0 {
                    return Err(SyncError::UnexpectedResponse(format!(
                        "version {} does not follow {}",
                        stack.version, cursor
                    )));
                }
                self.check_block(block)?;
                self.adopt(
                    StackView {
                        uuid: cursor.uuid,
                        version: stack.version,
                        height: 1,
                        hash: Some(first_version_hash(block.hash)),
                    },
                    stack,
                )
            }
        }
    }

    /// Compare `next` against the server projection when they are at the same
    /// position, and take the server hash.
    fn adopt(&self, next: StackView, stack: &Stack) -> Result<StackView> {
        if (stack.version, stack.height) != (next.version, next.height) {
            return Ok(next);
        }
        if let Some(computed) = next.hash {
            if self.config.verify_chain {
                verify_version_hash(&stack.hash, &computed)?;
            }
        }
        Ok(StackView {
            hash: Some(stack.hash),
            ..next
        })
    }

    fn check_block(&self, block: &Block) -> Result<()> {
        if self.config.verify_chain {
            verify_block(block.index, &block.data, &block.hash)?;
        }
        Ok(())
    }
}

fn unexpected(expected: &str, got: &Response) -> SyncError {
    SyncError::UnexpectedResponse(format!("expected {}, got {}", expected, got.kind()))
}
