//! Reconciliation state machine.
//!
//! Given the position a client claims to hold, decide the single next step it
//! needs: nothing ([`Outcome::Synced`]), the next block of the version it is
//! on ([`Outcome::NeedBlock`]), or the next version's info and first block
//! ([`Outcome::NeedVersion`]).
//!
//! ```text
//! claimed == latest            -> Synced(latest)
//! claimed ahead of latest      -> Conflict
//! any version, height 0        -> NeedVersion(claimed.version)
//! same version, lower height   -> NeedBlock(block[claimed.height])
//! older version, unfinished    -> NeedBlock(block[claimed.height]) of that version
//! older version, finished      -> NeedVersion(claimed.version + 1)
//! ```
//!
//! Each outcome strictly advances `(version, height)`, so a client replaying
//! from `{version: 0, height: 0}` reaches `Synced` in one round trip per
//! retained block plus one per version boundary.

use bytes::Bytes;

use bytesync_core::{Block, Stack, StackView};
use bytesync_store::{Store, StoreError};

use crate::error::{Result, SyncError};
use crate::messages::Response;

/// Configuration for reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Reject a claim whose hash differs from the server's at the same position.
    ///
    /// When off, positions are compared by `(version, height)` only.
    pub verify_hash: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { verify_hash: true }
    }
}

/// The next step for a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The client holds the latest state.
    Synced(Stack),

    /// The client is missing `block` of the version described by `stack`.
    NeedBlock { stack: Stack, block: Block },

    /// The client must adopt the version described by `stack`.
    NeedVersion { stack: Stack, info: Bytes, block: Block },
}

impl Outcome {
    /// The server-side stack projection carried by this outcome.
    pub fn stack(&self) -> &Stack {
        match self {
            Outcome::Synced(stack)
            | Outcome::NeedBlock { stack, .. }
            | Outcome::NeedVersion { stack, .. } => stack,
        }
    }

    /// Check if the client is caught up.
    pub fn is_synced(&self) -> bool {
        matches!(self, Outcome::Synced(_))
    }
}

impl From<Outcome> for Response {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Synced(stack) => Response::Sync { stack },
            Outcome::NeedBlock { stack, block } => Response::Block { stack, block },
            Outcome::NeedVersion { stack, info, block } => Response::Version { stack, info, block },
        }
    }
}

impl TryFrom<Response> for Outcome {
    type Error = SyncError;

    fn try_from(response: Response) -> Result<Self> {
        match response {
            Response::Sync { stack } => Ok(Outcome::Synced(stack)),
            Response::Block { stack, block } => Ok(Outcome::NeedBlock { stack, block }),
            Response::Version { stack, info, block } => {
                Ok(Outcome::NeedVersion { stack, info, block })
            }
            Response::Error { error, code } => Err(SyncError::Remote {
                code,
                message: error,
            }),
            other => Err(SyncError::UnexpectedResponse(format!(
                "expected a sync outcome, got {}",
                other.kind()
            ))),
        }
    }
}

fn check_hash(claimed: &StackView, server: &Stack, config: &ReconcileConfig) -> Result<()> {
    match claimed.hash {
        Some(hash) if config.verify_hash && hash != server.hash => Err(SyncError::Conflict(
            format!("claimed hash differs from server at {}", server),
        )),
        _ => Ok(()),
    }
}

/// Decide the next step for a client at `claimed`.
pub async fn reconcile<S>(store: &S, claimed: &StackView, config: &ReconcileConfig) -> Result<Outcome>
where
    S: Store + ?Sized,
{
    let server = store.read_stack(&claimed.uuid).await?;
    let claimed_pos = (claimed.version, claimed.height);
    let server_pos = (server.version, server.height);

    if claimed_pos == server_pos {
        check_hash(claimed, &server, config)?;
        tracing::debug!(stack = %server, "synchronised");
        return Ok(Outcome::Synced(server));
    }

    if !claimed.is_behind_or_at(server.version, server.height) {
        return Err(SyncError::Conflict(format!(
            "claimed position {} is ahead of server {}",
            claimed, server
        )));
    }

    if claimed.version == server.version && claimed.height > 0 {
        let block = store
            .read_block(&server.uuid, server.version, claimed.height)
            .await?;
        tracing::debug!(stack = %server, block = %block, "next block");
        return Ok(Outcome::NeedBlock {
            stack: server,
            block,
        });
    }

    // Finish the claimed version if it is still retained.
    if claimed.version > 0 {
        match store.read_version(&claimed.uuid, claimed.version).await {
            // Block 0 is only readable together with the version's info.
            Ok(current) if claimed.height == 0 => return need_version(store, current).await,
            Ok(current) if claimed.height < current.height => {
                let block = store
                    .read_block(&current.uuid, current.version, claimed.height)
                    .await?;
                tracing::debug!(stack = %current, block = %block, "next block of older version");
                return Ok(Outcome::NeedBlock {
                    stack: current,
                    block,
                });
            }
            Ok(current) if claimed.height > current.height => {
                return Err(SyncError::Conflict(format!(
                    "claimed position {} is ahead of version {}",
                    claimed, current
                )));
            }
            Ok(current) => check_hash(claimed, &current, config)?,
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    // A gap means the versions in between were vacuumed.
    let next = match store.read_version(&claimed.uuid, claimed.version + 1).await {
        Ok(next) => next,
        Err(StoreError::NotFound(_)) => server,
        Err(e) => return Err(e.into()),
    };
    need_version(store, next).await
}

async fn need_version<S>(store: &S, stack: Stack) -> Result<Outcome>
where
    S: Store + ?Sized,
{
    let info = store.read_info(&stack.uuid, stack.version).await?;
    let block = store.read_block(&stack.uuid, stack.version, 0).await?;

    tracing::debug!(stack = %stack, block = %block, "next version");
    Ok(Outcome::NeedVersion { stack, info, block })
}
