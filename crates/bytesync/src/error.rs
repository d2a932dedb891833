//! Error types for the facade.

use bytesync_core::{CoreError, Stack, StackView};
use bytesync_perms::PermsError;
use bytesync_store::StoreError;
use bytesync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur in server construction and secure client operations.
#[derive(Debug, Error)]
pub enum BytesyncError {
    /// Core data error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Encryption or permission error.
    #[error("permission error: {0}")]
    Perms(#[from] PermsError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The write is stored at `written`, but another writer appended after
    /// it before the response was built. Do not repeat the write; sync from
    /// `written` to pick up the rest.
    #[error("write stored at {written} but stack moved on to {latest}")]
    Diverged { written: StackView, latest: Stack },
}

impl BytesyncError {
    /// Whether the write was rejected and the caller should resync and retry.
    pub fn is_conflict(&self) -> bool {
        match self {
            BytesyncError::Sync(e) => e.is_conflict(),
            BytesyncError::Store(e) => e.is_conflict(),
            _ => false,
        }
    }

    /// Where a write landed that was stored despite the error.
    pub fn written(&self) -> Option<&StackView> {
        match self {
            BytesyncError::Diverged { written, .. } => Some(written),
            _ => None,
        }
    }
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, BytesyncError>;
