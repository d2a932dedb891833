//! Error types for the sync module.

use thiserror::Error;

use bytesync_core::CoreError;
use bytesync_store::StoreError;

use crate::messages::ErrorCode;

/// Errors that can occur during dispatch and client sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Stack, version or block absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Claimed position does not match the server; resync and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Capability check failed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Unrecognized request or missing required field.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Backing store fault.
    #[error("store failure: {0}")]
    StoreFailure(String),

    /// The server answered with an error response.
    #[error("remote error ({code}): {message}")]
    Remote { code: ErrorCode, message: String },

    /// The server answered with a response that does not fit the request.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A received block or the locally recomputed version hash does not
    /// match what the server claims.
    #[error("chain check failed: {0}")]
    Chain(#[from] CoreError),

    /// The sync loop hit its configured round-trip bound.
    #[error("round trip limit of {0} reached")]
    RoundTripLimit(usize),

    /// A sync handler callback failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// JSON encoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Wire category for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::NotFound(_) => ErrorCode::NotFound,
            SyncError::Conflict(_) => ErrorCode::Conflict,
            SyncError::Forbidden(_) => ErrorCode::Forbidden,
            SyncError::MalformedRequest(_) | SyncError::Serialization(_) => {
                ErrorCode::MalformedRequest
            }
            SyncError::StoreFailure(_) => ErrorCode::StoreFailure,
            SyncError::Remote { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether the caller should resync and retry.
    pub fn is_conflict(&self) -> bool {
        self.code().is_retryable()
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => SyncError::NotFound(what),
            StoreError::Conflict(why) => SyncError::Conflict(why),
            other => SyncError::StoreFailure(other.to_string()),
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_codes() {
        let not_found: SyncError = StoreError::NotFound("stack x".into()).into();
        assert_eq!(not_found.code(), ErrorCode::NotFound);

        let conflict: SyncError = StoreError::Conflict("stale".into()).into();
        assert!(conflict.is_conflict());

        let io: SyncError =
            StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")).into();
        assert_eq!(io.code(), ErrorCode::StoreFailure);
    }

    #[test]
    fn test_remote_keeps_code() {
        let err = SyncError::Remote {
            code: ErrorCode::Forbidden,
            message: "no".into(),
        };
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert_eq!(err.to_string(), "remote error (forbidden): no");
    }
}
