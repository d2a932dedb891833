//! Error types for bytesync core.

use thiserror::Error;

/// Errors raised while decoding or checking core data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid hash length: expected 32 bytes, got {0}")]
    InvalidHashLength(usize),

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("invalid stack id: {0}")]
    InvalidStackId(#[from] uuid::Error),

    #[error("block hash mismatch at index {index}: expected {expected}, got {actual}")]
    BlockHashMismatch {
        index: u64,
        expected: String,
        actual: String,
    },

    #[error("chain mismatch: expected {expected}, computed {actual}")]
    ChainMismatch { expected: String, actual: String },

    #[error("empty chain")]
    EmptyChain,
}
