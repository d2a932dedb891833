//! Request and response messages.
//!
//! Messages are JSON objects discriminated by a `type` field. Binary fields
//! travel as base64, hashes as hex.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use bytesync_core::encoding::base64_bytes;
use bytesync_core::{Block, BlockRef, SizeEntry, Stack, StackId, StackView, VersionRef};

/// Requests accepted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Create a stack from its first version info and block.
    #[serde(rename = "request.create")]
    Create {
        #[serde(with = "base64_bytes")]
        info: Bytes,
        #[serde(with = "base64_bytes")]
        block: Bytes,
    },

    /// Append a block to the current version.
    #[serde(rename = "request.block")]
    Block {
        stack: StackView,
        #[serde(with = "base64_bytes")]
        block: Bytes,
    },

    /// Seal the current version and open a new one.
    #[serde(rename = "request.version")]
    Version {
        stack: StackView,
        #[serde(with = "base64_bytes")]
        info: Bytes,
        #[serde(with = "base64_bytes")]
        block: Bytes,
    },

    /// Ask what the client is missing.
    #[serde(rename = "request.sync")]
    Sync { stack: StackView },

    /// Byte usage, of one stack or all of them.
    #[serde(rename = "request.size")]
    Size {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<StackView>,
    },

    /// Random access to one block of one version.
    #[serde(rename = "request.read")]
    Read { stack: VersionRef, block: BlockRef },

    /// Delete superseded versions.
    #[serde(rename = "request.vacuum")]
    Vacuum,
}

impl Request {
    /// Wire name of the request kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Create { .. } => "request.create",
            Request::Block { .. } => "request.block",
            Request::Version { .. } => "request.version",
            Request::Sync { .. } => "request.sync",
            Request::Size { .. } => "request.size",
            Request::Read { .. } => "request.read",
            Request::Vacuum => "request.vacuum",
        }
    }

    /// The stack this request addresses, if any.
    pub fn stack_id(&self) -> Option<StackId> {
        match self {
            Request::Block { stack, .. }
            | Request::Version { stack, .. }
            | Request::Sync { stack } => Some(stack.uuid),
            Request::Size { stack } => stack.as_ref().map(|s| s.uuid),
            Request::Read { stack, .. } => Some(stack.uuid),
            Request::Create { .. } | Request::Vacuum => None,
        }
    }
}

/// Machine-readable error category carried by `response.error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    /// Stale claimed position; resync and retry.
    Conflict,
    Forbidden,
    MalformedRequest,
    StoreFailure,
    #[default]
    Internal,
}

impl ErrorCode {
    /// Whether the caller is expected to resync and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::Conflict)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::MalformedRequest => "malformed_request",
            ErrorCode::StoreFailure => "store_failure",
            ErrorCode::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Responses produced by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    #[serde(rename = "response.create")]
    Create { stack: Stack },

    /// The next block the client is missing, or a random-access read.
    #[serde(rename = "response.block")]
    Block { stack: Stack, block: Block },

    /// The next version the client must adopt, with its info and block 0.
    #[serde(rename = "response.version")]
    Version {
        stack: Stack,
        #[serde(with = "base64_bytes")]
        info: Bytes,
        block: Block,
    },

    /// The client holds the latest state.
    #[serde(rename = "response.sync")]
    Sync { stack: Stack },

    #[serde(rename = "response.size")]
    Size { size: Vec<SizeEntry> },

    #[serde(rename = "response.vacuum")]
    Vacuum,

    #[serde(rename = "response.error")]
    Error {
        error: String,
        #[serde(default)]
        code: ErrorCode,
    },
}

impl Response {
    /// Build an error response.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            error: message.into(),
            code,
        }
    }

    /// Wire name of the response kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Create { .. } => "response.create",
            Response::Block { .. } => "response.block",
            Response::Version { .. } => "response.version",
            Response::Sync { .. } => "response.sync",
            Response::Size { .. } => "response.size",
            Response::Vacuum => "response.vacuum",
            Response::Error { .. } => "response.error",
        }
    }

    /// Check if this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}
