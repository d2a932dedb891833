//! Stack, version and block data as seen by clients.
//!
//! A stack is a versioned, append-only log. Its current view is a projection
//! of its latest version; nothing about a stack is stored apart from its
//! identifier and its versions.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::encoding::{base64_bytes, shorten, to_base64};
use crate::types::{Sha256Hash, StackId};

/// Server projection of one version of a stack.
///
/// `height` counts the blocks appended to `version`; `hash` is the version's
/// chained hash after those blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub uuid: StackId,
    /// Version creation time (Unix ms).
    pub created: i64,
    /// Time of the last accepted block write (Unix ms).
    pub updated: i64,
    pub version: u64,
    pub height: u64,
    pub hash: Sha256Hash,
}

impl Stack {
    /// The position this stack occupies, as a client would claim it.
    pub fn view(&self) -> StackView {
        StackView::from(self)
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{uuid={},version={},height={},hash={}}}",
            self.uuid.short(),
            self.version,
            self.height,
            self.hash.short()
        )
    }
}

/// A client's claimed position in a stack.
///
/// `created`/`updated` may be present when a client echoes a server [`Stack`]
/// back; they are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackView {
    pub uuid: StackId,
    pub version: u64,
    pub height: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<Sha256Hash>,
}

impl StackView {
    /// Position before the first version: replaying from here yields the whole stack.
    pub fn origin(uuid: StackId) -> Self {
        Self {
            uuid,
            version: 0,
            height: 0,
            hash: None,
        }
    }

    /// Whether this view is at or behind `(version, height)`.
    pub fn is_behind_or_at(&self, version: u64, height: u64) -> bool {
        (self.version, self.height) <= (version, height)
    }
}

impl From<&Stack> for StackView {
    fn from(stack: &Stack) -> Self {
        Self {
            uuid: stack.uuid,
            version: stack.version,
            height: stack.height,
            hash: Some(stack.hash),
        }
    }
}

impl From<Stack> for StackView {
    fn from(stack: Stack) -> Self {
        Self::from(&stack)
    }
}

impl fmt::Display for StackView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{uuid={},version={},height={}",
            self.uuid.short(),
            self.version,
            self.height
        )?;
        if let Some(hash) = &self.hash {
            write!(f, ",hash={}", hash.short())?;
        }
        f.write_str("}")
    }
}

/// One opaque payload unit within a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Insertion time (Unix ms).
    pub created: i64,
    /// Zero-based position within the version.
    pub index: u64,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
    /// Content hash of `data`.
    pub hash: Sha256Hash,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{index={},hash={},data={}}}",
            self.index,
            self.hash.short(),
            shorten(&to_base64(&self.data))
        )
    }
}

/// Address of a specific version, used by random-access reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRef {
    pub uuid: StackId,
    pub version: u64,
}

/// Address of a block within a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub index: u64,
}

/// Stored byte total of one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSize {
    pub uuid: StackId,
    pub created: i64,
    pub updated: i64,
    pub version: u64,
    pub height: u64,
    pub hash: Sha256Hash,
    pub size: u64,
}

/// Stored byte size of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSize {
    pub version: u64,
    pub created: i64,
    pub index: u64,
    pub hash: Sha256Hash,
    pub size: u64,
}

/// One line of a size report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SizeEntry {
    #[serde(rename = "size.version")]
    Version(VersionSize),
    #[serde(rename = "size.block")]
    Block(BlockSize),
}

impl SizeEntry {
    /// Stored bytes accounted for by this entry.
    pub fn size(&self) -> u64 {
        match self {
            SizeEntry::Version(v) => v.size,
            SizeEntry::Block(b) => b.size,
        }
    }
}
