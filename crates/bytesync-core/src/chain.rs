//! The per-version hash chain.
//!
//! Each version's hash is a running accumulator over the blocks appended to it:
//!
//! ```text
//! h_0 = SHA256(block_0)
//! h_n = SHA256(h_{n-1} || SHA256(block_n))
//! ```
//!
//! The concatenation is over the raw 32-byte digests. A `(version, height, hash)`
//! triple therefore pins the exact block sequence of a version, which is what
//! makes it usable as the fencing token for conditional writes.

use sha2::{Digest, Sha256};

use crate::error::CoreError;
use crate::types::Sha256Hash;

/// Content hash of raw block bytes.
pub fn block_hash(data: &[u8]) -> Sha256Hash {
    Sha256Hash::hash(data)
}

/// Version hash after the first block: the block hash itself.
pub fn first_version_hash(block_hash: Sha256Hash) -> Sha256Hash {
    block_hash
}

/// Version hash after appending a block with hash `block_hash`.
pub fn next_version_hash(previous: &Sha256Hash, block_hash: &Sha256Hash) -> Sha256Hash {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(block_hash.as_bytes());
    Sha256Hash(hasher.finalize().into())
}

/// Incremental builder for a version hash.
#[derive(Debug, Clone, Default)]
pub struct ChainAccumulator {
    hash: Option<Sha256Hash>,
    height: u64,
}

impl ChainAccumulator {
    /// Start an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a known version hash and height.
    pub fn resume(hash: Sha256Hash, height: u64) -> Self {
        Self {
            hash: Some(hash),
            height,
        }
    }

    /// Fold in raw block data.
    pub fn push(&mut self, data: &[u8]) -> Sha256Hash {
        self.push_hash(block_hash(data))
    }

    /// Fold in an already computed block hash.
    pub fn push_hash(&mut self, block_hash: Sha256Hash) -> Sha256Hash {
        let next = match &self.hash {
            None => first_version_hash(block_hash),
            Some(prev) => next_version_hash(prev, &block_hash),
        };
        self.hash = Some(next);
        self.height += 1;
        next
    }

    /// Current version hash, `None` before the first block.
    pub fn hash(&self) -> Option<Sha256Hash> {
        self.hash
    }

    /// Number of blocks folded so far.
    pub fn height(&self) -> u64 {
        self.height
    }
}

/// Check that block `index` carries the content hash of its data.
pub fn verify_block(index: u64, data: &[u8], expected: &Sha256Hash) -> Result<(), CoreError> {
    let actual = block_hash(data);
    if &actual != expected {
        return Err(CoreError::BlockHashMismatch {
            index,
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(())
}

/// Compare a locally computed version hash with the authoritative one.
pub fn verify_version_hash(expected: &Sha256Hash, actual: &Sha256Hash) -> Result<(), CoreError> {
    if actual != expected {
        return Err(CoreError::ChainMismatch {
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(())
}

/// Recompute the version hash over `blocks` and compare it with `expected`.
pub fn verify_chain<'a, I>(blocks: I, expected: &Sha256Hash) -> Result<(), CoreError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut acc = ChainAccumulator::new();
    for data in blocks {
        acc.push(data);
    }
    let actual = acc.hash().ok_or(CoreError::EmptyChain)?;
    verify_version_hash(expected, &actual)
}
