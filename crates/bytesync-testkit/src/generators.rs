//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use bytesync_core::{BlockRef, Sha256Hash, StackId, StackView, VersionRef};
use bytesync_sync::Request;

/// Generate a random StackId.
pub fn stack_id() -> impl Strategy<Value = StackId> {
    any::<[u8; 16]>().prop_map(StackId::from_bytes)
}

/// Generate a random Sha256Hash.
pub fn sha256_hash() -> impl Strategy<Value = Sha256Hash> {
    any::<[u8; 32]>().prop_map(Sha256Hash::from_bytes)
}

/// Generate block data of at most `max_len` bytes.
pub fn block_data(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a claimed position, with or without a hash.
pub fn stack_view() -> impl Strategy<Value = StackView> {
    (stack_id(), 0u64..8, 0u64..8, proptest::option::of(sha256_hash())).prop_map(
        |(uuid, version, height, hash)| StackView {
            uuid,
            version,
            height,
            hash,
        },
    )
}

/// Generate any request, valid or not for a given store.
pub fn request() -> impl Strategy<Value = Request> {
    let bytes = || block_data(64).prop_map(Bytes::from);
    prop_oneof![
        (bytes(), bytes()).prop_map(|(info, block)| Request::Create { info, block }),
        (stack_view(), bytes()).prop_map(|(stack, block)| Request::Block { stack, block }),
        (stack_view(), bytes(), bytes())
            .prop_map(|(stack, info, block)| Request::Version { stack, info, block }),
        stack_view().prop_map(|stack| Request::Sync { stack }),
        proptest::option::of(stack_view()).prop_map(|stack| Request::Size { stack }),
        (stack_id(), 0u64..8, 0u64..8).prop_map(|(uuid, version, index)| Request::Read {
            stack: VersionRef { uuid, version },
            block: BlockRef { index },
        }),
        Just(Request::Vacuum),
    ]
}

/// Blocks of a stack grouped by version; every version has at least one block.
#[derive(Debug, Clone)]
pub struct StackShape {
    pub versions: Vec<Vec<Vec<u8>>>,
}

impl StackShape {
    /// Total number of blocks across all versions.
    pub fn block_count(&self) -> usize {
        self.versions.iter().map(Vec::len).sum()
    }

    /// Blocks of the last version.
    pub fn latest(&self) -> &[Vec<u8>] {
        self.versions.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Arbitrary for StackShape {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop::collection::vec(prop::collection::vec(block_data(32), 1..6), 1..4)
            .prop_map(|versions| StackShape { versions })
            .boxed()
    }
}
