//! Golden hash-chain vectors.
//!
//! Every implementation of the chain must produce these version hashes for
//! these block sequences.

use bytesync_core::{verify_chain, ChainAccumulator, CoreError, Sha256Hash};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Block payloads of one version, in order.
    pub blocks: Vec<Vec<u8>>,
    /// Expected version hash after all blocks (hex).
    pub expected_hash: &'static str,
}

impl GoldenVector {
    /// Version hash computed by this implementation.
    pub fn compute(&self) -> Sha256Hash {
        let mut acc = ChainAccumulator::new();
        for block in &self.blocks {
            acc.push(block);
        }
        acc.hash().unwrap_or(Sha256Hash::ZERO)
    }

    /// Replay the blocks against the expected hash.
    pub fn verify(&self) -> Result<(), CoreError> {
        let expected = Sha256Hash::from_hex(self.expected_hash)?;
        verify_chain(self.blocks.iter().map(Vec::as_slice), &expected)
    }
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "single block",
            blocks: vec![b"A".to_vec()],
            expected_hash: "559aead08264d5795d3909718cdd05abd49572e84fe55590eef31a88a08fdffd",
        },
        GoldenVector {
            name: "two blocks",
            blocks: vec![b"A".to_vec(), b"B".to_vec()],
            expected_hash: "63956f0ce48edc48a0d528cb0b5d58e4d625afb14d63ca1bb9950eb657d61f40",
        },
        GoldenVector {
            name: "three blocks",
            blocks: vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()],
            expected_hash: "dbe11e36aa89a963103de7f8ad09c1100c06ccd5c5ad424ca741efb0689dc427",
        },
        GoldenVector {
            name: "empty block",
            blocks: vec![Vec::new()],
            expected_hash: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        },
        GoldenVector {
            name: "hello world",
            blocks: vec![b"hello".to_vec(), b"world".to_vec()],
            expected_hash: "7305db9b2abccd706c256db3d97e5ff48d677cfe4d3a5904afb7da0e3950e1e2",
        },
        GoldenVector {
            name: "large block",
            blocks: vec![vec![0x42; 1024]],
            expected_hash: "9b6ce55f379e9771551de6939556a7e6b949814ae27c2f5cfd5dbeb378ce7c2a",
        },
        GoldenVector {
            name: "all byte values",
            blocks: vec![(0u8..=255).collect()],
            expected_hash: "40aff2e9d2d8922e47afd4648e6967497158785fbd1da870e7110266bf944880",
        },
        GoldenVector {
            name: "mixed sizes",
            blocks: vec![
                Vec::new(),
                vec![0x00],
                (0u8..=255).collect(),
                b"hello".to_vec(),
            ],
            expected_hash: "0eb6cf821777c0c84f06658fd7cf96ccb06bbc08362ed16ca660dc82b9d00f1b",
        },
    ]
}

/// Check every vector: `(name, matches, computed hex)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let hex = v.compute().to_hex();
            (v.name.to_string(), v.verify().is_ok(), hex)
        })
        .collect()
}
