//! # Bytesync Testkit
//!
//! Testing utilities for bytesync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Block sequences with their expected version hashes
//! - **Generators**: Proptest strategies for stacks, positions and requests
//! - **Fixtures**: A server over a fresh store plus a recording sync handler
//!
//! ## Golden Vectors
//!
//! ```rust
//! use bytesync_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, hex) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, hex);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use bytesync_testkit::generators::StackShape;
//!
//! proptest! {
//!     #[test]
//!     fn every_version_has_blocks(shape: StackShape) {
//!         prop_assert!(shape.versions.iter().all(|v| !v.is_empty()));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use bytesync_core::StackView;
//! use bytesync_testkit::fixtures::{RecordingHandler, TestFixture};
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let stack = fixture.scenario().await;
//!
//!     let mut handler = RecordingHandler::new();
//!     fixture
//!         .client()
//!         .sync(&StackView::origin(stack.uuid), &mut handler)
//!         .await
//!         .unwrap();
//!     assert_eq!(handler.events.len(), 3);
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{info_for, RecordingHandler, SyncEvent, TestFixture};
pub use generators::StackShape;
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
