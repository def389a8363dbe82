//! # tillsync testkit
//!
//! Testing utilities for tillsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Canonical vectors**: JSON inputs with their expected canonical encoding
//! - **Generators**: Proptest strategies for entities, records and queue items
//! - **Fixtures**: An in-memory engine harness and sample POS entities
//!
//! ## Canonical Vectors
//!
//! Checksums are computed over canonical JSON, so the encoding must not drift:
//!
//! ```rust
//! use tillsync_testkit::vectors::all_vectors;
//!
//! for vector in all_vectors() {
//!     assert_eq!(vector.encode(), vector.canonical);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tillsync_core::Checksum;
//! use tillsync_testkit::generators::json_value;
//!
//! proptest! {
//!     #[test]
//!     fn checksum_is_deterministic(value in json_value()) {
//!         prop_assert_eq!(Checksum::of_value(&value), Checksum::of_value(&value));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use tillsync_testkit::fixtures::{product, TestHarness};
//!
//! async fn example() {
//!     let harness = TestHarness::offline();
//!     harness
//!         .engine
//!         .save(tillsync_core::EntityType::Product, "p-1", &product("p-1", "Coffee", 350))
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{contact, deterministic_config, product, sale, setting, TestHarness};
