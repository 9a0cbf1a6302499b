//! # Keyward Testkit
//!
//! Testing utilities for Keyward.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a wired-up service with inspectable stores and a token
//!   issuer, plus a fault-injecting auth store
//! - **Generators**: Proptest strategies for ids, keys, payloads and Access
//!   Objects
//! - **Vectors**: fixed-input MAC and record vectors, exportable as JSON
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use keyward_testkit::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let alice = fixture.user().await;
//!     let object_id = fixture
//!         .service
//!         .store(&alice.credential, b"data".to_vec(), b"".to_vec())
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use keyward_testkit::generators::access_object;
//!
//! proptest! {
//!     #[test]
//!     fn members_are_sorted(ao in access_object()) {
//!         prop_assert!(ao.users().windows(2).all(|w| w[0] < w[1]));
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{FaultyAuthStore, TestFixture, TestUser};

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
