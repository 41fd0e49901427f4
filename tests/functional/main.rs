// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the cluster worker and event dispatcher.
//!
//! These tests drive the production reconcile logic WITHOUT requiring a live
//! Kubernetes cluster or Zookeeper ensemble. The Kubernetes API and the
//! ensemble are replaced by in-memory mocks that record every mutation.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_lost_quorum_blocks_mutation
//!
//! # Run with verbose output
//! cargo test --test functional -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! - **Scenario tests**: bootstrap, recovery, reconfiguration, scaling,
//!   dead-member replacement, lost quorum and rolling upgrades
//! - **Dispatcher tests**: routing of watch events to per-cluster workers

mod dispatcher_tests;
mod scenario_tests;

// Re-export for use in tests
pub use mock_state::*;
