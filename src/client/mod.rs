//! Ensemble client module for dynamic membership operations.
//!
//! This module wraps the `zookeeper-client` crate behind the narrow
//! [`EnsembleClient`] trait used by the reconciler.
//!
//! ## Architecture
//!
//! - `zookeeper_client`: trait, error type and the session-per-call implementation
//! - `types`: server lines, roles and the canonical ensemble configuration
//! - `parsing`: parsing of config payloads and server lines
//!
//! ## Example
//!
//! ```rust,ignore
//! use zookeeper_operator::client::{EnsembleClient, ZkEnsembleClient};
//!
//! let client = ZkEnsembleClient::default();
//! let config = client.read_config(&members.client_endpoints()).await?;
//! if config != members.to_ensemble_config() {
//!     client.reconfigure(&members.client_endpoints(), &members.to_ensemble_config()).await?;
//! }
//! ```

pub mod parsing;
pub mod types;
pub mod zookeeper_client;

pub use parsing::ParseError;
pub use types::{EnsembleConfig, ServerEntry, ServerRole};
pub use zookeeper_client::{
    EnsembleClient, EnsembleClientConfig, EnsembleError, ZkEnsembleClient,
};
