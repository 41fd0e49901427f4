//! Controller module for zookeeper-operator.
//!
//! Contains the per-cluster workers, the reconcile pass, error handling,
//! status management and validation logic.
//!
//! - `event_loop`: routes watch events to one worker per cluster
//! - `cluster`: the worker, its lifecycle and setup (bootstrap or recovery)
//! - `reconciler`: one reconcile pass
//! - `scaling` / `upgrade`: the membership mutations a pass may perform

// Shared modules
pub mod context;
pub mod error;
pub mod status;
pub mod validation;

// Cluster workers
pub mod cluster;
pub mod event_loop;
mod reconciler;
mod scaling;
pub mod upgrade;

pub use cluster::{Cluster, ClusterEvent, WorkerState};
pub use event_loop::Dispatcher;
