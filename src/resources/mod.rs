//! Resource generation module.
//!
//! Contains utilities for generating and managing Kubernetes resources owned
//! by a ZookeeperCluster.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | Pod | One per ensemble member, named `<cluster>-<id>` |
//! | Peer Service | Headless; stable member DNS (publishNotReadyAddresses) |
//! | Client Service | Client access endpoint on 2181 |

pub mod api;
pub mod common;
pub mod pod;
pub mod services;

// Re-export commonly used items
pub use api::{KubeResourceClient, MemberEvent, ResourceClient};
pub use common::{cluster_selector, labels_for_cluster, owner_reference, pod_version};
pub use pod::build_pod;
pub use services::{build_client_service, build_peer_service};
