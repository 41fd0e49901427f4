//! Custom Resource Definitions (CRDs) for zookeeper-operator.
//!
//! - `ZookeeperCluster`: Deploy and manage a Zookeeper ensemble

mod zookeeper_cluster;

pub use zookeeper_cluster::*;
