//! Common resource generation utilities.
//!
//! Provides labels, selectors, names and owner references shared by every
//! object created for a ZookeeperCluster.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::{VERSION_ANNOTATION, ZookeeperCluster};

/// Value of the `app` label on all managed objects.
pub const APP_NAME: &str = "zookeeper";

/// Label carrying the owning cluster's name.
pub const CLUSTER_LABEL: &str = "zookeeper_cluster";

/// Label carrying the member name on pods.
pub const MEMBER_LABEL: &str = "zookeeper_node";

/// Labels identifying the objects of a cluster.
pub fn labels_for_cluster(cluster_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), APP_NAME.to_string());
    labels.insert(CLUSTER_LABEL.to_string(), cluster_name.to_string());
    labels
}

/// Label selector listing the pods and services of a cluster.
pub fn cluster_selector(cluster_name: &str) -> String {
    format!("app={},{}={}", APP_NAME, CLUSTER_LABEL, cluster_name)
}

/// Name of the load-balanced client service.
pub fn client_service_name(cluster_name: &str) -> String {
    format!("{}-client", cluster_name)
}

/// Name of the headless peer service. Member DNS names live under it.
pub fn peer_service_name(cluster_name: &str) -> String {
    cluster_name.to_string()
}

/// Create owner reference for a ZookeeperCluster
pub fn owner_reference(cluster: &ZookeeperCluster) -> OwnerReference {
    OwnerReference {
        api_version: "zookeeper.database.apache.com/v1alpha1".to_string(),
        kind: "ZookeeperCluster".to_string(),
        name: cluster.name_any(),
        uid: cluster.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Zookeeper version recorded on a member pod.
pub fn pod_version(pod: &Pod) -> Option<&str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(VERSION_ANNOTATION))
        .map(String::as_str)
}

/// Check if the pod is being deleted.
pub fn is_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// Current pod phase, if reported.
pub fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}
