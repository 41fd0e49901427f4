//! Service generation for Zookeeper clusters.
//!
//! Creates two services:
//! - **Client Service** (`<name>-client`): client connections on 2181
//! - **Peer Service** (`<name>`): headless, gives each member a stable DNS name

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::{CLIENT_PORT, LEADER_ELECTION_PORT, PEER_PORT, ZookeeperCluster};
use crate::resources::common::{
    client_service_name, labels_for_cluster, owner_reference, peer_service_name,
};

/// Lets DNS resolve members before they pass readiness.
pub const TOLERATE_UNREADY_ENDPOINTS_ANNOTATION: &str =
    "service.alpha.kubernetes.io/tolerate-unready-endpoints";

/// Generate the client Service.
pub fn build_client_service(cluster: &ZookeeperCluster) -> Service {
    let name = cluster.name_any();
    build_service(
        cluster,
        client_service_name(&name),
        None,
        vec![service_port("client", CLIENT_PORT)],
    )
}

/// Generate the headless peer Service.
///
/// Members get DNS records `<member>.<cluster>.<namespace>.svc` through it.
pub fn build_peer_service(cluster: &ZookeeperCluster) -> Service {
    let name = cluster.name_any();
    build_service(
        cluster,
        peer_service_name(&name),
        Some("None".to_string()),
        vec![
            service_port("client", CLIENT_PORT),
            service_port("peer", PEER_PORT),
            service_port("leader", LEADER_ELECTION_PORT),
        ],
    )
}

fn build_service(
    cluster: &ZookeeperCluster,
    name: String,
    cluster_ip: Option<String>,
    ports: Vec<ServicePort>,
) -> Service {
    let labels = labels_for_cluster(&cluster.name_any());

    Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: cluster.namespace(),
            labels: Some(labels.clone()),
            annotations: Some(BTreeMap::from([(
                TOLERATE_UNREADY_ENDPOINTS_ANNOTATION.to_string(),
                "true".to_string(),
            )])),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip,
            publish_not_ready_addresses: Some(true),
            selector: Some(labels),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}
