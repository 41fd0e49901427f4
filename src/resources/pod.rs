//! Pod generation for Zookeeper ensemble members.
//!
//! Each member runs in its own pod named after the member. The pod carries
//! everything the container needs to join the ensemble:
//! - `ZOO_MY_ID` with the member ID
//! - `ZOO_SERVERS` with the existing ensemble plus the member's own line
//! - A DNS-check init container that waits for the member's peer address
//! - The running version in the `zookeeper.version` annotation

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, ExecAction, Pod,
    PodAffinityTerm, PodAntiAffinity, PodSecurityContext, PodSpec, Probe, ResourceRequirements,
    Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use crate::client::types::EnsembleConfig;
use crate::crd::{
    CLIENT_PORT, LEADER_ELECTION_PORT, PEER_PORT, PodPolicy, ResourceSpec, VERSION_ANNOTATION,
    ZookeeperCluster,
};
use crate::membership::{JoinState, Member};
use crate::resources::common::{CLUSTER_LABEL, MEMBER_LABEL, labels_for_cluster, owner_reference};

/// Jolokia agent port exposed by the image.
const JOLOKIA_PORT: i32 = 8778;
/// Default image for the DNS-check init container.
/// busybox:latest ships uclibc, whose resolver intermittently fails lookups.
pub const DEFAULT_BUSYBOX_IMAGE: &str = "busybox:1.28.0-glibc";
/// User the zookeeper image runs as.
const ZOOKEEPER_USER_ID: i64 = 1000;

const DATA_VOLUME: &str = "zookeeper-data";
const DATA_MOUNT_PATH: &str = "/data";
const TLOG_VOLUME: &str = "zookeeper-tlog";
const TLOG_MOUNT_PATH: &str = "/datalog";

/// Container image for a repository and version.
pub fn image_name(repository: &str, version: &str) -> String {
    format!("{}:v{}", repository, version)
}

/// Generate the pod for a member.
///
/// `existing` is the ensemble the member joins; the member's own line is
/// appended with the role implied by `join_state`.
pub fn build_pod(
    member: &Member,
    existing: &EnsembleConfig,
    join_state: JoinState,
    cluster: &ZookeeperCluster,
) -> Pod {
    let cluster_name = cluster.name_any();
    let spec = &cluster.spec;
    let policy = spec.pod.as_ref();

    let mut labels = labels_for_cluster(&cluster_name);
    labels.insert(MEMBER_LABEL.to_string(), member.name().to_string());
    if let Some(policy) = policy {
        // Operator labels win over policy labels.
        for (key, value) in &policy.labels {
            labels.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    let mut annotations = BTreeMap::new();
    if let Some(policy) = policy {
        annotations.extend(policy.annotations.clone());
    }
    annotations.insert(VERSION_ANNOTATION.to_string(), spec.version.clone());

    let mut servers: Vec<String> = existing.lines().to_vec();
    servers.push(member.server_entry_as(join_state.role()).to_string());

    Pod {
        metadata: ObjectMeta {
            name: Some(member.name().to_string()),
            namespace: Some(member.namespace().to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            init_containers: Some(vec![dns_check_container(member, policy)]),
            containers: vec![zookeeper_container(member, &servers, cluster)],
            restart_policy: Some("Never".to_string()),
            volumes: Some(vec![empty_dir_volume(DATA_VOLUME), empty_dir_volume(TLOG_VOLUME)]),
            // DNS A record: <member>.<cluster>.<namespace>.svc
            hostname: Some(member.name().to_string()),
            subdomain: Some(cluster_name.clone()),
            automount_service_account_token: Some(false),
            security_context: Some(PodSecurityContext {
                run_as_user: Some(ZOOKEEPER_USER_ID),
                run_as_non_root: Some(true),
                fs_group: Some(ZOOKEEPER_USER_ID),
                ..Default::default()
            }),
            affinity: policy.and_then(|p| anti_affinity(&cluster_name, p)),
            node_selector: policy
                .filter(|p| !p.node_selector.is_empty())
                .map(|p| p.node_selector.clone()),
            tolerations: policy.and_then(|p| convert_tolerations(&p.tolerations)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn zookeeper_container(member: &Member, servers: &[String], cluster: &ZookeeperCluster) -> Container {
    let spec = &cluster.spec;

    let mut env = vec![
        env_var("ZOO_MY_ID", member.id().to_string()),
        env_var("ZOO_SERVERS", servers.join(" ")),
        // Default of 60 is too low for clients behind one NAT address
        env_var("ZOO_MAX_CLIENT_CNXNS", "0".to_string()),
    ];
    if let Some(policy) = &spec.pod {
        env.extend(
            policy
                .zookeeper_env
                .iter()
                .map(|e| env_var(&e.name, e.value.clone())),
        );
    }

    let mut readiness = zookeeper_probe();
    readiness.initial_delay_seconds = Some(1);
    readiness.timeout_seconds = Some(5);
    readiness.period_seconds = Some(5);

    Container {
        name: "zookeeper".to_string(),
        image: Some(image_name(&spec.repository, &spec.version)),
        ports: Some(vec![
            container_port("client", CLIENT_PORT),
            container_port("peer", PEER_PORT),
            container_port("server", LEADER_ELECTION_PORT),
            container_port("jolokia", JOLOKIA_PORT),
        ]),
        env: Some(env),
        resources: Some(resource_requirements(spec.pod.as_ref())),
        volume_mounts: Some(vec![
            VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: DATA_MOUNT_PATH.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: TLOG_VOLUME.to_string(),
                mount_path: TLOG_MOUNT_PATH.to_string(),
                ..Default::default()
            },
        ]),
        liveness_probe: Some(zookeeper_probe()),
        readiness_probe: Some(readiness),
        ..Default::default()
    }
}

/// Init container that blocks until the member's DNS record resolves.
fn dns_check_container(member: &Member, policy: Option<&PodPolicy>) -> Container {
    let image = policy
        .and_then(|p| p.busybox_image.clone())
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| DEFAULT_BUSYBOX_IMAGE.to_string());

    Container {
        name: "check-dns".to_string(),
        image: Some(image),
        command: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            format!(
                "while ( ! nslookup {} )\ndo\n  sleep 2\ndone",
                member.addr()
            ),
        ]),
        ..Default::default()
    }
}

fn zookeeper_probe() -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                format!("zkOk.sh {}", CLIENT_PORT),
            ]),
        }),
        initial_delay_seconds: Some(10),
        timeout_seconds: Some(10),
        period_seconds: Some(60),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

/// Required anti-affinity spreading members of the cluster across topology domains.
fn anti_affinity(cluster_name: &str, policy: &PodPolicy) -> Option<Affinity> {
    if !policy.anti_affinity {
        return None;
    }

    Some(Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                label_selector: Some(LabelSelector {
                    match_labels: Some(BTreeMap::from([(
                        CLUSTER_LABEL.to_string(),
                        cluster_name.to_string(),
                    )])),
                    ..Default::default()
                }),
                topology_key: policy.topology_key.clone(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn resource_requirements(policy: Option<&PodPolicy>) -> ResourceRequirements {
    let resources = policy.and_then(|p| p.resources.clone()).unwrap_or_default();
    ResourceRequirements {
        requests: Some(resource_list(&resources.requests)),
        limits: resources.limits.as_ref().map(resource_list),
        ..Default::default()
    }
}

fn resource_list(spec: &ResourceSpec) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(spec.cpu.clone())),
        ("memory".to_string(), Quantity(spec.memory.clone())),
    ])
}

/// Convert CRD tolerations to k8s-openapi Tolerations.
fn convert_tolerations(tolerations: &[crate::crd::Toleration]) -> Option<Vec<Toleration>> {
    if tolerations.is_empty() {
        return None;
    }

    Some(
        tolerations
            .iter()
            .map(|t| Toleration {
                key: t.key.clone(),
                operator: t.operator.clone(),
                value: t.value.clone(),
                effect: t.effect.clone(),
                toleration_seconds: t.toleration_seconds,
            })
            .collect(),
    )
}

fn env_var(name: &str, value: String) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn empty_dir_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}
