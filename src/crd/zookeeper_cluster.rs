//! ZookeeperCluster Custom Resource Definition.
//!
//! Defines the ZookeeperCluster CRD for deploying and managing Zookeeper
//! ensembles on Kubernetes. Membership changes are applied one member at a
//! time through the ensemble's dynamic reconfiguration protocol.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ZookeeperCluster is a custom resource for deploying Zookeeper ensembles.
///
/// Example:
/// ```yaml
/// apiVersion: zookeeper.database.apache.com/v1alpha1
/// kind: ZookeeperCluster
/// metadata:
///   name: my-ensemble
/// spec:
///   size: 3
///   version: 3.5.3-beta
///   pod:
///     antiAffinity: true
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "zookeeper.database.apache.com",
    version = "v1alpha1",
    kind = "ZookeeperCluster",
    plural = "zookeeperclusters",
    shortname = "zk",
    status = "ZookeeperClusterStatus",
    namespaced,
    // Print columns for kubectl get
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Size", "type":"integer", "jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Members", "type":"integer", "jsonPath":".status.size"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.currentVersion"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperClusterSpec {
    /// Expected number of ensemble members (minimum 1, default 3).
    /// The operator moves the running ensemble toward this size one member
    /// per reconcile pass.
    #[serde(default = "default_size")]
    pub size: i32,

    /// Repository hosting the Zookeeper container images.
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Expected Zookeeper version, in semver format (e.g. "3.5.3-beta").
    /// A leading "v" is trimmed.
    #[serde(default = "default_version")]
    pub version: String,

    /// Pause control of this ensemble by the operator.
    #[serde(default)]
    pub paused: bool,

    /// Policy used when creating member pods.
    /// Changing it does not affect existing pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<PodPolicy>,
}

impl Default for ZookeeperClusterSpec {
    fn default() -> Self {
        Self {
            size: default_size(),
            repository: default_repository(),
            version: default_version(),
            paused: false,
            pod: None,
        }
    }
}

fn default_size() -> i32 {
    3
}

fn default_repository() -> String {
    DEFAULT_REPOSITORY.to_string()
}

fn default_version() -> String {
    DEFAULT_ZOOKEEPER_VERSION.to_string()
}

/// Pod creation policy for ensemble members.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodPolicy {
    /// Labels attached to member pods.
    /// "app" and "zookeeper_*" labels are reserved for the operator.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Node selector for pod placement.
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Schedule members of the same ensemble on different nodes.
    #[serde(default)]
    pub anti_affinity: bool,

    /// Topology key used for anti-affinity (default: kubernetes.io/hostname).
    #[serde(default = "default_topology_key")]
    pub topology_key: String,

    /// Resource requests and limits for the zookeeper container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirementsSpec>,

    /// Tolerations for pod scheduling.
    #[serde(default)]
    pub tolerations: Vec<Toleration>,

    /// Extra environment variables for the zookeeper container.
    /// Do not override the variables used to bootstrap the ensemble.
    #[serde(default)]
    pub zookeeper_env: Vec<EnvVarSpec>,

    /// Annotations attached to member pods.
    /// The "zookeeper.version" annotation is reserved for the operator.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Image for the DNS-check init container (default: busybox:1.28.0-glibc).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busybox_image: Option<String>,
}

fn default_topology_key() -> String {
    "kubernetes.io/hostname".to_string()
}

/// Resource requests and limits for Zookeeper pods.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    /// CPU and memory requests.
    #[serde(default)]
    pub requests: ResourceSpec,

    /// CPU and memory limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceSpec>,
}

/// CPU and memory quantities.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// CPU quantity (default: 100m).
    #[serde(default = "default_cpu")]
    pub cpu: String,

    /// Memory quantity (default: 512Mi).
    #[serde(default = "default_memory")]
    pub memory: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory: default_memory(),
        }
    }
}

fn default_cpu() -> String {
    "100m".to_string()
}

fn default_memory() -> String {
    "512Mi".to_string()
}

/// Toleration for pod scheduling.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    /// Toleration key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Toleration operator (Equal or Exists).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    /// Toleration value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Toleration effect (NoSchedule, PreferNoSchedule, or NoExecute).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,

    /// Toleration seconds (for NoExecute effect).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

/// Environment variable passed to the zookeeper container.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct EnvVarSpec {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Status of a ZookeeperCluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperClusterStatus {
    /// Current phase of the cluster lifecycle.
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Reason for the current phase (set when Failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Number of members the operator currently manages.
    #[serde(default)]
    pub size: i32,

    /// Names of the current ensemble members.
    #[serde(default)]
    pub members: Vec<String>,

    /// Version the ensemble is running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,

    /// Version the ensemble is being upgraded to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,

    /// The generation most recently observed by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// ClusterPhase represents the current lifecycle phase of a ZookeeperCluster.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ClusterPhase {
    /// Seed members are being created, or membership is being recovered.
    #[default]
    Initializing,
    /// The ensemble is managed by reconcile passes.
    Running,
    /// The cluster cannot be managed without intervention.
    Failed,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Initializing => write!(f, "Initializing"),
            ClusterPhase::Running => write!(f, "Running"),
            ClusterPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Condition describes the state of a cluster at a certain point.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
}

impl Condition {
    /// Create a new condition stamped with the current time.
    pub fn new(condition_type: ConditionType, status: bool, reason: &str, message: &str) -> Self {
        Self::at(
            condition_type,
            status,
            reason,
            message,
            jiff::Timestamp::now().to_string(),
        )
    }

    /// Create a new condition with an explicit transition time.
    pub fn at(
        condition_type: ConditionType,
        status: bool,
        reason: &str,
        message: &str,
        last_transition_time: String,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time,
        }
    }
}

/// Types of conditions for ZookeeperCluster.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionType {
    /// Membership, configuration and version have converged.
    Ready,
    /// Members are being added or removed.
    Scaling,
    /// Members are being replaced with a new version.
    Upgrading,
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionType::Ready => write!(f, "Ready"),
            ConditionType::Scaling => write!(f, "Scaling"),
            ConditionType::Upgrading => write!(f, "Upgrading"),
        }
    }
}

/// Default container repository.
pub const DEFAULT_REPOSITORY: &str = "blafrisch/zookeeper";

/// Default Zookeeper version.
pub const DEFAULT_ZOOKEEPER_VERSION: &str = "3.5.3-beta";

/// Client port on member pods and the client service.
pub const CLIENT_PORT: i32 = 2181;

/// Quorum (peer) port.
pub const PEER_PORT: i32 = 2888;

/// Leader election port.
pub const LEADER_ELECTION_PORT: i32 = 3888;

/// Pod annotation recording the Zookeeper version a member runs.
pub const VERSION_ANNOTATION: &str = "zookeeper.version";
