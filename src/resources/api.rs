//! Kubernetes API access for cluster objects.
//!
//! [`ResourceClient`] is the narrow surface the cluster worker uses to list,
//! create and delete member pods, create services, write status and publish
//! events. [`KubeResourceClient`] implements it with a kube `Client`.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, warn};

use crate::controller::error::{Error, Result};
use crate::crd::{ZookeeperCluster, ZookeeperClusterStatus};
use crate::resources::common::{cluster_selector, is_terminating, pod_phase};

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "zookeeper-operator";

/// Interval between pod phase checks while waiting for a pod to run.
pub const POD_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A Kubernetes event about a cluster's membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEvent {
    pub warning: bool,
    pub reason: &'static str,
    pub action: &'static str,
    pub note: String,
}

impl MemberEvent {
    pub fn member_added(member: &str) -> Self {
        Self {
            warning: false,
            reason: "MemberAdded",
            action: "AddMember",
            note: format!("New member {} added to cluster", member),
        }
    }

    pub fn member_removed(member: &str) -> Self {
        Self {
            warning: false,
            reason: "MemberRemoved",
            action: "RemoveMember",
            note: format!("Existing member {} removed from the cluster", member),
        }
    }

    pub fn replacing_dead_member(member: &str) -> Self {
        Self {
            warning: true,
            reason: "ReplacingDeadMember",
            action: "ReplaceMember",
            note: format!("The dead member {} is being replaced", member),
        }
    }
}

/// Kubernetes operations performed on behalf of a cluster.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// List the pods of a cluster.
    async fn list_pods(&self, namespace: &str, cluster_name: &str) -> Result<Vec<Pod>>;

    /// Create a pod and wait until it is running.
    ///
    /// Fails with [`Error::PodWaitTimeout`] if the pod is still pending when
    /// `timeout` expires, and with a permanent error if it reaches any phase
    /// other than Pending or Running.
    async fn create_pod_and_wait(&self, pod: Pod, timeout: Duration) -> Result<Pod>;

    /// Delete a pod. A forced delete uses a zero grace period.
    async fn delete_pod(&self, namespace: &str, name: &str, force: bool) -> Result<()>;

    /// Create a service, tolerating one that already exists.
    async fn create_service(&self, service: Service) -> Result<()>;

    /// Replace the status of a cluster.
    async fn patch_status(&self, cluster: &ZookeeperCluster, status: &ZookeeperClusterStatus) -> Result<()>;

    /// Publish an event for a cluster. Failures are logged, never returned.
    async fn publish_event(&self, cluster: &ZookeeperCluster, event: MemberEvent);
}

/// [`ResourceClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
    reporter: Reporter,
}

impl KubeResourceClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }

    /// Create an event recorder for publishing Kubernetes events
    fn recorder(&self) -> Recorder {
        Recorder::new(self.client.clone(), self.reporter.clone())
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn wait_running(&self, api: &Api<Pod>, name: &str, timeout: Duration) -> Result<Pod> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let pod = api.get(name).await?;
            match pod_phase(&pod) {
                Some("Running") => return Ok(pod),
                Some("Pending") | None => {}
                Some(phase) => {
                    return Err(Error::Permanent(format!(
                        "unexpected pod phase: {}",
                        phase
                    )));
                }
            }

            if tokio::time::Instant::now() + POD_POLL_INTERVAL > deadline {
                return Err(Error::PodWaitTimeout {
                    member: name.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(POD_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn list_pods(&self, namespace: &str, cluster_name: &str) -> Result<Vec<Pod>> {
        let selector = cluster_selector(cluster_name);
        let pods = self
            .pods(namespace)
            .list(&ListParams::default().labels(&selector))
            .await?;
        Ok(pods.items)
    }

    async fn create_pod_and_wait(&self, pod: Pod, timeout: Duration) -> Result<Pod> {
        let name = pod.name_any();
        let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
        let api = self.pods(&namespace);

        let deadline = tokio::time::Instant::now() + timeout;

        // A member recreated under the same name may collide with its
        // predecessor while that pod is still terminating.
        loop {
            match api.create(&PostParams::default(), &pod).await {
                Ok(_) => break,
                Err(kube::Error::Api(e)) if e.code == 409 => {
                    let terminating = api
                        .get_opt(&name)
                        .await?
                        .is_none_or(|existing| is_terminating(&existing));
                    if !terminating {
                        return Err(kube::Error::Api(e).into());
                    }
                    if tokio::time::Instant::now() + POD_POLL_INTERVAL > deadline {
                        return Err(Error::PodWaitTimeout {
                            member: name,
                            timeout,
                        });
                    }
                    debug!(pod = %name, "Previous pod still terminating, retrying create");
                    tokio::time::sleep(POD_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(pod = %name, "Created pod, waiting for it to run");
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        self.wait_running(&api, &name, remaining)
            .await
            .map_err(|e| match e {
                Error::PodWaitTimeout { member, .. } => Error::PodWaitTimeout { member, timeout },
                other => other,
            })
    }

    async fn delete_pod(&self, namespace: &str, name: &str, force: bool) -> Result<()> {
        let params = if force {
            DeleteParams {
                grace_period_seconds: Some(0),
                ..Default::default()
            }
        } else {
            DeleteParams::default()
        };

        match self.pods(namespace).delete(name, &params).await.map_err(Error::from) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(pod = %name, "Pod already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn create_service(&self, service: Service) -> Result<()> {
        let namespace = service.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        match api.create(&PostParams::default(), &service).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(service = %service.name_any(), "Service already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_status(&self, cluster: &ZookeeperCluster, status: &ZookeeperClusterStatus) -> Result<()> {
        let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<ZookeeperCluster> = Api::namespaced(self.client.clone(), &namespace);
        let patch = serde_json::json!({
            "status": serde_json::to_value(status)?
        });
        api.patch_status(
            &cluster.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn publish_event(&self, cluster: &ZookeeperCluster, event: MemberEvent) {
        let recorder = self.recorder();
        let object_ref = cluster.object_ref(&());
        let type_ = if event.warning {
            EventType::Warning
        } else {
            EventType::Normal
        };
        if let Err(e) = recorder
            .publish(
                &Event {
                    type_,
                    reason: event.reason.into(),
                    note: Some(event.note),
                    action: event.action.into(),
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            warn!(reason = %event.reason, error = %e, "Failed to publish event");
        }
    }
}
