//! Rolling version upgrade, one member per pass.
//!
//! A member is upgraded by removing it from the ensemble and recreating it
//! under the same name and ID with the target image. Only a cluster whose
//! pod count matches the desired size is upgraded.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{info, warn};

use crate::client::ServerRole;
use crate::controller::cluster::Cluster;
use crate::controller::error::{Error, Result};
use crate::crd::ZookeeperClusterSpec;
use crate::membership::{JoinState, Member};
use crate::resources::pod_version;

/// Check if any pod of a fully sized cluster runs another version.
pub fn needs_upgrade(pods: &[Pod], spec: &ZookeeperClusterSpec) -> bool {
    let size = usize::try_from(spec.size).unwrap_or(0);
    pods.len() == size && pods.iter().any(|p| pod_version(p) != Some(spec.version.as_str()))
}

/// First pod in listing order not running `version`.
pub fn pick_upgrade_candidate(pods: &[Pod], version: &str) -> Option<Member> {
    pods.iter()
        .filter(|p| pod_version(p) != Some(version))
        .find_map(|p| {
            let namespace = p.namespace().unwrap_or_else(|| "default".to_string());
            match Member::new(p.name_any(), namespace) {
                Ok(member) => Some(member),
                Err(e) => {
                    warn!(pod = %p.name_any(), error = %e, "Skipping upgrade of pod without member ID");
                    None
                }
            }
        })
}

impl Cluster {
    /// Replace one old-version member with one running the desired version.
    pub(super) async fn upgrade_one_member(&mut self, pods: &[Pod]) -> Result<()> {
        let target = self.cluster.spec.version.clone();
        let candidate = pick_upgrade_candidate(pods, &target)
            .ok_or_else(|| Error::Transient("no member left to upgrade".to_string()))?;

        if self.status.current_version().is_none()
            && let Some(version) = pods
                .iter()
                .find(|p| p.name_any() == candidate.name())
                .and_then(pod_version)
        {
            self.status.set_version(version);
        }
        self.status.upgrade_version_to(&target);

        let member = self
            .members
            .get(candidate.name())
            .cloned()
            .unwrap_or(candidate);
        info!(name = %self.name, member = %member, version = %target, "Upgrading member");

        self.remove_member(&member, true).await?;
        self.add_member(member.with_role(ServerRole::Participant), JoinState::Replacement)
            .await?;
        self.record_membership_change("upgrade");
        Ok(())
    }
}
