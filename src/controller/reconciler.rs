//! One reconcile pass of a cluster.
//!
//! The pass compares the observed pods with the tracked membership and
//! performs at most one mutation:
//!
//! 1. Running pods match membership: repair ensemble config drift, or
//!    promote one observer. Either ends the pass.
//! 2. Pods disagree with membership, or the size is off: one step of the
//!    quorum and scaling engine.
//! 3. A pod runs an old version: replace it with the target version.
//! 4. Otherwise the cluster is converged and marked Ready.

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info};

use crate::controller::cluster::Cluster;
use crate::controller::error::Result;
use crate::controller::upgrade::needs_upgrade;
use crate::membership::MemberSet;

impl Cluster {
    /// Reconcile membership, configuration and version against `pods`.
    ///
    /// `pods` are the running member pods. The observed size in status is
    /// refreshed whether or not the pass succeeds.
    pub(super) async fn reconcile(&mut self, pods: &[Pod]) -> Result<()> {
        info!(name = %self.name, "Start reconciling");
        let result = self.reconcile_members(pods).await;
        self.status.set_size(self.members.size());
        self.status.set_members(self.members.names());
        debug!(name = %self.name, ok = result.is_ok(), "Finish reconciling");
        result
    }

    async fn reconcile_members(&mut self, pods: &[Pod]) -> Result<()> {
        let running = MemberSet::from_pods(pods, &self.namespace);
        let desired = self.desired_size();

        if running.is_equal(&self.members) && self.reconcile_ensemble_config().await? {
            return Ok(());
        }

        if !running.is_equal(&self.members) || self.members.size() != desired {
            return self.reconcile_membership(&running).await;
        }
        self.status.clear_scaling();

        if needs_upgrade(pods, &self.cluster.spec) {
            return self.upgrade_one_member(pods).await;
        }
        self.status.clear_upgrading();

        self.status.set_version(&self.cluster.spec.version);
        self.status.set_ready();
        Ok(())
    }

    /// Push the membership's configuration when the ensemble disagrees, or
    /// promote one observer when it already agrees.
    ///
    /// Returns true if a reconfiguration was pushed.
    pub(super) async fn reconcile_ensemble_config(&mut self) -> Result<bool> {
        let hosts = self.members.client_endpoints();
        let live = self.ctx.ensemble.read_config(&hosts).await?;
        let expected = self.members.to_ensemble_config();

        if live.len() != self.members.size() || live != expected {
            info!(
                name = %self.name,
                live = %live,
                expected = %expected,
                "Ensemble config differs from membership, reconfiguring"
            );
            let applied = self.ctx.ensemble.reconfigure(&hosts, &expected).await?;
            info!(name = %self.name, config = %applied, "Ensemble reconfigured");
            self.record_membership_change("reconfigure");
            return Ok(true);
        }

        let Ok(observer) = self.members.observers().pick_one() else {
            return Ok(false);
        };
        self.members.promote(observer.name());
        info!(name = %self.name, member = %observer, "Promoting observer to participant");
        let promoted = self.members.to_ensemble_config();
        self.ctx.ensemble.reconfigure(&hosts, &promoted).await?;
        self.record_membership_change("promote");
        Ok(true)
    }

    pub(super) fn desired_size(&self) -> usize {
        usize::try_from(self.cluster.spec.size).unwrap_or(0)
    }

    pub(super) fn record_membership_change(&self, kind: &str) {
        if let Some(metrics) = self.ctx.metrics() {
            metrics.record_membership_change(&self.namespace, &self.name, kind);
        }
    }
}
