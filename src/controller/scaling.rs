//! Membership mutations: add, remove and replace one member.
//!
//! Which step to take is decided by [`plan_membership`]; this module applies
//! it. Adding a member creates its pod with the current ensemble in
//! `ZOO_SERVERS` and waits for it to run. Removed pods are deleted
//! gracefully; a scale-down pushes the shrunk configuration first.

use tracing::{debug, info, warn};

use crate::client::ServerRole;
use crate::controller::cluster::Cluster;
use crate::controller::error::{Error, Result};
use crate::membership::{JoinState, Member, MemberSet, MembershipAction, plan_membership};
use crate::resources::{MemberEvent, build_pod};

impl Cluster {
    /// Take one step toward the desired membership.
    pub(super) async fn reconcile_membership(&mut self, running: &MemberSet) -> Result<()> {
        info!(name = %self.name, running = %running, members = %self.members, "Reconciling membership");
        let plan = plan_membership(running, &self.members, self.desired_size());
        if plan.is_noop() {
            debug!(name = %self.name, "Membership already converged");
            return Ok(());
        }

        if !plan.unknown.is_empty() {
            info!(name = %self.name, unknown = %plan.unknown, "Removing unexpected pods");
            for member in plan.unknown.iter() {
                self.ctx
                    .resources
                    .delete_pod(member.namespace(), member.name(), true)
                    .await?;
                self.record_membership_change("prune");
            }
        }

        match plan.action {
            MembershipAction::None => Ok(()),
            MembershipAction::AddMember => self.add_one_member().await,
            MembershipAction::RemoveMember(member) => self.remove_one_member(member).await,
            MembershipAction::ReplaceDead(member) => self.replace_dead_member(member).await,
            MembershipAction::QuorumLost {
                live,
                known,
                required,
            } => Err(Error::LostQuorum {
                live,
                known,
                required,
            }),
        }
    }

    /// Add a member with the next free ID. It joins as an observer.
    async fn add_one_member(&mut self) -> Result<()> {
        let member = self
            .members
            .next_member(&self.name, &self.namespace)?
            .with_role(ServerRole::Observer);
        self.status
            .set_scaling_up(self.members.size(), self.desired_size());
        self.add_member(member, JoinState::New).await?;
        self.record_membership_change("add");
        Ok(())
    }

    /// Add `member` to the membership and start its pod.
    ///
    /// The pod is told about the ensemble as it was before the member joined.
    pub(super) async fn add_member(&mut self, member: Member, join_state: JoinState) -> Result<()> {
        let existing = self.members.to_ensemble_config();
        self.members.add(member.clone());

        let pod = build_pod(&member, &existing, join_state, &self.cluster);
        self.ctx
            .resources
            .create_pod_and_wait(pod, self.ctx.config.pod_create_timeout)
            .await
            .map_err(|e| Error::pod_create(member.name(), e))?;
        info!(name = %self.name, member = %member, state = %join_state, "Added member");

        self.ctx
            .resources
            .publish_event(&self.cluster, MemberEvent::member_added(member.name()))
            .await;
        Ok(())
    }

    async fn remove_one_member(&mut self, member: Member) -> Result<()> {
        self.status
            .set_scaling_down(self.members.size(), self.desired_size());
        self.remove_member(&member, true).await?;
        self.record_membership_change("remove");
        Ok(())
    }

    /// Drop `member` from the membership and delete its pod gracefully.
    ///
    /// With `reconfigure`, the remaining members are pushed to the ensemble
    /// before the pod goes away.
    pub(super) async fn remove_member(&mut self, member: &Member, reconfigure: bool) -> Result<()> {
        self.members.remove(member.name());

        if reconfigure {
            let hosts = self.members.client_endpoints();
            let remaining = self.members.to_ensemble_config();
            if let Err(e) = self.ctx.ensemble.reconfigure(&hosts, &remaining).await {
                warn!(name = %self.name, member = %member, error = %e, "Failed to reconfigure ensemble without member");
            }
        }

        self.ctx
            .resources
            .publish_event(&self.cluster, MemberEvent::member_removed(member.name()))
            .await;

        self.ctx
            .resources
            .delete_pod(member.namespace(), member.name(), false)
            .await?;
        info!(name = %self.name, member = %member, reconfigure, "Removed member");
        Ok(())
    }

    /// Recreate a dead member under the same name and ID.
    ///
    /// The dead pod keeps its drain time; the replacement's create waits for
    /// the old pod to terminate.
    async fn replace_dead_member(&mut self, member: Member) -> Result<()> {
        info!(name = %self.name, member = %member, "Replacing dead member");
        self.ctx
            .resources
            .publish_event(&self.cluster, MemberEvent::replacing_dead_member(member.name()))
            .await;

        self.remove_member(&member, false).await?;
        self.add_member(member.with_role(ServerRole::Participant), JoinState::Replacement)
            .await?;
        self.record_membership_change("replace");
        Ok(())
    }
}
