//! Membership planning - decides the next mutation, no I/O.
//!
//! Given the members observed running, the last-known membership and the
//! desired size, [`plan_membership`] computes the single safe step that moves
//! the ensemble toward the desired state without losing quorum.

use crate::membership::{Member, MemberSet};

/// Minimum number of live members for an ensemble of `known` members to
/// make progress.
pub fn quorum_size(known: usize) -> usize {
    known / 2 + 1
}

/// The one membership mutation to perform in a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipAction {
    /// Membership and running pods agree at the desired size.
    None,
    /// Add one member with the next free ID.
    AddMember,
    /// Remove one member to shrink toward the desired size.
    RemoveMember(Member),
    /// A known member has no running pod; recreate it under the same name.
    ReplaceDead(Member),
    /// Too few known members are running; nothing may be mutated.
    QuorumLost {
        live: usize,
        known: usize,
        required: usize,
    },
}

/// Outcome of planning a pass.
#[derive(Debug, Clone)]
pub struct MembershipPlan {
    /// Running members that are not part of the membership.
    pub unknown: MemberSet,
    /// Mutation to perform once unknown pods are pruned.
    pub action: MembershipAction,
}

impl MembershipPlan {
    /// Check if the plan changes nothing.
    pub fn is_noop(&self) -> bool {
        self.unknown.is_empty() && self.action == MembershipAction::None
    }
}

/// Plan the next membership step.
pub fn plan_membership(running: &MemberSet, members: &MemberSet, desired_size: usize) -> MembershipPlan {
    let unknown = running.diff(members);
    let live = running.diff(&unknown);

    let action = if live.size() == members.size() {
        resize_action(members, desired_size)
    } else if live.size() < quorum_size(members.size()) {
        MembershipAction::QuorumLost {
            live: live.size(),
            known: members.size(),
            required: quorum_size(members.size()),
        }
    } else {
        match members.diff(&live).pick_one() {
            Ok(dead) => MembershipAction::ReplaceDead(dead),
            // live is a subset of members, so a size mismatch means a dead member exists
            Err(_) => resize_action(members, desired_size),
        }
    };

    MembershipPlan { unknown, action }
}

fn resize_action(members: &MemberSet, desired_size: usize) -> MembershipAction {
    use std::cmp::Ordering;

    match members.size().cmp(&desired_size) {
        Ordering::Equal => MembershipAction::None,
        Ordering::Less => MembershipAction::AddMember,
        Ordering::Greater => match members.pick_one() {
            Ok(member) => MembershipAction::RemoveMember(member),
            Err(_) => MembershipAction::None,
        },
    }
}
