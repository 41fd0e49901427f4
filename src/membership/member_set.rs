//! Set algebra over ensemble members.
//!
//! A [`MemberSet`] is the operator's belief about ensemble membership. It is
//! keyed by member name; equality between sets only ever looks at names.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use tracing::warn;

use crate::client::types::{EnsembleConfig, ServerRole};
use crate::membership::MembershipError;
use crate::membership::member::Member;

/// Mapping from member name to [`Member`], iterated in name order.
#[derive(Debug, Clone, Default)]
pub struct MemberSet {
    members: BTreeMap<String, Member>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the set of members for observed pods.
    ///
    /// Pods whose names do not carry a member ID are skipped.
    pub fn from_pods<'a>(pods: impl IntoIterator<Item = &'a Pod>, namespace: &str) -> Self {
        let mut set = Self::new();
        for pod in pods {
            let Some(name) = pod.metadata.name.as_deref() else {
                continue;
            };
            let ns = pod.metadata.namespace.as_deref().unwrap_or(namespace);
            match Member::new(name, ns) {
                Ok(member) => set.add(member),
                Err(e) => warn!(pod = %name, error = %e, "Ignoring pod without member ID"),
            }
        }
        set
    }

    /// Rebuild membership from a live ensemble configuration.
    ///
    /// The member name is the first DNS label of each server's peer host.
    pub fn from_ensemble_config(
        config: &EnsembleConfig,
        namespace: &str,
    ) -> Result<Self, MembershipError> {
        let mut set = Self::new();
        for entry in config.entries()? {
            let name = entry
                .peer_host
                .split('.')
                .next()
                .unwrap_or(entry.peer_host.as_str());
            let member = Member::new(name, namespace)?.with_role(entry.role);
            if member.id() != entry.id {
                return Err(MembershipError::InvalidName(format!(
                    "{} does not match server.{}",
                    name, entry.id
                )));
            }
            set.add(member);
        }
        Ok(set)
    }

    /// Insert or replace a member.
    pub fn add(&mut self, member: Member) {
        self.members.insert(member.name().to_string(), member);
    }

    /// Remove a member by name.
    pub fn remove(&mut self, name: &str) -> Option<Member> {
        self.members.remove(name)
    }

    /// Members present in `self` but absent (by name) in `other`.
    pub fn diff(&self, other: &MemberSet) -> MemberSet {
        MemberSet {
            members: self
                .members
                .iter()
                .filter(|(name, _)| !other.contains(name))
                .map(|(name, m)| (name.clone(), m.clone()))
                .collect(),
        }
    }

    /// Same cardinality and same set of names.
    pub fn is_equal(&self, other: &MemberSet) -> bool {
        self.size() == other.size() && self.members.keys().all(|name| other.contains(name))
    }

    /// The member with the lowest ID.
    ///
    /// Used wherever any one member of a candidate set may be chosen.
    pub fn pick_one(&self) -> Result<Member, MembershipError> {
        self.members
            .values()
            .min_by(|a, b| a.id().cmp(&b.id()).then_with(|| a.name().cmp(b.name())))
            .cloned()
            .ok_or(MembershipError::EmptySet)
    }

    /// Highest member ID, 0 if empty.
    pub fn max_id(&self) -> u32 {
        self.members.values().map(Member::id).max().unwrap_or(0)
    }

    /// Next member to allocate, with ID `max_id() + 1`.
    pub fn next_member(&self, cluster_name: &str, namespace: &str) -> Result<Member, MembershipError> {
        let max = self.max_id();
        let id = max
            .checked_add(1)
            .ok_or(MembershipError::IdsExhausted(max))?;
        Ok(Member::for_cluster(cluster_name, namespace, id))
    }

    /// Sorted `host:port` client endpoints.
    pub fn client_endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self.members.values().map(Member::client_endpoint).collect();
        endpoints.sort();
        endpoints
    }

    /// Canonical ensemble configuration for this membership.
    pub fn to_ensemble_config(&self) -> EnsembleConfig {
        EnsembleConfig::from_lines(self.members.values().map(Member::config_line))
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Sorted member names.
    pub fn names(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    /// Turn an observer into a participant. Returns false if `name` is not
    /// an observer of this set.
    pub fn promote(&mut self, name: &str) -> bool {
        match self.members.get_mut(name) {
            Some(member) if member.role() == ServerRole::Observer => {
                member.set_role(ServerRole::Participant);
                true
            }
            _ => false,
        }
    }

    /// Members currently announced as observers.
    pub fn observers(&self) -> MemberSet {
        MemberSet {
            members: self
                .members
                .iter()
                .filter(|(_, m)| m.role() == ServerRole::Observer)
                .map(|(name, m)| (name.clone(), m.clone()))
                .collect(),
        }
    }
}

impl FromIterator<Member> for MemberSet {
    fn from_iter<I: IntoIterator<Item = Member>>(iter: I) -> Self {
        let mut set = Self::new();
        for member in iter {
            set.add(member);
        }
        set
    }
}

impl fmt::Display for MemberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.members.keys().map(String::as_str).collect();
        write!(f, "{}", names.join(","))
    }
}
