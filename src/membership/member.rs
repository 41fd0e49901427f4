//! A single ensemble member and its derived identity.

use std::fmt;

use crate::client::types::{ServerEntry, ServerRole};
use crate::crd::{CLIENT_PORT, LEADER_ELECTION_PORT, PEER_PORT};
use crate::membership::MembershipError;

/// How a member's pod joins the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinState {
    /// Part of the initial ensemble, created at bootstrap.
    Seed,
    /// Added by a scale-up; joins as an observer until promoted.
    New,
    /// Recreated with the name and ID of a member that was removed.
    Replacement,
}

impl JoinState {
    /// Role the member announces for itself when its pod starts.
    pub fn role(&self) -> ServerRole {
        match self {
            JoinState::Seed | JoinState::Replacement => ServerRole::Participant,
            JoinState::New => ServerRole::Observer,
        }
    }
}

impl fmt::Display for JoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinState::Seed => write!(f, "seed"),
            JoinState::New => write!(f, "new"),
            JoinState::Replacement => write!(f, "replacement"),
        }
    }
}

/// One ensemble member, identified by `<clusterName>-<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    name: String,
    namespace: String,
    id: u32,
    role: ServerRole,
}

impl Member {
    /// Create a member from its name, parsing the ID from the name suffix.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Result<Self, MembershipError> {
        let name = name.into();
        let id = parse_member_id(&name)?;
        Ok(Self {
            name,
            namespace: namespace.into(),
            id,
            role: ServerRole::Participant,
        })
    }

    /// Create the member with the given ID in a cluster.
    pub fn for_cluster(cluster_name: &str, namespace: impl Into<String>, id: u32) -> Self {
        Self {
            name: member_name(cluster_name, id),
            namespace: namespace.into(),
            id,
            role: ServerRole::Participant,
        }
    }

    pub fn with_role(mut self, role: ServerRole) -> Self {
        self.role = role;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Server ID, as written to `myid`.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn role(&self) -> ServerRole {
        self.role
    }

    pub(crate) fn set_role(&mut self, role: ServerRole) {
        self.role = role;
    }

    /// Name of the cluster this member belongs to.
    pub fn cluster_name(&self) -> &str {
        self.name
            .rsplit_once('-')
            .map_or(self.name.as_str(), |(cluster, _)| cluster)
    }

    /// Stable DNS name served by the cluster's headless peer service.
    pub fn addr(&self) -> String {
        format!("{}.{}.{}.svc", self.name, self.cluster_name(), self.namespace)
    }

    /// `host:port` used by ensemble clients.
    pub fn client_endpoint(&self) -> String {
        format!("{}:{}", self.addr(), CLIENT_PORT)
    }

    /// Server entry announcing this member with its current role.
    pub fn server_entry(&self) -> ServerEntry {
        self.server_entry_as(self.role)
    }

    /// Server entry announcing this member with an explicit role.
    pub fn server_entry_as(&self, role: ServerRole) -> ServerEntry {
        let addr = self.addr();
        ServerEntry {
            id: self.id,
            peer_host: addr.clone(),
            peer_port: PEER_PORT as u16,
            leader_port: LEADER_ELECTION_PORT as u16,
            role,
            client: Some((addr, CLIENT_PORT as u16)),
        }
    }

    /// Serialized ensemble configuration line.
    pub fn config_line(&self) -> String {
        self.server_entry().to_string()
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Build the member name for an ID.
pub fn member_name(cluster_name: &str, id: u32) -> String {
    format!("{}-{}", cluster_name, id)
}

/// Parse the member ID from the suffix after the last '-'.
pub fn parse_member_id(name: &str) -> Result<u32, MembershipError> {
    let (cluster, suffix) = name
        .rsplit_once('-')
        .ok_or_else(|| MembershipError::InvalidName(name.to_string()))?;
    if cluster.is_empty() {
        return Err(MembershipError::InvalidName(name.to_string()));
    }
    suffix
        .parse()
        .map_err(|_| MembershipError::InvalidName(name.to_string()))
}
