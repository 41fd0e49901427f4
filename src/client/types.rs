//! Types for the ensemble's dynamic configuration.
//!
//! A server line has the form
//! `server.<id>=<peerHost>:<peerPort>:<leaderPort>:<role>;<clientHost>:<clientPort>`.
//! An [`EnsembleConfig`] is the canonical, sorted list of such lines.

use std::fmt;
use std::str::FromStr;

use crate::client::parsing::{ParseError, parse_server_line};

/// Voting role of a server in the ensemble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServerRole {
    /// Voting member, counts toward quorum.
    #[default]
    Participant,
    /// Non-voting member, follows the leader without counting toward quorum.
    Observer,
}

impl FromStr for ServerRole {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "participant" => Ok(ServerRole::Participant),
            "observer" => Ok(ServerRole::Observer),
            other => Err(ParseError::Parse(format!("unknown server role: {}", other))),
        }
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerRole::Participant => write!(f, "participant"),
            ServerRole::Observer => write!(f, "observer"),
        }
    }
}

/// One parsed server line of the ensemble configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    /// Server ID (`myid`).
    pub id: u32,
    /// Host used for quorum and leader election traffic.
    pub peer_host: String,
    /// Quorum port.
    pub peer_port: u16,
    /// Leader election port.
    pub leader_port: u16,
    /// Voting role.
    pub role: ServerRole,
    /// Client address, when the line carries one.
    pub client: Option<(String, u16)>,
}

impl fmt::Display for ServerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "server.{}={}:{}:{}:{}",
            self.id, self.peer_host, self.peer_port, self.leader_port, self.role
        )?;
        if let Some((host, port)) = &self.client {
            write!(f, ";{}:{}", host, port)?;
        }
        Ok(())
    }
}

impl FromStr for ServerEntry {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_server_line(s)
    }
}

/// Canonical ensemble configuration: server lines sorted as strings.
///
/// Two configurations are equal iff they contain the same lines, regardless
/// of the order they were produced in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsembleConfig {
    lines: Vec<String>,
}

impl EnsembleConfig {
    /// Build a configuration from unordered server lines.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        lines.sort();
        Self { lines }
    }

    /// Sorted server lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of servers.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Parse every line into a [`ServerEntry`].
    pub fn entries(&self) -> Result<Vec<ServerEntry>, ParseError> {
        self.lines.iter().map(|l| l.parse()).collect()
    }
}

impl fmt::Display for EnsembleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.lines.join(", "))
    }
}
