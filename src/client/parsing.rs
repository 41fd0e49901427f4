//! Parsing of the ensemble's configuration payloads.
//!
//! The `/zookeeper/config` node and the reconfig response share one format:
//! newline-separated server lines followed by a `version=<hex>` marker line.
//!
//! All parsing functions are pure and operate on borrowed input.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::client::types::{EnsembleConfig, ServerEntry, ServerRole};

/// Errors that can occur during parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to compile regex: {0}")]
    RegexCompilation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Prefix of the trailing config-version line.
const VERSION_MARKER_PREFIX: &str = "version=";

// server.<id>=<peerHost>:<peerPort>:<leaderPort>[:<role>][;[<clientHost>:]<clientPort>]
static SERVER_LINE_RE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"^server\.(\d+)=([^:;]+):(\d+):(\d+)(?::([a-z]+))?(?:;(?:([^:;]+):)?(\d+))?$",
    )
});

/// Parse a raw configuration payload into a canonical [`EnsembleConfig`].
///
/// The final line must be the config-version marker; it is stripped and the
/// remaining server lines are sorted.
///
/// # Example
/// ```
/// use zookeeper_operator::client::parsing::parse_config_payload;
///
/// let payload = b"server.2=b:2888:3888:participant;b:2181\nserver.1=a:2888:3888:participant;a:2181\nversion=100000003";
/// let config = parse_config_payload(payload).unwrap();
/// assert_eq!(config.len(), 2);
/// assert!(config.lines()[0].starts_with("server.1="));
/// ```
pub fn parse_config_payload(payload: &[u8]) -> Result<EnsembleConfig, ParseError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| ParseError::Parse(format!("config payload is not UTF-8: {}", e)))?;

    let mut lines: Vec<&str> = text
        .trim_end_matches(['\n', '\r'])
        .split('\n')
        .map(|l| l.trim_end_matches('\r'))
        .collect();

    match lines.pop() {
        Some(last) if last.starts_with(VERSION_MARKER_PREFIX) => {}
        _ => {
            return Err(ParseError::MissingField(
                "config version marker".to_string(),
            ));
        }
    }

    Ok(EnsembleConfig::from_lines(
        lines.into_iter().filter(|l| !l.trim().is_empty()),
    ))
}

/// Parse a single server line.
pub fn parse_server_line(line: &str) -> Result<ServerEntry, ParseError> {
    let re = SERVER_LINE_RE
        .as_ref()
        .map_err(|e| ParseError::RegexCompilation(e.to_string()))?;

    let caps = re
        .captures(line.trim())
        .ok_or_else(|| ParseError::Parse(format!("invalid server line: {}", line)))?;

    let field = |i: usize, name: &str| {
        caps.get(i)
            .map(|m| m.as_str())
            .ok_or_else(|| ParseError::MissingField(name.to_string()))
    };

    let id = parse_number(field(1, "id")?, "id")?;
    let peer_host = field(2, "peer host")?.to_string();
    let peer_port = parse_number(field(3, "peer port")?, "peer port")?;
    let leader_port = parse_number(field(4, "leader port")?, "leader port")?;
    let role = match caps.get(5) {
        Some(m) => m.as_str().parse()?,
        None => ServerRole::Participant,
    };
    let client = match caps.get(7) {
        Some(port) => {
            let host = caps.get(6).map_or("0.0.0.0", |m| m.as_str()).to_string();
            Some((host, parse_number(port.as_str(), "client port")?))
        }
        None => None,
    };

    Ok(ServerEntry {
        id,
        peer_host,
        peer_port,
        leader_port,
        role,
        client,
    })
}

fn parse_number<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, ParseError> {
    value
        .parse()
        .map_err(|_| ParseError::Parse(format!("invalid {}: {}", name, value)))
}
