//! Ensemble client wrapper using the zookeeper-client crate.
//!
//! Provides the narrow dynamic-membership surface the reconciler needs:
//! reading the live configuration and pushing a non-incremental reconfig.
//! Every call opens its own session and releases it before returning.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use zookeeper_client as zk;

use crate::client::parsing::{ParseError, parse_config_payload};
use crate::client::types::EnsembleConfig;

/// Path of the ensemble's dynamic configuration node.
pub const CONFIG_NODE: &str = "/zookeeper/config";

/// Errors that can occur during ensemble operations.
#[derive(Error, Debug)]
pub enum EnsembleError {
    /// No host in the list could be reached.
    #[error("Connection error: {0}")]
    Connect(String),

    /// A host answered but the request failed or the response was malformed.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },
}

/// Client for the ensemble's dynamic-membership protocol.
///
/// Failures are non-committal: callers retry on their next reconcile pass.
#[async_trait]
pub trait EnsembleClient: Send + Sync {
    /// Read the live ensemble configuration through any reachable host.
    async fn read_config(&self, hosts: &[String]) -> Result<EnsembleConfig, EnsembleError>;

    /// Replace the ensemble membership with `desired` and return the
    /// resulting configuration.
    async fn reconfigure(
        &self,
        hosts: &[String],
        desired: &EnsembleConfig,
    ) -> Result<EnsembleConfig, EnsembleError>;
}

/// Timeouts for ensemble sessions.
#[derive(Clone, Debug)]
pub struct EnsembleClientConfig {
    /// Per-host connect timeout.
    pub connection_timeout: Duration,
    /// Session timeout requested from the ensemble.
    pub session_timeout: Duration,
    /// Upper bound for a whole operation, connect included.
    pub operation_timeout: Duration,
}

impl Default for EnsembleClientConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(1),
            session_timeout: Duration::from_secs(6),
            operation_timeout: Duration::from_secs(10),
        }
    }
}

impl EnsembleClientConfig {
    /// Set connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// [`EnsembleClient`] backed by a real Zookeeper session.
#[derive(Clone, Debug, Default)]
pub struct ZkEnsembleClient {
    config: EnsembleClientConfig,
}

impl ZkEnsembleClient {
    pub fn new(config: EnsembleClientConfig) -> Self {
        Self { config }
    }

    /// Open a session to any reachable host.
    async fn connect(&self, hosts: &[String]) -> Result<zk::Client, EnsembleError> {
        if hosts.is_empty() {
            return Err(EnsembleError::Connect("no hosts provided".to_string()));
        }
        let cluster = hosts.join(",");

        let connected = tokio::time::timeout(
            self.config.operation_timeout,
            zk::Client::connector()
                .connection_timeout(self.config.connection_timeout)
                .session_timeout(self.config.session_timeout)
                .connect(&cluster),
        )
        .await;

        match connected {
            Ok(Ok(client)) => {
                debug!("Connected to ensemble");
                Ok(client)
            }
            Ok(Err(e)) => {
                warn!(hosts = %cluster, error = %e, "Failed to connect to ensemble");
                Err(EnsembleError::Connect(format!("{}: {}", cluster, e)))
            }
            Err(_) => Err(EnsembleError::Connect(format!(
                "{}: no host reachable within {:?}",
                cluster, self.config.operation_timeout
            ))),
        }
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, EnsembleError>
    where
        F: std::future::Future<Output = Result<T, zk::Error>>,
    {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => {
                result.map_err(|e| EnsembleError::Protocol(format!("{}: {}", operation, e)))
            }
            Err(_) => Err(EnsembleError::Timeout {
                operation: operation.to_string(),
                duration: self.config.operation_timeout,
            }),
        }
    }
}

#[async_trait]
impl EnsembleClient for ZkEnsembleClient {
    #[instrument(skip(self), fields(host_count = hosts.len()))]
    async fn read_config(&self, hosts: &[String]) -> Result<EnsembleConfig, EnsembleError> {
        // The session is closed when `client` drops, on success and failure alike.
        let client = self.connect(hosts).await?;
        let (data, _stat) = self
            .bounded("get config", client.get_data(CONFIG_NODE))
            .await?;
        let config = parse_config_payload(&data)?;
        debug!(servers = config.len(), "Read ensemble config");
        Ok(config)
    }

    #[instrument(skip(self, desired), fields(host_count = hosts.len(), servers = desired.len()))]
    async fn reconfigure(
        &self,
        hosts: &[String],
        desired: &EnsembleConfig,
    ) -> Result<EnsembleConfig, EnsembleError> {
        let client = self.connect(hosts).await?;
        let update = zk::EnsembleUpdate::New {
            ensemble: desired.lines().iter().map(String::as_str),
        };
        let (data, _stat) = self
            .bounded("reconfig", client.update_ensemble(update, None))
            .await?;
        let config = parse_config_payload(&data)?;
        debug!(servers = config.len(), "Ensemble reconfigured");
        Ok(config)
    }
}
