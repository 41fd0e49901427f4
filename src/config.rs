//! Operator configuration.
//!
//! Settings are read from environment variables once at startup. Missing or
//! malformed values fall back to defaults with a warning.

use std::time::Duration;

use tracing::warn;

use crate::client::EnsembleClientConfig;

/// Default interval between reconcile passes of a cluster.
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 8;
/// Default time a new member pod may take to reach Running.
pub const DEFAULT_POD_CREATE_TIMEOUT_SECS: u64 = 300;
/// Default per-host ensemble connect timeout.
pub const DEFAULT_ENSEMBLE_CONNECT_TIMEOUT_MS: u64 = 1000;
/// Default bound for a whole ensemble operation.
pub const DEFAULT_ENSEMBLE_OPERATION_TIMEOUT_SECS: u64 = 10;
/// Default port of the health and metrics server.
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Runtime configuration for the operator.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Identity used for leader election and event reporting.
    pub pod_name: String,
    /// Namespace holding the leader election lease.
    pub pod_namespace: String,
    /// Only watch clusters in this namespace; all namespaces when unset.
    pub watch_namespace: Option<String>,
    pub resync_interval: Duration,
    pub pod_create_timeout: Duration,
    pub ensemble_connect_timeout: Duration,
    pub ensemble_operation_timeout: Duration,
    pub health_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            pod_name: "zookeeper-operator".to_string(),
            pod_namespace: "default".to_string(),
            watch_namespace: None,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            pod_create_timeout: Duration::from_secs(DEFAULT_POD_CREATE_TIMEOUT_SECS),
            ensemble_connect_timeout: Duration::from_millis(DEFAULT_ENSEMBLE_CONNECT_TIMEOUT_MS),
            ensemble_operation_timeout: Duration::from_secs(DEFAULT_ENSEMBLE_OPERATION_TIMEOUT_SECS),
            health_port: DEFAULT_HEALTH_PORT,
        }
    }
}

impl OperatorConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a variable lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let pod_name = lookup("POD_NAME").filter(|v| !v.is_empty()).unwrap_or_else(|| {
            warn!("POD_NAME not set, using hostname");
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or(defaults.pod_name.clone())
        });
        let pod_namespace = lookup("POD_NAMESPACE").filter(|v| !v.is_empty()).unwrap_or_else(|| {
            warn!("POD_NAMESPACE not set, using 'default'");
            defaults.pod_namespace.clone()
        });

        Self {
            pod_name,
            pod_namespace,
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|v| !v.is_empty()),
            resync_interval: Duration::from_secs(parse_or(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            )),
            pod_create_timeout: Duration::from_secs(parse_or(
                &lookup,
                "POD_CREATE_TIMEOUT_SECS",
                DEFAULT_POD_CREATE_TIMEOUT_SECS,
            )),
            ensemble_connect_timeout: Duration::from_millis(parse_or(
                &lookup,
                "ENSEMBLE_CONNECT_TIMEOUT_MS",
                DEFAULT_ENSEMBLE_CONNECT_TIMEOUT_MS,
            )),
            ensemble_operation_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ENSEMBLE_OPERATION_TIMEOUT_SECS",
                DEFAULT_ENSEMBLE_OPERATION_TIMEOUT_SECS,
            )),
            health_port: parse_or(&lookup, "HEALTH_PORT", DEFAULT_HEALTH_PORT),
        }
    }

    /// Timeouts for ensemble sessions.
    pub fn ensemble_client_config(&self) -> EnsembleClientConfig {
        EnsembleClientConfig::default()
            .with_connection_timeout(self.ensemble_connect_timeout)
            .with_operation_timeout(self.ensemble_operation_timeout)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, default = %default, "Invalid value, using default");
            default
        }),
    }
}
