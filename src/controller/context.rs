//! Shared context for the controller.
//!
//! The Context struct holds shared state handed to every cluster worker:
//! the Kubernetes and ensemble clients, operator settings and the optional
//! health state used for metrics.

use std::sync::Arc;

use kube::Client;

use crate::client::{EnsembleClient, ZkEnsembleClient};
use crate::config::OperatorConfig;
use crate::health::{HealthState, Metrics};
use crate::resources::{KubeResourceClient, ResourceClient};

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes operations on cluster objects
    pub resources: Arc<dyn ResourceClient>,
    /// Ensemble dynamic-membership client
    pub ensemble: Arc<dyn EnsembleClient>,
    /// Operator settings
    pub config: OperatorConfig,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Create a context talking to a real cluster and real ensembles
    pub fn new(client: Client, config: OperatorConfig, health_state: Option<Arc<HealthState>>) -> Self {
        let ensemble = ZkEnsembleClient::new(config.ensemble_client_config());
        Self {
            resources: Arc::new(KubeResourceClient::new(client)),
            ensemble: Arc::new(ensemble),
            config,
            health_state,
        }
    }

    /// Create a context from explicit clients
    pub fn with_clients(
        resources: Arc<dyn ResourceClient>,
        ensemble: Arc<dyn EnsembleClient>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            resources,
            ensemble,
            config,
            health_state: None,
        }
    }

    /// Attach health state for metrics
    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    /// Metrics registry, when health state is attached
    pub fn metrics(&self) -> Option<&Metrics> {
        self.health_state.as_deref().map(|h| &h.metrics)
    }
}
