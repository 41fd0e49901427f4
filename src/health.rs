//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 when ready to serve traffic)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// Labels for reconciliation metrics (namespace + name)
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReconcileLabels {
    pub namespace: String,
    pub name: String,
}

impl EncodeLabelSet for ReconcileLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for membership change metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct MembershipChangeLabels {
    pub namespace: String,
    pub name: String,
    /// One of add, remove, replace, upgrade, prune, reconfigure.
    pub kind: String,
}

impl EncodeLabelSet for MembershipChangeLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the operator
pub struct Metrics {
    /// Total reconcile passes counter
    pub reconciliations_total: Family<ReconcileLabels, Counter>,
    /// Failed reconcile passes counter
    pub reconciliation_errors_total: Family<ReconcileLabels, Counter>,
    /// Passes aborted because quorum was lost
    pub lost_quorum_total: Family<ReconcileLabels, Counter>,
    /// Reconcile pass duration histogram
    pub reconcile_duration_seconds: Family<ReconcileLabels, Histogram>,
    /// Clusters with a running worker
    pub clusters_managed: Gauge,
    /// Desired ensemble size per cluster
    pub members_desired: Family<ReconcileLabels, Gauge>,
    /// Members the operator currently manages per cluster
    pub members_current: Family<ReconcileLabels, Gauge>,
    /// Membership mutations by kind
    pub membership_changes_total: Family<MembershipChangeLabels, Counter>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let reconciliations_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "zkoperator_reconciliations",
            "Total number of reconcile passes",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "zkoperator_reconciliation_errors",
            "Total number of failed reconcile passes",
            reconciliation_errors_total.clone(),
        );

        let lost_quorum_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "zkoperator_lost_quorum",
            "Total number of passes aborted because the ensemble lost quorum",
            lost_quorum_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ReconcileLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "zkoperator_reconcile_duration_seconds",
            "Duration of reconcile passes in seconds",
            reconcile_duration_seconds.clone(),
        );

        let clusters_managed = Gauge::default();
        registry.register(
            "zkoperator_clusters_managed",
            "Number of ZookeeperCluster resources with a running worker",
            clusters_managed.clone(),
        );

        let members_desired = Family::<ReconcileLabels, Gauge>::default();
        registry.register(
            "zkoperator_members_desired",
            "Desired ensemble size for each cluster",
            members_desired.clone(),
        );

        let members_current = Family::<ReconcileLabels, Gauge>::default();
        registry.register(
            "zkoperator_members_current",
            "Number of members managed for each cluster",
            members_current.clone(),
        );

        let membership_changes_total = Family::<MembershipChangeLabels, Counter>::default();
        registry.register(
            "zkoperator_membership_changes",
            "Total number of membership changes by kind",
            membership_changes_total.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            lost_quorum_total,
            reconcile_duration_seconds,
            clusters_managed,
            members_desired,
            members_current,
            membership_changes_total,
            registry,
        }
    }

    /// Record a successful reconcile pass
    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let labels = reconcile_labels(namespace, name);
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a failed reconcile pass
    pub fn record_error(&self, namespace: &str, name: &str) {
        self.reconciliation_errors_total
            .get_or_create(&reconcile_labels(namespace, name))
            .inc();
    }

    /// Record a pass aborted on lost quorum
    pub fn record_lost_quorum(&self, namespace: &str, name: &str) {
        self.lost_quorum_total
            .get_or_create(&reconcile_labels(namespace, name))
            .inc();
    }

    /// Record a membership change
    pub fn record_membership_change(&self, namespace: &str, name: &str, kind: &str) {
        let labels = MembershipChangeLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
        };
        self.membership_changes_total.get_or_create(&labels).inc();
    }

    /// Update the number of managed clusters
    pub fn set_clusters_managed(&self, count: usize) {
        self.clusters_managed
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Update ensemble size metrics
    pub fn set_cluster_members(&self, namespace: &str, name: &str, desired: i64, current: i64) {
        let labels = reconcile_labels(namespace, name);
        self.members_desired.get_or_create(&labels).set(desired);
        self.members_current.get_or_create(&labels).set(current);
    }

    /// Drop the per-cluster series of a deleted cluster
    pub fn remove_cluster(&self, namespace: &str, name: &str) {
        let labels = reconcile_labels(namespace, name);
        self.members_desired.remove(&labels);
        self.members_current.remove(&labels);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

fn reconcile_labels(namespace: &str, name: &str) -> ReconcileLabels {
    ReconcileLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the operator is ready (acquired leadership and watching clusters)
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
    /// Last successful reconcile timestamp (Unix epoch seconds)
    pub last_reconcile: AtomicU64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
            last_reconcile: AtomicU64::new(0),
        }
    }

    /// Mark the operator as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the operator is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    /// Remember the time of the last successful reconcile pass
    pub fn touch_reconcile(&self) {
        let now = jiff::Timestamp::now().as_second().max(0) as u64;
        self.last_reconcile.store(now, Ordering::Relaxed);
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
/// This is a simple check - if we can respond, we're alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 200 OK if the operator is ready to serve.
/// Returns 503 Service Unavailable if not ready.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0:`port` and serves health/metrics endpoints.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port = port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
