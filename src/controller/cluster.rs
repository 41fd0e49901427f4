//! Per-cluster worker.
//!
//! Every ZookeeperCluster is driven by one [`Cluster`] owned by a single
//! task. Lifecycle events and resync ticks arrive through one channel and are
//! handled strictly in order, so membership and status need no locking.
//!
//! ## Lifecycle
//!
//! ```text
//! Initializing ──setup ok──▶ Running ──Deleted──▶ Terminated
//!      ▲   │                                          ▲
//!      └───┘ setup failed, retried on Modified/Resync │
//!      └──────────────────────Deleted─────────────────┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::client::EnsembleConfig;
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::status::StatusTracker;
use crate::controller::validation::{apply_defaults, validate_spec};
use crate::crd::{ClusterPhase, ZookeeperCluster};
use crate::membership::{JoinState, Member, MemberSet};
use crate::resources::common::{is_terminating, pod_phase};
use crate::resources::{build_client_service, build_peer_service, build_pod};

/// Lifecycle event for one cluster.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    Added(Arc<ZookeeperCluster>),
    Modified(Arc<ZookeeperCluster>),
    Deleted,
    /// Periodic tick requesting a reconcile pass.
    Resync,
}

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Seeds are being created or membership is being recovered.
    Initializing,
    Running,
    /// The object was deleted; no further passes run.
    Terminated,
}

/// Worker owning the membership and status of one cluster.
pub struct Cluster {
    pub(super) cluster: ZookeeperCluster,
    pub(super) name: String,
    pub(super) namespace: String,
    pub(super) members: MemberSet,
    pub(super) status: StatusTracker,
    pub(super) state: WorkerState,
    pub(super) ctx: Arc<Context>,
    /// The persisted status records a running ensemble to recover.
    recover_on_setup: bool,
}

impl Cluster {
    pub fn new(cluster: Arc<ZookeeperCluster>, ctx: Arc<Context>) -> Self {
        let status = cluster
            .status
            .as_ref()
            .map(StatusTracker::from_status)
            .unwrap_or_default();
        let name = cluster.name_any();
        let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
        let recover_on_setup = status.phase() == ClusterPhase::Running;

        Self {
            cluster: with_defaults(&cluster),
            name,
            namespace,
            members: MemberSet::new(),
            status,
            state: WorkerState::Initializing,
            ctx,
            recover_on_setup,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Cached object with spec defaults applied.
    pub fn cluster(&self) -> &ZookeeperCluster {
        &self.cluster
    }

    pub fn members(&self) -> &MemberSet {
        &self.members
    }

    pub fn status(&self) -> &StatusTracker {
        &self.status
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Process events until the cluster is deleted.
    ///
    /// Resync ticks are generated locally at the configured interval. A
    /// closed channel is treated as deletion.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ClusterEvent>) {
        let mut resync = tokio::time::interval(self.ctx.config.resync_interval);
        resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; Added already runs setup.
        resync.tick().await;

        loop {
            let event = tokio::select! {
                event = events.recv() => event.unwrap_or(ClusterEvent::Deleted),
                _ = resync.tick() => ClusterEvent::Resync,
            };

            if let Err(e) = self.handle_event(event).await {
                if e.is_retryable() {
                    warn!(name = %self.name, namespace = %self.namespace, error = %e, "Reconcile failed, will retry");
                } else {
                    error!(name = %self.name, namespace = %self.namespace, error = %e, "Reconcile failed");
                }
            }

            if self.state == WorkerState::Terminated {
                info!(name = %self.name, namespace = %self.namespace, "Cluster deleted, stopping worker");
                return;
            }
        }
    }

    /// Handle one lifecycle event.
    pub async fn handle_event(&mut self, event: ClusterEvent) -> Result<()> {
        match event {
            ClusterEvent::Added(obj) => {
                self.adopt(obj);
                self.setup().await
            }
            ClusterEvent::Modified(obj) => {
                if self.state == WorkerState::Running {
                    let candidate = with_defaults(&obj);
                    if let Err(e) = validate_spec(&candidate.spec) {
                        warn!(name = %self.name, error = %e, "Ignoring invalid spec update");
                        return Err(e);
                    }
                    self.cluster = candidate;
                    return Ok(());
                }
                self.adopt(obj);
                if self.state == WorkerState::Initializing {
                    return self.setup().await;
                }
                Ok(())
            }
            ClusterEvent::Resync => match self.state {
                WorkerState::Initializing => self.setup().await,
                WorkerState::Running if self.cluster.spec.paused => {
                    debug!(name = %self.name, "Cluster paused, skipping reconcile");
                    Ok(())
                }
                WorkerState::Running => self.sync().await,
                WorkerState::Terminated => Ok(()),
            },
            ClusterEvent::Deleted => {
                self.state = WorkerState::Terminated;
                if let Some(metrics) = self.ctx.metrics() {
                    metrics.remove_cluster(&self.namespace, &self.name);
                }
                Ok(())
            }
        }
    }

    /// Replace the cached object, applying spec defaults.
    fn adopt(&mut self, obj: Arc<ZookeeperCluster>) {
        self.cluster = with_defaults(&obj);
    }

    /// Validate the cluster object, then recover or bootstrap the ensemble.
    async fn setup(&mut self) -> Result<()> {
        if let Err(e) = validate_spec(&self.cluster.spec) {
            warn!(name = %self.name, error = %e, "Invalid cluster spec, waiting for a valid update");
            self.status.set_failed(e.to_string());
            self.write_status().await;
            return Err(e);
        }

        if self.recover_on_setup {
            self.recover().await?;
        } else {
            self.status.set_phase(ClusterPhase::Initializing);
            self.bootstrap().await?;
        }

        if self.status.current_version().is_none() {
            self.status.set_version(&self.cluster.spec.version);
        }
        self.status.set_phase(ClusterPhase::Running);
        self.status.set_size(self.members.size());
        self.status.set_members(self.members.names());
        self.state = WorkerState::Running;
        self.write_status().await;
        info!(name = %self.name, namespace = %self.namespace, members = %self.members, "Cluster running");
        Ok(())
    }

    /// Rebuild membership from the live ensemble configuration.
    async fn recover(&mut self) -> Result<()> {
        let pods = self.observed_pods().await?;
        let running = MemberSet::from_pods(
            pods.iter().filter(|p| pod_phase(p) == Some("Running")),
            &self.namespace,
        );
        if running.is_empty() {
            return Err(Error::Transient(format!(
                "no running pods to recover membership of {}",
                self.name
            )));
        }

        let config = self.ctx.ensemble.read_config(&running.client_endpoints()).await?;
        self.members = MemberSet::from_ensemble_config(&config, &self.namespace)?;
        info!(name = %self.name, members = %self.members, "Recovered membership from ensemble config");
        Ok(())
    }

    /// Create services and the seed members.
    async fn bootstrap(&mut self) -> Result<()> {
        info!(name = %self.name, size = self.cluster.spec.size, "Bootstrapping ensemble");
        self.ctx
            .resources
            .create_service(build_client_service(&self.cluster))
            .await?;
        self.ctx
            .resources
            .create_service(build_peer_service(&self.cluster))
            .await?;

        let size = u32::try_from(self.cluster.spec.size).unwrap_or(0);
        let seeds: MemberSet = (1..=size)
            .map(|id| Member::for_cluster(&self.name, self.namespace.as_str(), id))
            .collect();

        let existing_pods = self.observed_pods().await?;
        for seed in seeds.iter() {
            if existing_pods.iter().any(|p| p.name_any() == seed.name()) {
                debug!(member = %seed, "Seed pod already exists");
                continue;
            }
            let others = EnsembleConfig::from_lines(
                seeds
                    .iter()
                    .filter(|m| m.name() != seed.name())
                    .map(Member::config_line),
            );
            let pod = build_pod(seed, &others, JoinState::Seed, &self.cluster);
            self.ctx
                .resources
                .create_pod_and_wait(pod, self.ctx.config.pod_create_timeout)
                .await
                .map_err(|e| Error::pod_create(seed.name(), e))?;
            info!(member = %seed, "Created seed member");
        }

        self.members = seeds;
        Ok(())
    }

    /// Run one reconcile pass against the observed pods.
    pub async fn sync(&mut self) -> Result<()> {
        let start = Instant::now();
        let pods = self.observed_pods().await?;

        if let Some(pending) = pods.iter().find(|p| pod_phase(p) == Some("Pending")) {
            debug!(name = %self.name, pod = %pending.name_any(), "Pod pending, skipping reconcile");
            return Ok(());
        }
        let running: Vec<Pod> = pods
            .into_iter()
            .filter(|p| pod_phase(p) == Some("Running"))
            .collect();

        let result = self.reconcile(&running).await;
        self.status.set_observed_generation(self.cluster.metadata.generation);
        self.write_status().await;

        if let Some(health) = &self.ctx.health_state {
            let metrics = &health.metrics;
            metrics.record_reconcile(&self.namespace, &self.name, start.elapsed().as_secs_f64());
            metrics.set_cluster_members(
                &self.namespace,
                &self.name,
                i64::from(self.cluster.spec.size),
                i64::try_from(self.members.size()).unwrap_or(i64::MAX),
            );
            match &result {
                Err(Error::LostQuorum { .. }) => {
                    metrics.record_lost_quorum(&self.namespace, &self.name);
                }
                Err(_) => metrics.record_error(&self.namespace, &self.name),
                Ok(()) => {}
            }
            health.touch_reconcile();
        }

        result
    }

    /// Pods of this cluster, excluding terminating and foreign-owned ones.
    async fn observed_pods(&self) -> Result<Vec<Pod>> {
        let uid = self.cluster.uid();
        let pods = self
            .ctx
            .resources
            .list_pods(&self.namespace, &self.name)
            .await?;

        Ok(pods
            .into_iter()
            .filter(|pod| !is_terminating(pod))
            .filter(|pod| {
                let Some(uid) = uid.as_deref() else {
                    return true;
                };
                let owned = pod.owner_references().iter().any(|r| r.uid == uid);
                if !owned {
                    warn!(pod = %pod.name_any(), "Ignoring pod not owned by this cluster");
                }
                owned
            })
            .collect())
    }

    /// Write the tracked status. Failures are logged only.
    pub(super) async fn write_status(&mut self) {
        let status = self.status.to_status();
        if let Err(e) = self.ctx.resources.patch_status(&self.cluster, &status).await {
            warn!(name = %self.name, error = %e, "Failed to update status");
        }
    }
}

fn with_defaults(obj: &ZookeeperCluster) -> ZookeeperCluster {
    let mut cluster = obj.clone();
    apply_defaults(&mut cluster.spec);
    cluster
}
