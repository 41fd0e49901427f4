//! zookeeper-operator library crate
//!
//! This module exports the controller, CRD definitions, membership model,
//! ensemble client and resource generators.

pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod membership;
pub mod resources;

pub use config::OperatorConfig;
pub use health::HealthState;

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

use controller::{Dispatcher, context::Context};
use crd::ZookeeperCluster;

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the default watcher configuration.
///
/// `any_semantic()` gives more reliable resource discovery in test environments.
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Run the operator controller.
///
/// Watches ZookeeperCluster resources (in `config.watch_namespace`, or
/// cluster-wide) and drives one worker per cluster. It can be called from
/// main.rs or spawned as a background task during integration tests.
///
/// If health_state is provided, metrics will be recorded for reconcile passes.
pub async fn run_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    let namespace = config.watch_namespace.clone();
    info!(
        "Starting controller for ZookeeperCluster resources (scope: {})",
        namespace.as_deref().unwrap_or("cluster-wide")
    );

    // Mark as ready once we start the controller
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::new(client.clone(), config, health_state));
    let clusters: Api<ZookeeperCluster> = scoped_api(client, namespace.as_deref());
    let mut dispatcher = Dispatcher::new(ctx);

    let mut events = watcher(clusters, default_watcher_config())
        .default_backoff()
        .boxed();
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => dispatcher.handle(event),
            Err(e) => warn!(error = %e, "Cluster watch failed, retrying"),
        }
    }

    // This should never complete in normal operation
    error!("Controller stream ended unexpectedly");
}
