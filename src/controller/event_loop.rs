//! Routing of watch events to per-cluster workers.
//!
//! The [`Dispatcher`] owns one channel per cluster object. The first event
//! for an object spawns its [`Cluster`] worker; later events are forwarded
//! to it. After a relist, objects that were not seen again are treated as
//! deleted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kube::ResourceExt;
use kube::runtime::watcher;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::controller::cluster::{Cluster, ClusterEvent};
use crate::controller::context::Context;
use crate::crd::ZookeeperCluster;

/// Namespace and name of a cluster object.
pub type ObjectKey = (String, String);

fn object_key(obj: &ZookeeperCluster) -> ObjectKey {
    (
        obj.namespace().unwrap_or_else(|| "default".to_string()),
        obj.name_any(),
    )
}

/// Forwards watch events to cluster workers.
pub struct Dispatcher {
    ctx: Arc<Context>,
    workers: HashMap<ObjectKey, mpsc::UnboundedSender<ClusterEvent>>,
    /// Objects seen since the current relist started.
    relisted: Option<HashSet<ObjectKey>>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            workers: HashMap::new(),
            relisted: None,
        }
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn has_worker(&self, namespace: &str, name: &str) -> bool {
        self.workers
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    /// Handle one watch event. Must be called within a tokio runtime.
    pub fn handle(&mut self, event: watcher::Event<ZookeeperCluster>) {
        match event {
            watcher::Event::Init => {
                debug!("Relisting clusters");
                self.relisted = Some(HashSet::new());
            }
            watcher::Event::InitApply(obj) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(object_key(&obj));
                }
                self.apply(obj);
            }
            watcher::Event::InitDone => {
                let Some(seen) = self.relisted.take() else {
                    return;
                };
                let gone: Vec<ObjectKey> = self
                    .workers
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                for key in gone {
                    self.delete(&key);
                }
            }
            watcher::Event::Apply(obj) => self.apply(obj),
            watcher::Event::Delete(obj) => self.delete(&object_key(&obj)),
        }
    }

    fn apply(&mut self, obj: ZookeeperCluster) {
        let key = object_key(&obj);
        let obj = Arc::new(obj);

        if let Some(events) = self.workers.get(&key) {
            if events.send(ClusterEvent::Modified(obj.clone())).is_ok() {
                return;
            }
            debug!(namespace = %key.0, name = %key.1, "Worker stopped, restarting");
        }

        info!(namespace = %key.0, name = %key.1, "Starting cluster worker");
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Cluster::new(obj.clone(), self.ctx.clone());
        tokio::spawn(worker.run(rx));
        // The receiver is alive until the worker handles this event.
        let _ = tx.send(ClusterEvent::Added(obj));
        self.workers.insert(key, tx);
        self.update_metrics();
    }

    fn delete(&mut self, key: &ObjectKey) {
        if let Some(events) = self.workers.remove(key) {
            info!(namespace = %key.0, name = %key.1, "Cluster deleted");
            let _ = events.send(ClusterEvent::Deleted);
        }
        self.update_metrics();
    }

    fn update_metrics(&self) {
        if let Some(metrics) = self.ctx.metrics() {
            metrics.set_clusters_managed(self.workers.len());
        }
    }
}
