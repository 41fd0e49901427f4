//! Tests for routing watch events to cluster workers.

use std::time::Duration;

use kube::runtime::watcher::Event;

use zookeeper_operator::controller::Dispatcher;

use crate::mock_state::{Harness, NAMESPACE, zk_cluster};

/// Let spawned workers run until they are idle.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_apply_spawns_worker_that_bootstraps() {
    let h = Harness::new();
    let mut dispatcher = Dispatcher::new(h.ctx.clone());

    dispatcher.handle(Event::Apply(zk_cluster("zk", 3, "3.5.3-beta")));
    settle().await;

    assert_eq!(dispatcher.worker_count(), 1);
    assert!(dispatcher.has_worker(NAMESPACE, "zk"));
    assert_eq!(h.resources.created(), vec!["zk-1", "zk-2", "zk-3"]);
}

#[tokio::test]
async fn test_repeated_apply_reuses_worker() {
    let h = Harness::new();
    let mut dispatcher = Dispatcher::new(h.ctx.clone());
    let cluster = zk_cluster("zk", 1, "3.5.3-beta");

    dispatcher.handle(Event::Apply(cluster.clone()));
    dispatcher.handle(Event::Apply(cluster));
    settle().await;

    assert_eq!(dispatcher.worker_count(), 1);
    // Modified on a running cluster does not bootstrap again.
    assert_eq!(h.resources.created(), vec!["zk-1"]);
}

#[tokio::test]
async fn test_delete_stops_worker() {
    let h = Harness::new();
    let mut dispatcher = Dispatcher::new(h.ctx.clone());
    let cluster = zk_cluster("zk", 1, "3.5.3-beta");

    dispatcher.handle(Event::Apply(cluster.clone()));
    dispatcher.handle(Event::Delete(cluster));
    settle().await;

    assert_eq!(dispatcher.worker_count(), 0);
    assert!(!dispatcher.has_worker(NAMESPACE, "zk"));
}

#[tokio::test]
async fn test_relist_removes_vanished_clusters() {
    let h = Harness::new();
    let mut dispatcher = Dispatcher::new(h.ctx.clone());
    let kept = zk_cluster("kept", 1, "3.5.3-beta");

    dispatcher.handle(Event::Apply(kept.clone()));
    dispatcher.handle(Event::Apply(zk_cluster("gone", 1, "3.5.3-beta")));
    assert_eq!(dispatcher.worker_count(), 2);

    dispatcher.handle(Event::Init);
    dispatcher.handle(Event::InitApply(kept));
    dispatcher.handle(Event::InitDone);
    settle().await;

    assert_eq!(dispatcher.worker_count(), 1);
    assert!(dispatcher.has_worker(NAMESPACE, "kept"));
    assert!(!dispatcher.has_worker(NAMESPACE, "gone"));
}
