//! Multi-step scenario tests for the cluster worker.
//!
//! Each test drives a real [`Cluster`] worker through lifecycle events and
//! resync passes against the in-memory mocks, then checks the pods,
//! ensemble reconfigurations, events and status the passes produced.

use std::sync::Arc;

use zookeeper_operator::client::ServerRole;
use zookeeper_operator::controller::error::Error;
use zookeeper_operator::controller::status::{ScalingDirection, is_condition_true};
use zookeeper_operator::controller::{ClusterEvent, WorkerState};
use zookeeper_operator::crd::{ClusterPhase, ConditionType};
use zookeeper_operator::resources::pod_version;

use crate::mock_state::{
    Harness, modified, running_cluster, running_pod, seed_config, zk_cluster,
};

fn server_line(id: u32, role: &str) -> String {
    format!("server.{id}=zk-{id}.zk.default.svc:2888:3888:{role};zk-{id}.zk.default.svc:2181")
}

fn env_value(pod: &k8s_openapi::api::core::v1::Pod, name: &str) -> Option<String> {
    pod.spec
        .as_ref()?
        .containers
        .iter()
        .find(|c| c.name == "zookeeper")?
        .env
        .as_ref()?
        .iter()
        .find(|e| e.name == name)?
        .value
        .clone()
}

// ============================================================================
// Bootstrap and recovery
// ============================================================================

#[tokio::test]
async fn test_bootstrap_creates_services_and_seeds() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "v3.5.3-beta");
    let mut worker = h.worker(&cluster);

    worker
        .handle_event(ClusterEvent::Added(Arc::new(cluster)))
        .await
        .unwrap();

    assert_eq!(worker.state(), WorkerState::Running);
    assert_eq!(worker.members().names(), vec!["zk-1", "zk-2", "zk-3"]);
    assert_eq!(worker.cluster().spec.version, "3.5.3-beta");

    let services = h.resources.state.lock().unwrap().services.clone();
    assert_eq!(services, vec!["zk-client", "zk"]);
    assert_eq!(h.resources.created(), vec!["zk-1", "zk-2", "zk-3"]);

    // Every seed knows the whole seed ensemble.
    let pod = h.resources.pod("zk-2").unwrap();
    let servers = env_value(&pod, "ZOO_SERVERS").unwrap();
    assert_eq!(servers.split(' ').count(), 3);
    assert!(servers.contains(&server_line(2, "participant")));
    assert_eq!(env_value(&pod, "ZOO_MY_ID").as_deref(), Some("2"));

    let status = h.resources.last_status().unwrap();
    assert_eq!(status.phase, ClusterPhase::Running);
    assert_eq!(status.size, 3);
    assert_eq!(status.current_version.as_deref(), Some("3.5.3-beta"));
}

#[tokio::test]
async fn test_bootstrap_skips_existing_seed_pods() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    h.resources.insert_pod(running_pod(&cluster, 1));
    let mut worker = h.worker(&cluster);

    worker
        .handle_event(ClusterEvent::Added(Arc::new(cluster)))
        .await
        .unwrap();

    assert_eq!(h.resources.created(), vec!["zk-2", "zk-3"]);
    assert_eq!(worker.members().size(), 3);
}

#[tokio::test]
async fn test_recovery_rebuilds_membership_from_ensemble() {
    let h = Harness::new();
    let cluster = running_cluster("zk", 3, "3.5.3-beta");
    for id in 1..=3 {
        h.resources.insert_pod(running_pod(&cluster, id));
    }
    h.ensemble.set_config(seed_config("zk", 3));
    let mut worker = h.worker(&cluster);

    worker
        .handle_event(ClusterEvent::Added(Arc::new(cluster)))
        .await
        .unwrap();

    assert_eq!(worker.state(), WorkerState::Running);
    assert_eq!(worker.members().names(), vec!["zk-1", "zk-2", "zk-3"]);
    assert!(h.resources.created().is_empty());
    assert!(h.resources.state.lock().unwrap().services.is_empty());
}

#[tokio::test]
async fn test_recovery_keeps_observer_roles() {
    let h = Harness::new();
    let cluster = running_cluster("zk", 4, "3.5.3-beta");
    for id in 1..=4 {
        h.resources.insert_pod(running_pod(&cluster, id));
    }
    let mut lines: Vec<String> = seed_config("zk", 3).lines().to_vec();
    lines.push(server_line(4, "observer"));
    h.ensemble
        .set_config(zookeeper_operator::client::EnsembleConfig::from_lines(lines));
    let mut worker = h.worker(&cluster);

    worker
        .handle_event(ClusterEvent::Added(Arc::new(cluster)))
        .await
        .unwrap();

    assert_eq!(
        worker.members().get("zk-4").unwrap().role(),
        ServerRole::Observer
    );
}

#[tokio::test]
async fn test_recovery_without_running_pods_retries() {
    let h = Harness::new();
    let cluster = running_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.worker(&cluster);

    let err = worker
        .handle_event(ClusterEvent::Added(Arc::new(cluster.clone())))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transient(_)));
    assert_eq!(worker.state(), WorkerState::Initializing);
    assert!(h.resources.created().is_empty());

    // Pods come back; the next resync finishes recovery.
    for id in 1..=3 {
        h.resources.insert_pod(running_pod(&cluster, id));
    }
    h.ensemble.set_config(seed_config("zk", 3));
    worker.handle_event(ClusterEvent::Resync).await.unwrap();
    assert_eq!(worker.state(), WorkerState::Running);
    assert_eq!(worker.members().size(), 3);
}

// ============================================================================
// Validation and lifecycle events
// ============================================================================

#[tokio::test]
async fn test_invalid_spec_waits_for_valid_update() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 0, "3.5.3-beta");
    let mut worker = h.worker(&cluster);

    let err = worker
        .handle_event(ClusterEvent::Added(Arc::new(cluster.clone())))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(worker.state(), WorkerState::Initializing);
    let status = h.resources.last_status().unwrap();
    assert_eq!(status.phase, ClusterPhase::Failed);
    assert!(status.reason.unwrap().contains("below minimum"));
    assert!(h.resources.created().is_empty());

    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| s.size = 3)))
        .await
        .unwrap();
    assert_eq!(worker.state(), WorkerState::Running);
    assert_eq!(h.resources.created().len(), 3);
    assert!(h.resources.last_status().unwrap().reason.is_none());
}

#[tokio::test]
async fn test_reserved_pod_label_is_rejected() {
    let h = Harness::new();
    let mut cluster = zk_cluster("zk", 3, "3.5.3-beta");
    cluster.spec.pod = Some(zookeeper_operator::crd::PodPolicy {
        labels: [("zookeeper_node".to_string(), "x".to_string())].into(),
        ..Default::default()
    });
    let mut worker = h.worker(&cluster);

    let result = worker
        .handle_event(ClusterEvent::Added(Arc::new(cluster)))
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_modified_replaces_cached_object() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;

    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| s.size = 5)))
        .await
        .unwrap();

    assert_eq!(
        worker.cluster().metadata.resource_version.as_deref(),
        Some("2")
    );
    assert_eq!(worker.cluster().spec.size, 5);
    // Modified alone never mutates the ensemble.
    assert!(h.resources.created().is_empty());
}

#[tokio::test]
async fn test_invalid_update_of_running_cluster_is_ignored() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;

    let result = worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| s.size = 0)))
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(worker.cluster().spec.size, 3);
    assert_eq!(worker.state(), WorkerState::Running);
}

#[tokio::test]
async fn test_paused_cluster_skips_reconcile() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    h.resources.kill_pod("zk-2");

    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| s.paused = true)))
        .await
        .unwrap();
    let lists = h.resources.list_calls();
    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    assert_eq!(h.resources.list_calls(), lists);
    assert!(h.resources.created().is_empty());
    assert!(h.resources.pod("zk-2").is_none());
}

#[tokio::test]
async fn test_deleted_terminates_worker() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 1, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;

    worker.handle_event(ClusterEvent::Deleted).await.unwrap();
    assert_eq!(worker.state(), WorkerState::Terminated);

    // No cascading deletion; pods are left to garbage collection.
    assert!(h.resources.deleted().is_empty());
    let lists = h.resources.list_calls();
    worker.handle_event(ClusterEvent::Resync).await.unwrap();
    assert_eq!(h.resources.list_calls(), lists);
}

// ============================================================================
// Reconfiguration
// ============================================================================

#[tokio::test]
async fn test_reconfigures_when_live_config_is_short() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    h.ensemble.set_config(seed_config("zk", 2));

    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    let reconfigures = h.ensemble.reconfigures();
    assert_eq!(reconfigures.len(), 1);
    assert_eq!(reconfigures[0], seed_config("zk", 3));
    assert!(h.resources.created().is_empty());
    assert!(h.resources.deleted().is_empty());
    // The pass ends after reconfiguring; scaling and upgrade state are untouched.
    assert!(worker.status().conditions().scaling().is_none());
    assert!(worker.status().conditions().upgrading().is_none());
    assert!(!worker.status().conditions().is_ready());
}

#[tokio::test]
async fn test_converged_cluster_becomes_ready() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;

    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    assert!(h.ensemble.reconfigures().is_empty());
    assert!(worker.status().conditions().is_ready());
    let status = h.resources.last_status().unwrap();
    assert!(is_condition_true(&status.conditions, ConditionType::Ready));
    assert_eq!(status.members, vec!["zk-1", "zk-2", "zk-3"]);
    assert_eq!(status.observed_generation, Some(1));
}

#[tokio::test]
async fn test_unreachable_ensemble_aborts_pass() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    h.ensemble.set_unreachable(true);

    let err = worker.handle_event(ClusterEvent::Resync).await.unwrap_err();

    assert!(matches!(err, Error::Ensemble(_)));
    assert!(err.is_retryable());
    assert_eq!(worker.members().size(), 3);
    assert_eq!(h.resources.last_status().unwrap().size, 3);
}

// ============================================================================
// Scaling
// ============================================================================

#[tokio::test]
async fn test_scale_up_adds_one_member_per_pass() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| s.size = 7)))
        .await
        .unwrap();

    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    assert_eq!(worker.members().size(), 4);
    assert_eq!(h.resources.created(), vec!["zk-4"]);
    let scaling = worker.status().conditions().scaling().unwrap();
    assert_eq!(scaling.direction, ScalingDirection::Up);
    assert_eq!((scaling.from_size, scaling.to_size), (3, 7));
    assert_eq!(h.resources.event_reasons(), vec!["MemberAdded"]);

    // The new member joins as an observer of the existing ensemble.
    let pod = h.resources.pod("zk-4").unwrap();
    let servers = env_value(&pod, "ZOO_SERVERS").unwrap();
    assert!(servers.contains(&server_line(4, "observer")));
    assert!(servers.contains(&server_line(1, "participant")));
    assert_eq!(
        worker.members().get("zk-4").unwrap().role(),
        ServerRole::Observer
    );
}

#[tokio::test]
async fn test_scale_up_converges_to_desired_size() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| s.size = 5)))
        .await
        .unwrap();

    let sizes = h.resync_until_ready(&mut worker, 20).await;

    assert!(sizes.windows(2).all(|w| w[1] <= w[0] + 1));
    assert_eq!(worker.members().size(), 5);
    assert!(worker.status().conditions().is_ready());
    assert!(worker.members().observers().is_empty());
    assert_eq!(h.ensemble.config(), seed_config("zk", 5));
}

#[tokio::test]
async fn test_observer_is_promoted_once_announced() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| s.size = 4)))
        .await
        .unwrap();

    // Add zk-4, announce it as an observer, then promote it.
    worker.handle_event(ClusterEvent::Resync).await.unwrap();
    worker.handle_event(ClusterEvent::Resync).await.unwrap();
    assert!(
        h.ensemble
            .config()
            .lines()
            .iter()
            .any(|l| l.starts_with("server.4=") && l.contains(":observer;"))
    );
    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    assert_eq!(
        worker.members().get("zk-4").unwrap().role(),
        ServerRole::Participant
    );
    assert_eq!(h.ensemble.config(), seed_config("zk", 4));
}

#[tokio::test]
async fn test_scale_down_removes_one_member_gracefully() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 5, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| s.size = 3)))
        .await
        .unwrap();

    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    assert_eq!(worker.members().size(), 4);
    assert!(!worker.members().contains("zk-1"));
    assert_eq!(h.resources.deleted(), vec![("zk-1".to_string(), false)]);
    let reconfigures = h.ensemble.reconfigures();
    assert_eq!(reconfigures.len(), 1);
    assert_eq!(reconfigures[0].len(), 4);
    let scaling = worker.status().conditions().scaling().unwrap();
    assert_eq!(scaling.direction, ScalingDirection::Down);
    assert_eq!(h.resources.event_reasons(), vec!["MemberRemoved"]);
    assert_eq!(h.resources.last_status().unwrap().size, 4);
}

#[tokio::test]
async fn test_scale_down_proceeds_when_reconfigure_fails() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 4, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| s.size = 3)))
        .await
        .unwrap();
    h.ensemble.state.lock().unwrap().reject_reconfigure = true;

    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    assert_eq!(worker.members().size(), 3);
    assert_eq!(h.resources.deleted(), vec![("zk-1".to_string(), false)]);
    assert_eq!(h.ensemble.config().len(), 4);

    // The next pass repairs the drift.
    h.ensemble.state.lock().unwrap().reject_reconfigure = false;
    worker.handle_event(ClusterEvent::Resync).await.unwrap();
    assert_eq!(h.ensemble.config(), worker.members().to_ensemble_config());
    assert_eq!(h.ensemble.config().len(), 3);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_lost_quorum_blocks_mutation() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 5, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    for name in ["zk-3", "zk-4", "zk-5"] {
        h.resources.kill_pod(name);
    }

    let err = worker.handle_event(ClusterEvent::Resync).await.unwrap_err();

    match err {
        Error::LostQuorum {
            live,
            known,
            required,
        } => assert_eq!((live, known, required), (2, 5, 3)),
        other => panic!("expected LostQuorum, got {other}"),
    }
    assert!(h.resources.created().is_empty());
    assert!(h.resources.deleted().is_empty());
    assert!(h.ensemble.reconfigures().is_empty());
    assert_eq!(worker.members().size(), 5);
    assert_eq!(h.resources.last_status().unwrap().size, 5);
}

#[tokio::test]
async fn test_replaces_dead_member_with_quorum() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 5, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    h.resources.kill_pod("zk-4");
    h.resources.kill_pod("zk-5");

    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    // Lowest ID among the dead is replaced first, and its pod may drain.
    assert_eq!(h.resources.deleted(), vec![("zk-4".to_string(), false)]);
    assert_eq!(h.resources.created(), vec!["zk-4"]);
    assert_eq!(
        h.resources.event_reasons(),
        vec!["ReplacingDeadMember", "MemberRemoved", "MemberAdded"]
    );
    assert!(h.ensemble.reconfigures().is_empty());
    assert_eq!(worker.members().size(), 5);

    let pod = h.resources.pod("zk-4").unwrap();
    let servers = env_value(&pod, "ZOO_SERVERS").unwrap();
    assert!(servers.contains(&server_line(4, "participant")));
}

#[tokio::test]
async fn test_unknown_pods_are_pruned() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    h.resources.insert_pod(running_pod(&cluster, 9));

    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    assert_eq!(h.resources.deleted(), vec![("zk-9".to_string(), true)]);
    assert!(h.resources.created().is_empty());
    assert!(h.ensemble.reconfigures().is_empty());
    assert_eq!(worker.members().size(), 3);
}

#[tokio::test]
async fn test_pending_pod_skips_pass() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    h.resources.kill_pod("zk-3");
    h.resources.insert_pod(running_pod(&cluster, 4));
    h.resources.set_pod_phase("zk-4", "Pending");

    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    assert!(h.resources.created().is_empty());
    assert!(h.resources.deleted().is_empty());
    assert_eq!(h.ensemble.state.lock().unwrap().reads, 0);
}

#[tokio::test]
async fn test_failed_pod_create_names_member() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.5.3-beta");
    let mut worker = h.running_worker(&cluster).await;
    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| s.size = 4)))
        .await
        .unwrap();
    h.resources.state.lock().unwrap().fail_creates_with_phase = Some("Failed".to_string());

    let err = worker.handle_event(ClusterEvent::Resync).await.unwrap_err();

    assert!(matches!(err, Error::PodCreate { ref member, .. } if member == "zk-4"));
    assert!(err.to_string().contains("zk-4"));
    // The member joined the membership before its pod was created.
    assert!(worker.members().contains("zk-4"));
    assert!(h.resources.event_reasons().is_empty());
}

// ============================================================================
// Upgrade
// ============================================================================

#[tokio::test]
async fn test_upgrade_replaces_one_old_member() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.4.0");
    let mut worker = h.running_worker(&cluster).await;
    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| {
            s.version = "3.5.3".to_string()
        })))
        .await
        .unwrap();
    h.resources.set_pod_version("zk-2", "3.5.3");
    h.resources.set_pod_version("zk-3", "3.5.3");

    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    assert_eq!(h.resources.deleted(), vec![("zk-1".to_string(), false)]);
    assert_eq!(h.resources.created(), vec!["zk-1"]);
    let pod = h.resources.pod("zk-1").unwrap();
    assert_eq!(pod_version(&pod), Some("3.5.3"));

    let upgrading = worker.status().conditions().upgrading().unwrap();
    assert_eq!(upgrading.from_version, "3.4.0");
    assert_eq!(upgrading.to_version, "3.5.3");
    let status = h.resources.last_status().unwrap();
    assert!(is_condition_true(&status.conditions, ConditionType::Upgrading));
    assert_eq!(status.target_version.as_deref(), Some("3.5.3"));
}

#[tokio::test]
async fn test_upgrade_rolls_through_all_members() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.4.0");
    let mut worker = h.running_worker(&cluster).await;
    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| {
            s.version = "3.5.3".to_string()
        })))
        .await
        .unwrap();

    h.resync_until_ready(&mut worker, 20).await;

    assert!(worker.status().conditions().is_ready());
    assert_eq!(worker.status().current_version(), Some("3.5.3"));
    for name in ["zk-1", "zk-2", "zk-3"] {
        let pod = h.resources.pod(name).unwrap();
        assert_eq!(pod_version(&pod), Some("3.5.3"), "{name} not upgraded");
    }
    assert_eq!(h.resources.created().len(), 3);
    assert_eq!(h.ensemble.config(), seed_config("zk", 3));
}

#[tokio::test]
async fn test_no_upgrade_while_resizing() {
    let h = Harness::new();
    let cluster = zk_cluster("zk", 3, "3.4.0");
    let mut worker = h.running_worker(&cluster).await;
    worker
        .handle_event(ClusterEvent::Modified(modified(&cluster, |s| {
            s.size = 4;
            s.version = "3.5.3".to_string();
        })))
        .await
        .unwrap();

    worker.handle_event(ClusterEvent::Resync).await.unwrap();

    assert_eq!(h.resources.created(), vec!["zk-4"]);
    assert!(h.resources.deleted().is_empty());
    assert!(worker.status().conditions().upgrading().is_none());
}
