//! Reconcile passes against the fake API server

use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::ResourceExt;
use kube::api::DynamicObject;
use kube::runtime::controller::Action;

use hypershift_operator::client::{self, ObjectClient};
use hypershift_operator::controller::deletion::DELETION_REQUEUE;
use hypershift_operator::controller::pause::PAUSED_REQUEUE;
use hypershift_operator::controller::reconciler::RESYNC_INTERVAL;
use hypershift_operator::controller::reconcile_key;
use hypershift_operator::controller::status::{condition_reasons, condition_types};
use hypershift_operator::crd::{
    ClusterVersionStatus, HostedCluster, HostedClusterStatus, HostedControlPlane,
    LocalObjectReference, NodePool, Release, UpdateHistory, UpdateState, find_condition,
};
use hypershift_operator::resources::capi;
use hypershift_operator::resources::common::{
    ACK_NETWORKING_DISRUPTION_ANNOTATION, FINALIZER, HAS_BEEN_AVAILABLE_ANNOTATION,
    HOSTED_CLUSTER_ANNOTATION, OADP_PAUSED_AT_ANNOTATION, OADP_PAUSED_BY_ANNOTATION,
    OADP_PLUGIN_AUTHOR, SECURITY_CONTEXT_UID_ANNOTATION, SKIP_DELETE_CONTROL_PLANE_NAMESPACE_ANNOTATION,
};

use kube_fake_client::ClientBuilder;

use crate::common::*;

const NS: &str = "clusters";
const CP_NS: &str = "clusters-hc1";
const IMG1: &str = "quay.io/openshift-release-dev/ocp-release:4.17.0-x86_64";
const IMG2: &str = "quay.io/openshift-release-dev/ocp-release:4.17.1-x86_64";

/// The cluster and its pull secret, ready for more objects
fn seeded(hc: &HostedCluster) -> ClientBuilder {
    api_server()
        .with_object(hc.clone())
        .with_object(pull_secret(NS, "pull-secret"))
}

async fn env_with(hc: &HostedCluster) -> TestEnv {
    TestEnv::from_builder(seeded(hc)).await
}

async fn hosted_cluster(env: &TestEnv) -> Option<HostedCluster> {
    client::get_opt(env.client.as_ref(), Some(NS), "hc1").await.unwrap()
}

async fn control_plane(env: &TestEnv) -> HostedControlPlane {
    client::get_opt(env.client.as_ref(), Some(CP_NS), "hc1")
        .await
        .unwrap()
        .expect("hosted control plane should exist")
}

fn history(hc: &HostedCluster) -> Vec<UpdateHistory> {
    hc.status
        .as_ref()
        .and_then(|s| s.version.as_ref())
        .map(|v| v.history.clone())
        .unwrap_or_default()
}

/// Status as left by a pass that has observed `image` rolling out
fn rolling_out(image: &str) -> HostedClusterStatus {
    HostedClusterStatus {
        version: Some(ClusterVersionStatus {
            desired: Release {
                image: image.to_string(),
            },
            history: vec![UpdateHistory {
                state: UpdateState::Partial,
                started_time: NOW.to_string(),
                image: image.to_string(),
                ..Default::default()
            }],
            observed_generation: 1,
        }),
        ..Default::default()
    }
}

fn completed(image: &str, version: &str) -> HostedClusterStatus {
    let mut status = rolling_out(image);
    if let Some(entry) = status.version.as_mut().and_then(|v| v.history.first_mut()) {
        entry.state = UpdateState::Completed;
        entry.version = version.to_string();
        entry.completion_time = Some(NOW.to_string());
    }
    status
}

mod initial_creation {
    use super::*;

    #[tokio::test]
    async fn test_first_pass_creates_namespace_and_reports_rollout() {
        let hc = HostedClusterBuilder::new("hc1", NS).with_release(IMG1).build();
        let env = env_with(&hc).await;

        let action = reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(action, Action::requeue(RESYNC_INTERVAL));

        let ns: Namespace = client::get_opt(env.client.as_ref(), None, CP_NS)
            .await
            .unwrap()
            .expect("control plane namespace should exist");
        let uid: i64 = ns.annotations()[SECURITY_CONTEXT_UID_ANNOTATION].parse().unwrap();
        assert!((1001..11001).contains(&uid));

        let hc = hosted_cluster(&env).await.unwrap();
        assert!(hc.finalizers().iter().any(|f| f == FINALIZER));

        let history = history(&hc);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, UpdateState::Partial);
        assert_eq!(history[0].image, IMG1);
        assert_eq!(history[0].started_time, NOW);

        let available = find_condition(hc.status_conditions(), condition_types::AVAILABLE).unwrap();
        assert_eq!(available.status, "False");
        assert_eq!(available.reason, condition_reasons::UNAVAILABLE);
        assert_eq!(
            available.message,
            "hosted control plane is unavailable; the hosted control plane kubeconfig is unavailable"
        );
    }

    #[tokio::test]
    async fn test_first_pass_creates_dependents() {
        let hc = HostedClusterBuilder::new("hc1", NS).with_release(IMG1).build();
        let env = env_with(&hc).await;

        reconcile_key(&env.ctx, NS, "hc1").await.unwrap();

        let hcp = control_plane(&env).await;
        assert_eq!(hcp.spec.release_image, IMG1);
        assert_eq!(hcp.spec.pull_secret.name, "pull-secret");
        assert_eq!(hcp.annotations()[HOSTED_CLUSTER_ANNOTATION], "clusters/hc1");

        let mirrored: Secret = client::get_opt(env.client.as_ref(), Some(CP_NS), "pull-secret")
            .await
            .unwrap()
            .expect("pull secret should be mirrored");
        assert!(mirrored.data.unwrap().contains_key(".dockerconfigjson"));

        let cluster = env
            .client
            .get(&capi::cluster_resource(), Some(CP_NS), "hc1")
            .await
            .unwrap()
            .expect("CAPI cluster should exist");
        assert_eq!(cluster.annotations()[HOSTED_CLUSTER_ANNOTATION], "clusters/hc1");

        // No default NodePool without initial replicas
        let pools: Vec<NodePool> = client::list(env.client.as_ref(), Some(NS), &Default::default())
            .await
            .unwrap();
        assert!(pools.is_empty());
    }

    #[tokio::test]
    async fn test_initial_replicas_create_default_node_pool() {
        let hc = HostedClusterBuilder::new("hc1", NS)
            .with_release(IMG1)
            .with_initial_replicas(3)
            .build();
        let env = env_with(&hc).await;

        reconcile_key(&env.ctx, NS, "hc1").await.unwrap();

        let np: NodePool = client::get_opt(env.client.as_ref(), Some(NS), "hc1")
            .await
            .unwrap()
            .expect("default node pool should exist");
        assert_eq!(np.spec.cluster_name, "hc1");
        assert_eq!(np.spec.replicas, Some(3));
    }

    #[tokio::test]
    async fn test_missing_pull_secret_fails_after_status_and_finalizer() {
        let hc = HostedClusterBuilder::new("hc1", NS).with_release(IMG1).build();
        let env = TestEnv::from_builder(api_server().with_object(hc.clone())).await;

        let err = reconcile_key(&env.ctx, NS, "hc1").await.unwrap_err();
        assert!(err.to_string().contains("pull secret"));

        let hc = hosted_cluster(&env).await.unwrap();
        assert_eq!(history(&hc).len(), 1);
        assert!(hc.finalizers().iter().any(|f| f == FINALIZER));
    }

    #[tokio::test]
    async fn test_existing_namespace_uid_is_kept() {
        let hc = HostedClusterBuilder::new("hc1", NS).with_release(IMG1).build();
        let mut ns = Namespace::default();
        ns.metadata.name = Some(CP_NS.to_string());
        ns.annotations_mut()
            .insert(SECURITY_CONTEXT_UID_ANNOTATION.to_string(), "4242".to_string());
        let env = TestEnv::from_builder(seeded(&hc).with_object(ns)).await;

        reconcile_key(&env.ctx, NS, "hc1").await.unwrap();

        let ns: Namespace = client::get_opt(env.client.as_ref(), None, CP_NS)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ns.annotations()[SECURITY_CONTEXT_UID_ANNOTATION], "4242");
        assert!(env.ctx.uid_allocator.allocated().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_hosted_cluster_awaits_change() {
        let env = TestEnv::new().await;
        let action = reconcile_key(&env.ctx, NS, "gone").await.unwrap();
        assert_eq!(action, Action::await_change());
        assert!(env.client.writes().is_empty());
    }
}

mod idempotence {
    use super::*;

    #[tokio::test]
    async fn test_second_pass_changes_nothing() {
        let hc = HostedClusterBuilder::new("hc1", NS).with_release(IMG1).build();
        let env = env_with(&hc).await;

        reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        let before = hosted_cluster(&env).await.unwrap();
        env.client.clear_actions();

        reconcile_key(&env.ctx, NS, "hc1").await.unwrap();

        let after = hosted_cluster(&env).await.unwrap();
        assert_eq!(before.resource_version(), after.resource_version());
        assert_eq!(before.status, after.status);

        let writes = env.client.writes();
        assert!(writes.is_empty(), "unexpected writes: {:?}", writes);
    }
}

mod rollout {
    use super::*;

    #[tokio::test]
    async fn test_rollout_completes_when_control_plane_converges() {
        let hc = HostedClusterBuilder::new("hc1", NS)
            .with_release(IMG1)
            .with_finalizer(FINALIZER)
            .with_status(rolling_out(IMG1))
            .build();
        let hcp = with_kubeconfig(hosted_control_plane(&hc, IMG1, IMG1, "4.17.0", true), "admin-kubeconfig");
        let env = TestEnv::from_builder(
            seeded(&hc)
                .with_object(hcp)
                .with_object(kubeconfig_secret(CP_NS, "admin-kubeconfig")),
        )
        .await;

        reconcile_key(&env.ctx, NS, "hc1").await.unwrap();

        let hc = hosted_cluster(&env).await.unwrap();
        let history = history(&hc);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, UpdateState::Completed);
        assert_eq!(history[0].version, "4.17.0");
        assert_eq!(history[0].completion_time.as_deref(), Some(NOW));

        // The kubeconfig published in this pass makes the cluster available
        let status = hc.status.as_ref().unwrap();
        assert_eq!(
            status.kube_config,
            Some(LocalObjectReference::new("hc1-admin-kubeconfig"))
        );
        let available = find_condition(&status.conditions, condition_types::AVAILABLE).unwrap();
        assert_eq!(available.status, "True");
        assert_eq!(available.reason, condition_reasons::AVAILABLE_AS_EXPECTED);
        assert_eq!(hc.annotations()[HAS_BEEN_AVAILABLE_ANNOTATION], "true");

        let progressing =
            find_condition(&status.conditions, condition_types::CLUSTER_VERSION_PROGRESSING).unwrap();
        assert_eq!(progressing.status, "False");
    }

    #[tokio::test]
    async fn test_control_plane_mid_rollout_keeps_history() {
        let hc = HostedClusterBuilder::new("hc1", NS)
            .with_release(IMG1)
            .with_finalizer(FINALIZER)
            .with_status(rolling_out(IMG1))
            .build();
        let hcp = hosted_control_plane(&hc, IMG1, "", "", false);
        let env = TestEnv::from_builder(seeded(&hc).with_object(hcp)).await;

        reconcile_key(&env.ctx, NS, "hc1").await.unwrap();

        let hc = hosted_cluster(&env).await.unwrap();
        let history = history(&hc);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, UpdateState::Partial);
    }

    #[tokio::test]
    async fn test_new_release_prepends_history_without_bumping_control_plane() {
        let hc = HostedClusterBuilder::new("hc1", NS)
            .with_release(IMG2)
            .with_finalizer(FINALIZER)
            .with_status(completed(IMG1, "4.17.0"))
            .build();
        let hcp = hosted_control_plane(&hc, IMG1, IMG1, "4.17.0", true);
        let env = TestEnv::from_builder(seeded(&hc).with_object(hcp)).await;
        env.clock.advance(chrono::Duration::minutes(10));

        reconcile_key(&env.ctx, NS, "hc1").await.unwrap();

        let hc = hosted_cluster(&env).await.unwrap();
        let version = hc.status.as_ref().unwrap().version.clone().unwrap();
        assert_eq!(version.desired.image, IMG2);
        assert_eq!(version.history.len(), 2);
        assert_eq!(version.history[0].state, UpdateState::Partial);
        assert_eq!(version.history[0].image, IMG2);
        assert_eq!(version.history[0].started_time, timestamp(now() + chrono::Duration::minutes(10)));
        assert_eq!(version.history[1].state, UpdateState::Completed);
        assert_eq!(version.history[1].image, IMG1);

        let progressing =
            find_condition(hc.status_conditions(), condition_types::CLUSTER_VERSION_PROGRESSING).unwrap();
        assert_eq!(progressing.status, "True");
        assert_eq!(progressing.reason, condition_reasons::RELEASE_ROLLING_OUT);

        assert_eq!(control_plane(&env).await.spec.release_image, IMG1);
    }

    #[tokio::test]
    async fn test_completed_history_opens_release_gate() {
        let hc = HostedClusterBuilder::new("hc1", NS)
            .with_release(IMG2)
            .with_finalizer(FINALIZER)
            .with_status(completed(IMG1, "4.17.0"))
            .build();
        let hcp = hosted_control_plane(&hc, IMG1, IMG1, "4.17.0", true);
        let env = TestEnv::from_builder(seeded(&hc).with_object(hcp)).await;

        // First pass records the new release as Partial
        reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(control_plane(&env).await.spec.release_image, IMG1);

        // The control plane still reports IMG1 for both spec and status, so the
        // next pass marks the newest entry Completed and the gate opens
        reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(control_plane(&env).await.spec.release_image, IMG2);
    }

    #[tokio::test]
    async fn test_networking_acknowledgement_is_consumed() {
        let hc = HostedClusterBuilder::new("hc1", NS)
            .with_release(IMG1)
            .with_annotation(ACK_NETWORKING_DISRUPTION_ANNOTATION, "true")
            .build();
        let env = env_with(&hc).await;

        reconcile_key(&env.ctx, NS, "hc1").await.unwrap();

        let hc = hosted_cluster(&env).await.unwrap();
        assert!(!hc.annotations().contains_key(ACK_NETWORKING_DISRUPTION_ANNOTATION));
    }
}

mod pause {
    use super::*;

    fn oadp_paused() -> HostedCluster {
        HostedClusterBuilder::new("hc1", NS)
            .with_release(IMG1)
            .with_finalizer(FINALIZER)
            .with_paused_until("true")
            .with_annotation(OADP_PAUSED_BY_ANNOTATION, OADP_PLUGIN_AUTHOR)
            .with_annotation(OADP_PAUSED_AT_ANNOTATION, NOW)
            .build()
    }

    fn oadp_paused_node_pool(name: &str, cluster: &str) -> NodePool {
        let mut np = node_pool(name, NS, cluster);
        np.spec.paused_until = Some("true".to_string());
        let annotations = np.annotations_mut();
        annotations.insert(OADP_PAUSED_BY_ANNOTATION.to_string(), OADP_PLUGIN_AUTHOR.to_string());
        annotations.insert(OADP_PAUSED_AT_ANNOTATION.to_string(), NOW.to_string());
        np
    }

    async fn node_pool_named(env: &TestEnv, name: &str) -> NodePool {
        client::get_opt(env.client.as_ref(), Some(NS), name)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_completed_backup_resumes_cluster_and_node_pools() {
        let hc = oadp_paused();
        let env = TestEnv::from_builder(
            seeded(&hc)
                .with_object(oadp_paused_node_pool("np1", "hc1"))
                .with_object(oadp_paused_node_pool("np-other", "other")),
        )
        .await;
        env.client
            .seed_dynamic(&velero_backup_resource(), &velero_backup("hc1-backup", "Completed", now()))
            .await
            .unwrap();

        let action = reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(action, Action::requeue(Duration::ZERO));

        let hc = hosted_cluster(&env).await.unwrap();
        assert!(!hc.annotations().contains_key(OADP_PAUSED_BY_ANNOTATION));
        assert!(!hc.annotations().contains_key(OADP_PAUSED_AT_ANNOTATION));
        assert_eq!(hc.spec.paused_until, None);

        let np = node_pool_named(&env, "np1").await;
        assert!(!np.annotations().contains_key(OADP_PAUSED_BY_ANNOTATION));
        assert!(!np.annotations().contains_key(OADP_PAUSED_AT_ANNOTATION));
        assert_eq!(np.spec.paused_until, None);

        let other = node_pool_named(&env, "np-other").await;
        assert_eq!(other.spec.paused_until.as_deref(), Some("true"));
        assert!(other.annotations().contains_key(OADP_PAUSED_BY_ANNOTATION));
    }

    #[tokio::test]
    async fn test_in_progress_backup_keeps_cluster_paused() {
        let hc = oadp_paused();
        let env = env_with(&hc).await;
        env.client
            .seed_dynamic(&velero_backup_resource(), &velero_backup("hc1-backup", "InProgress", now()))
            .await
            .unwrap();

        let action = reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(action, Action::requeue(PAUSED_REQUEUE));
        assert_eq!(PAUSED_REQUEUE, Duration::from_secs(30));

        let hc = hosted_cluster(&env).await.unwrap();
        assert_eq!(hc.annotations()[OADP_PAUSED_BY_ANNOTATION], OADP_PLUGIN_AUTHOR);
        assert_eq!(hc.annotations()[OADP_PAUSED_AT_ANNOTATION], NOW);
        assert_eq!(hc.spec.paused_until.as_deref(), Some("true"));

        let paused = find_condition(hc.status_conditions(), condition_types::RECONCILIATION_PAUSED).unwrap();
        assert_eq!(paused.status, "True");
    }

    #[tokio::test]
    async fn test_newest_related_backup_decides() {
        let hc = oadp_paused();
        let env = env_with(&hc).await;
        let resource = velero_backup_resource();
        env.client
            .seed_dynamic(&resource, &velero_backup("hc1-old", "Completed", now() - chrono::Duration::hours(1)))
            .await
            .unwrap();
        env.client
            .seed_dynamic(&resource, &velero_backup("hc1-new", "InProgress", now()))
            .await
            .unwrap();
        env.client
            .seed_dynamic(&resource, &velero_backup("unrelated", "Completed", now()))
            .await
            .unwrap();

        let action = reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(action, Action::requeue(PAUSED_REQUEUE));
    }

    #[tokio::test]
    async fn test_no_related_backup_resumes() {
        let hc = oadp_paused();
        let env = env_with(&hc).await;

        let action = reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(action, Action::requeue(Duration::ZERO));
        assert_eq!(hosted_cluster(&env).await.unwrap().spec.paused_until, None);
    }

    #[tokio::test]
    async fn test_user_pause_until_time_requeues_for_remainder() {
        let until = now() + chrono::Duration::hours(1);
        let hc = HostedClusterBuilder::new("hc1", NS)
            .with_release(IMG1)
            .with_paused_until(&timestamp(until))
            .build();
        let env = env_with(&hc).await;

        let action = reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(3600)));

        let hc = hosted_cluster(&env).await.unwrap();
        let paused = find_condition(hc.status_conditions(), condition_types::RECONCILIATION_PAUSED).unwrap();
        assert_eq!(paused.status, "True");
        assert!(paused.message.contains(&timestamp(until)));

        // Paused clusters get no dependents
        assert!(
            client::get_opt::<Namespace, _>(env.client.as_ref(), None, CP_NS)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_elapsed_pause_reconciles_normally() {
        let hc = HostedClusterBuilder::new("hc1", NS)
            .with_release(IMG1)
            .with_paused_until(&timestamp(now() - chrono::Duration::minutes(1)))
            .build();
        let env = env_with(&hc).await;

        let action = reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(action, Action::requeue(RESYNC_INTERVAL));

        let hc = hosted_cluster(&env).await.unwrap();
        let paused = find_condition(hc.status_conditions(), condition_types::RECONCILIATION_PAUSED).unwrap();
        assert_eq!(paused.status, "False");
    }
}

mod deletion {
    use super::*;

    fn capi_cluster_object(name: &str) -> DynamicObject {
        DynamicObject::new(name, &capi::cluster_resource()).within(CP_NS)
    }

    fn deleting_cluster() -> HostedCluster {
        HostedClusterBuilder::new("hc1", NS)
            .with_release(IMG1)
            .with_infra_id("inf1")
            .with_finalizer(FINALIZER)
            .deleting_since(now())
            .build()
    }

    fn control_plane_namespace() -> Namespace {
        let mut ns = Namespace::default();
        ns.metadata.name = Some(CP_NS.to_string());
        ns
    }

    #[tokio::test]
    async fn test_deletion_cascade() {
        let env = TestEnv::from_builder(
            seeded(&deleting_cluster())
                .with_object(control_plane_namespace())
                .with_object(node_pool("np1", NS, "hc1"))
                .with_object(node_pool("np-other", NS, "other")),
        )
        .await;
        env.client
            .seed_dynamic(&capi::cluster_resource(), &capi_cluster_object("inf1"))
            .await
            .unwrap();

        // Pass 1: node pools and the CAPI cluster go first
        let action = reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(action, Action::requeue(DELETION_REQUEUE));
        assert_eq!(DELETION_REQUEUE, Duration::from_secs(5));

        let pools: Vec<NodePool> = client::list(env.client.as_ref(), Some(NS), &Default::default())
            .await
            .unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].name_any(), "np-other");
        assert!(
            env.client
                .get(&capi::cluster_resource(), Some(CP_NS), "inf1")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            client::get_opt::<Namespace, _>(env.client.as_ref(), None, CP_NS)
                .await
                .unwrap()
                .is_some()
        );
        assert!(hosted_cluster(&env).await.is_some());

        // Pass 2: the cluster is gone, so the namespace and finalizer follow
        let action = reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(action, Action::await_change());
        assert!(
            client::get_opt::<Namespace, _>(env.client.as_ref(), None, CP_NS)
                .await
                .unwrap()
                .is_none()
        );
        assert!(hosted_cluster(&env).await.is_none());
    }

    #[tokio::test]
    async fn test_skip_namespace_deletion_annotation() {
        let mut hc = deleting_cluster();
        hc.annotations_mut().insert(
            SKIP_DELETE_CONTROL_PLANE_NAMESPACE_ANNOTATION.to_string(),
            "true".to_string(),
        );
        let env = TestEnv::from_builder(seeded(&hc).with_object(control_plane_namespace())).await;

        let action = reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(action, Action::await_change());
        assert!(
            client::get_opt::<Namespace, _>(env.client.as_ref(), None, CP_NS)
                .await
                .unwrap()
                .is_some()
        );
        assert!(hosted_cluster(&env).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_finalizer_removal_conflicts() {
        let env = env_with(&deleting_cluster()).await;
        env.client.fail_on(Verb::Patch, "HostedCluster", 409);

        let err = reconcile_key(&env.ctx, NS, "hc1").await.unwrap_err();
        assert!(err.is_conflict());
        assert!(hosted_cluster(&env).await.is_some());
    }
}

mod conflicts {
    use super::*;

    #[tokio::test]
    async fn test_status_conflict_requeues_immediately() {
        let hc = HostedClusterBuilder::new("hc1", NS).with_release(IMG1).build();
        let env = env_with(&hc).await;
        env.client.fail_on(Verb::UpdateStatus, "HostedCluster", 409);

        let action = reconcile_key(&env.ctx, NS, "hc1").await.unwrap();
        assert_eq!(action, Action::requeue(Duration::ZERO));

        // Nothing else was written
        assert!(
            client::get_opt::<Namespace, _>(env.client.as_ref(), None, CP_NS)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_transient_error_surfaces() {
        let hc = HostedClusterBuilder::new("hc1", NS).with_release(IMG1).build();
        let env = env_with(&hc).await;
        env.client.fail_on(Verb::Create, "HostedControlPlane", 503);

        let err = reconcile_key(&env.ctx, NS, "hc1").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
