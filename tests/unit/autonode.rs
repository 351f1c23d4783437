//! Karpenter user data and the autoprovision NodePool

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::ResourceExt;

use hypershift_operator::client;
use hypershift_operator::config::OperatorConfig;
use hypershift_operator::controller::Context;
use hypershift_operator::controller::autoprovision::reconcile_autoprovision;
use hypershift_operator::controller::karpenter::{
    KARPENTER_PROVISIONER, KARPENTER_TAINTS_CONFIG_MAP, KARPENTER_USER_DATA_SECRET,
    reconcile_karpenter,
};
use hypershift_operator::crd::{AutoNode, HostedCluster, NodePool, PlatformType, ProvisionerConfig};
use hypershift_operator::release::{HAPROXY_ROUTER_COMPONENT, ReleaseImage, StaticReleaseProvider};
use hypershift_operator::resources::common::{HOSTED_CLUSTER_ANNOTATION, KARPENTER_CONFIG_VERSION_ANNOTATION};

use kube_fake_client::ClientBuilder;

use crate::common::*;

const NS: &str = "clusters";
const CP_NS: &str = "clusters-hc1";

struct Env {
    client: Arc<RecordingClient>,
    ctx: Arc<Context>,
}

async fn env(builder: ClientBuilder, config: OperatorConfig) -> Env {
    let releases = StaticReleaseProvider::new(DEFAULT_RELEASE).with_release(ReleaseImage {
        image: DEFAULT_RELEASE.to_string(),
        version: "4.17.0".to_string(),
        component_images: BTreeMap::from([(
            HAPROXY_ROUTER_COMPONENT.to_string(),
            "quay.io/ocp/haproxy-router@sha256:abcd".to_string(),
        )]),
    });
    let TestEnv { client, ctx, .. } = TestEnv::with_releases(builder, config, releases).await;
    Env {
        client,
        ctx: Arc::new(ctx),
    }
}

async fn stored_cluster(env: &Env) -> Arc<HostedCluster> {
    let hc = client::get_opt(env.client.as_ref(), Some(NS), "hc1")
        .await
        .unwrap()
        .expect("hosted cluster should exist");
    Arc::new(hc)
}

mod karpenter {
    use super::*;

    fn config() -> OperatorConfig {
        OperatorConfig {
            enable_karpenter: true,
            ..Default::default()
        }
    }

    fn auto_node_cluster() -> HostedCluster {
        let mut hc = HostedClusterBuilder::new("hc1", NS)
            .with_platform(PlatformType::Aws)
            .build();
        hc.spec.auto_node = Some(AutoNode {
            provisioner: ProvisionerConfig {
                name: KARPENTER_PROVISIONER.to_string(),
                karpenter: None,
            },
        });
        hc
    }

    async fn seeded(hc: &HostedCluster) -> Env {
        let builder = api_server()
            .with_object(hc.clone())
            .with_object(hosted_control_plane(hc, DEFAULT_RELEASE, DEFAULT_RELEASE, "4.17.0", true))
            .with_object(pull_secret(CP_NS, "pull-secret"));
        env(builder, config()).await
    }

    async fn user_data(env: &Env) -> Vec<u8> {
        let secret: Secret = client::get_opt(env.client.as_ref(), Some(CP_NS), KARPENTER_USER_DATA_SECRET)
            .await
            .unwrap()
            .expect("user data secret should exist");
        secret.data.unwrap()["value"].0.clone()
    }

    #[tokio::test]
    async fn test_renders_user_data_and_stamps_config_version() {
        let env = seeded(&auto_node_cluster()).await;

        reconcile_karpenter(stored_cluster(&env).await, env.ctx.clone())
            .await
            .unwrap();

        let cm: ConfigMap = client::get_opt(env.client.as_ref(), Some(CP_NS), KARPENTER_TAINTS_CONFIG_MAP)
            .await
            .unwrap()
            .expect("kubelet config map should exist");
        assert!(cm.data.as_ref().unwrap()["config"].contains("karpenter.sh/unregistered"));
        assert_eq!(cm.annotations()[HOSTED_CLUSTER_ANNOTATION], "clusters/hc1");

        let value: serde_json::Value = serde_json::from_slice(&user_data(&env).await).unwrap();
        let headers = &value["ignition"]["config"]["merge"][0]["httpHeaders"];
        assert_eq!(headers[1]["value"], "clusters-hc1/karpenter");

        let hc = stored_cluster(&env).await;
        let version = &hc.annotations()[KARPENTER_CONFIG_VERSION_ANNOTATION];
        assert_eq!(version.len(), 64);
        assert_eq!(headers[2]["value"], version[..8]);
    }

    #[tokio::test]
    async fn test_second_pass_reuses_token_and_skips_patch() {
        let env = seeded(&auto_node_cluster()).await;
        reconcile_karpenter(stored_cluster(&env).await, env.ctx.clone())
            .await
            .unwrap();
        let first = user_data(&env).await;
        let version = stored_cluster(&env).await.resource_version();

        env.client.clear_actions();
        reconcile_karpenter(stored_cluster(&env).await, env.ctx.clone())
            .await
            .unwrap();

        assert_eq!(user_data(&env).await, first);
        assert_eq!(stored_cluster(&env).await.resource_version(), version);
        assert!(
            !env.client
                .actions()
                .iter()
                .any(|a| a.verb == Verb::Patch && a.kind == "HostedCluster")
        );
    }

    #[tokio::test]
    async fn test_stale_cluster_patch_conflicts() {
        let env = seeded(&auto_node_cluster()).await;
        let stale = stored_cluster(&env).await;

        // Someone else writes the HostedCluster in between
        let mut moved = (*stale).clone();
        moved.annotations_mut().insert("example.com/touched".to_string(), "yes".to_string());
        client::update(env.client.as_ref(), &moved).await.unwrap();

        let err = reconcile_karpenter(stale, env.ctx.clone()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_waits_for_control_plane() {
        let env = env(api_server().with_object(auto_node_cluster()), config()).await;

        reconcile_karpenter(stored_cluster(&env).await, env.ctx.clone())
            .await
            .unwrap();

        assert!(env.client.writes().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_operator_ignores_auto_node() {
        let hc = auto_node_cluster();
        let builder = api_server()
            .with_object(hc.clone())
            .with_object(hosted_control_plane(&hc, DEFAULT_RELEASE, DEFAULT_RELEASE, "4.17.0", true));
        let env = env(builder, OperatorConfig::default()).await;

        reconcile_karpenter(stored_cluster(&env).await, env.ctx.clone())
            .await
            .unwrap();

        assert!(env.client.writes().is_empty());
    }
}

mod autoprovision {
    use super::*;

    fn config() -> OperatorConfig {
        OperatorConfig {
            enable_autoprovision: true,
            ..Default::default()
        }
    }

    async fn shim(env: &Env) -> Option<NodePool> {
        client::get_opt(env.client.as_ref(), Some(NS), "hc1-autoprovision")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_aws_cluster_gets_zero_replica_node_pool() {
        let hc = HostedClusterBuilder::new("hc1", NS).with_platform(PlatformType::Aws).build();
        let env = env(api_server().with_object(hc), config()).await;

        reconcile_autoprovision(stored_cluster(&env).await, env.ctx.clone())
            .await
            .unwrap();

        let np = shim(&env).await.expect("autoprovision node pool should exist");
        assert_eq!(np.spec.replicas, Some(0));
        assert_eq!(np.spec.cluster_name, "hc1");
        assert_eq!(np.spec.platform.type_, PlatformType::Aws);
        assert_eq!(np.owner_references()[0].name, "hc1");
    }

    #[tokio::test]
    async fn test_scaled_node_pool_is_left_alone() {
        let hc = HostedClusterBuilder::new("hc1", NS).with_platform(PlatformType::Aws).build();
        let env = env(api_server().with_object(hc), config()).await;
        reconcile_autoprovision(stored_cluster(&env).await, env.ctx.clone())
            .await
            .unwrap();

        let mut np = shim(&env).await.unwrap();
        np.spec.replicas = Some(5);
        client::update(env.client.as_ref(), &np).await.unwrap();

        reconcile_autoprovision(stored_cluster(&env).await, env.ctx.clone())
            .await
            .unwrap();
        assert_eq!(shim(&env).await.unwrap().spec.replicas, Some(5));
    }

    #[tokio::test]
    async fn test_other_platforms_are_skipped() {
        let hc = HostedClusterBuilder::new("hc1", NS).with_platform(PlatformType::KubeVirt).build();
        let env = env(api_server().with_object(hc), config()).await;

        reconcile_autoprovision(stored_cluster(&env).await, env.ctx.clone())
            .await
            .unwrap();
        assert!(shim(&env).await.is_none());
    }
}
