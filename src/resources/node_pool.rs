//! NodePools created on behalf of a HostedCluster

use kube::ResourceExt;
use kube::api::ObjectMeta;

use crate::crd::{
    HostedCluster, LocalObjectReference, NodePool, NodePoolPlatform, NodePoolSpec, PlatformType,
};

use super::common::standard_labels;

fn base(hc: &HostedCluster, name: &str, platform: PlatformType) -> NodePool {
    NodePool {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: hc.namespace(),
            labels: Some(standard_labels(&hc.name_any())),
            ..Default::default()
        },
        spec: NodePoolSpec {
            cluster_name: hc.name_any(),
            release: hc.spec.release.clone(),
            platform: NodePoolPlatform {
                type_: platform,
                aws: None,
            },
            replicas: None,
            management: Default::default(),
            config: Vec::new(),
            paused_until: None,
            arch: "amd64".to_string(),
        },
        status: None,
    }
}

/// NodePool sized by `spec.initialComputeReplicas`, named after the cluster
pub fn default_node_pool(hc: &HostedCluster) -> NodePool {
    let mut np = base(hc, &hc.name_any(), hc.spec.platform.type_);
    np.spec.replicas = Some(hc.spec.initial_compute_replicas);
    np
}

/// Name of the autoprovision shim NodePool
pub fn autoprovision_node_pool_name(hc: &HostedCluster) -> String {
    format!("{}-autoprovision", hc.name_any())
}

/// Zero-replica AWS NodePool standing in for autoprovisioned capacity
pub fn autoprovision_node_pool(hc: &HostedCluster) -> NodePool {
    let mut np = base(hc, &autoprovision_node_pool_name(hc), PlatformType::Aws);
    np.spec.replicas = Some(0);
    np
}

/// In-memory NodePool from which Karpenter user data is generated
pub fn karpenter_node_pool(
    hc: &HostedCluster,
    namespace: &str,
    release_image: &str,
    config_map: &str,
) -> NodePool {
    let mut np = base(hc, "karpenter", PlatformType::Aws);
    np.metadata.namespace = Some(namespace.to_string());
    np.spec.release.image = release_image.to_string();
    np.spec.replicas = Some(0);
    np.spec.config = vec![LocalObjectReference::new(config_map)];
    np
}
