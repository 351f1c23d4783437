//! Cluster autoscaler operand
//!
//! The autoscaler talks to the guest API server, so it can only be deployed
//! once the control plane has published a kubeconfig.

use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::ResourceExt;

use crate::config::OperatorConfig;
use crate::crd::HostedCluster;

use super::common::{DISABLE_CLUSTER_AUTOSCALER_ANNOTATION, annotation};
use super::operand::{OperandSpec, rule};

pub const AUTOSCALER_NAME: &str = "cluster-autoscaler";

const KUBECONFIG_MOUNT: &str = "/etc/kubernetes";

pub fn is_disabled(hc: &HostedCluster) -> bool {
    annotation(&hc.metadata, DISABLE_CLUSTER_AUTOSCALER_ANNOTATION).is_some()
}

/// `kubeconfig_secret` is the control plane's service-network kubeconfig
pub fn operand_spec(
    config: &OperatorConfig,
    hc: &HostedCluster,
    namespace: &str,
    kubeconfig_secret: &str,
    uid: Option<i64>,
) -> OperandSpec {
    OperandSpec {
        name: AUTOSCALER_NAME.to_string(),
        namespace: namespace.to_string(),
        cluster_name: hc.name_any(),
        image: config.autoscaler_image.clone(),
        command: vec!["/usr/bin/cluster-autoscaler".to_string()],
        args: vec![
            "--cloud-provider=clusterapi".to_string(),
            format!("--node-group-auto-discovery=clusterapi:namespace={}", namespace),
            format!("--kubeconfig={}/kubeconfig", KUBECONFIG_MOUNT),
            "--clusterapi-cloud-config-authoritative".to_string(),
            "--skip-nodes-with-local-storage=false".to_string(),
            "--alsologtostderr".to_string(),
            "--v=4".to_string(),
        ],
        secret_mounts: vec![(kubeconfig_secret.to_string(), KUBECONFIG_MOUNT.to_string())],
        run_as_user: uid,
        replicas: 1,
        ..Default::default()
    }
}

pub fn rules() -> Vec<PolicyRule> {
    vec![
        rule(
            "cluster.x-k8s.io",
            &["machinedeployments", "machinedeployments/scale", "machines", "machinesets", "machinesets/scale"],
            &["get", "list", "watch", "update", "patch"],
        ),
        rule("infrastructure.cluster.x-k8s.io", &["*"], &["get", "list", "watch"]),
        rule("", &["configmaps", "events"], &["get", "list", "watch", "create", "update", "patch"]),
    ]
}
