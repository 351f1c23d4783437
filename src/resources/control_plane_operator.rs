//! Control plane operator operand

use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::ResourceExt;

use crate::config::OperatorConfig;
use crate::crd::HostedCluster;

use super::mirror::PROVIDER_CREDS;
use super::operand::{ALL_VERBS, OperandSpec, env, rule};

pub const CONTROL_PLANE_OPERATOR_NAME: &str = "control-plane-operator";

pub fn operand_spec(
    config: &OperatorConfig,
    hc: &HostedCluster,
    namespace: &str,
    uid: Option<i64>,
) -> OperandSpec {
    let mut env_vars = vec![
        env("MY_NAMESPACE", namespace),
        env("HOSTED_CLUSTER_NAME", hc.name_any()),
        env("OPERATE_ON_RELEASE_IMAGE", hc.control_plane_release_image()),
    ];
    let mut secret_mounts = Vec::new();
    if hc.spec.provider_creds.is_some() {
        env_vars.push(env("PROVIDER_CREDS_FILE", "/etc/provider/credentials"));
        secret_mounts.push((
            PROVIDER_CREDS.target_name.to_string(),
            "/etc/provider".to_string(),
        ));
    }

    OperandSpec {
        name: CONTROL_PLANE_OPERATOR_NAME.to_string(),
        namespace: namespace.to_string(),
        cluster_name: hc.name_any(),
        image: config.control_plane_operator_image.clone(),
        command: vec!["/usr/bin/control-plane-operator".to_string()],
        args: vec![
            "run".to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--deployment-name".to_string(),
            CONTROL_PLANE_OPERATOR_NAME.to_string(),
        ],
        env: env_vars,
        secret_mounts,
        run_as_user: uid,
        replicas: 1,
    }
}

pub fn rules() -> Vec<PolicyRule> {
    vec![
        rule("hypershift.openshift.io", &["*"], ALL_VERBS),
        rule("cluster.x-k8s.io", &["*"], ALL_VERBS),
        rule(
            "",
            &["events", "configmaps", "pods", "secrets", "services", "serviceaccounts", "endpoints"],
            ALL_VERBS,
        ),
        rule("apps", &["deployments", "statefulsets", "replicasets"], ALL_VERBS),
        rule("rbac.authorization.k8s.io", &["roles", "rolebindings"], ALL_VERBS),
        rule("policy", &["poddisruptionbudgets"], ALL_VERBS),
        rule("coordination.k8s.io", &["leases"], ALL_VERBS),
    ]
}
