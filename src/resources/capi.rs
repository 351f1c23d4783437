//! Cluster API objects and operands
//!
//! The CAPI `Cluster` and its infrastructure cluster are unstructured; the
//! CAPI CRDs are owned by another project and only a handful of fields are
//! set here.

use kube::ResourceExt;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::json;

use crate::config::OperatorConfig;
use crate::crd::{HostedCluster, PlatformType};

use super::mirror::PROVIDER_CREDS;
use super::operand::{ALL_VERBS, OperandSpec, env, rule};
use k8s_openapi::api::rbac::v1::PolicyRule;

pub const CAPI_MANAGER_NAME: &str = "cluster-api";
pub const CAPI_PROVIDER_NAME: &str = "capi-provider";

const CAPI_GROUP: &str = "cluster.x-k8s.io";
const INFRASTRUCTURE_GROUP: &str = "infrastructure.cluster.x-k8s.io";

pub fn cluster_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(CAPI_GROUP, "v1beta1", "Cluster"))
}

/// Infrastructure cluster kind for the HostedCluster's platform
pub fn infra_cluster_resource(platform: PlatformType) -> ApiResource {
    match platform {
        PlatformType::Aws => ApiResource::from_gvk(&GroupVersionKind::gvk(
            INFRASTRUCTURE_GROUP,
            "v1beta2",
            "AWSCluster",
        )),
        _ => ApiResource::from_gvk(&GroupVersionKind::gvk(
            INFRASTRUCTURE_GROUP,
            "v1beta1",
            "ExternalInfraCluster",
        )),
    }
}

/// CAPI cluster name: the infra ID, or the HostedCluster name until one is set
pub fn cluster_name(hc: &HostedCluster) -> String {
    if hc.spec.infra_id.is_empty() {
        hc.name_any()
    } else {
        hc.spec.infra_id.clone()
    }
}

pub fn infra_cluster(hc: &HostedCluster, namespace: &str) -> (ApiResource, DynamicObject) {
    let resource = infra_cluster_resource(hc.spec.platform.type_);
    let mut obj = DynamicObject::new(&cluster_name(hc), &resource).within(namespace);

    obj.data = match hc.spec.platform.aws.as_ref() {
        Some(aws) if hc.spec.platform.type_ == PlatformType::Aws => json!({
            "spec": {
                "region": aws.region,
                "controlPlaneEndpoint": {"host": "", "port": 0},
            }
        }),
        _ => json!({
            "spec": {
                "controlPlaneEndpoint": {"host": "", "port": 0},
            }
        }),
    };
    (resource, obj)
}

pub fn capi_cluster(hc: &HostedCluster, namespace: &str) -> DynamicObject {
    let resource = cluster_resource();
    let infra = infra_cluster_resource(hc.spec.platform.type_);
    let mut obj = DynamicObject::new(&cluster_name(hc), &resource).within(namespace);
    obj.data = json!({
        "spec": {
            "controlPlaneRef": {
                "apiVersion": "hypershift.openshift.io/v1beta1",
                "kind": "HostedControlPlane",
                "namespace": namespace,
                "name": hc.name_any(),
            },
            "infrastructureRef": {
                "apiVersion": infra.api_version,
                "kind": infra.kind,
                "namespace": namespace,
                "name": cluster_name(hc),
            },
        }
    });
    obj
}

pub fn manager_spec(config: &OperatorConfig, hc: &HostedCluster, namespace: &str, uid: Option<i64>) -> OperandSpec {
    OperandSpec {
        name: CAPI_MANAGER_NAME.to_string(),
        namespace: namespace.to_string(),
        cluster_name: hc.name_any(),
        image: config.capi_manager_image.clone(),
        command: vec!["/bin/cluster-api-controller-manager".to_string()],
        args: vec![
            "--namespace".to_string(),
            namespace.to_string(),
            "--alsologtostderr".to_string(),
            "--v=4".to_string(),
            "--leader-elect=true".to_string(),
        ],
        run_as_user: uid,
        replicas: 1,
        ..Default::default()
    }
}

pub fn manager_rules() -> Vec<PolicyRule> {
    vec![
        rule(CAPI_GROUP, &["*"], ALL_VERBS),
        rule(INFRASTRUCTURE_GROUP, &["*"], ALL_VERBS),
        rule("hypershift.openshift.io", &["hostedcontrolplanes", "hostedcontrolplanes/status"], ALL_VERBS),
        rule("", &["secrets", "configmaps", "events"], ALL_VERBS),
        rule("coordination.k8s.io", &["leases"], ALL_VERBS),
    ]
}

/// The AWS provider only runs for AWS HostedClusters
pub fn provider_spec(
    config: &OperatorConfig,
    hc: &HostedCluster,
    namespace: &str,
    uid: Option<i64>,
) -> Option<OperandSpec> {
    if hc.spec.platform.type_ != PlatformType::Aws {
        return None;
    }
    let has_creds = hc.spec.provider_creds.is_some();
    Some(OperandSpec {
        name: CAPI_PROVIDER_NAME.to_string(),
        namespace: namespace.to_string(),
        cluster_name: hc.name_any(),
        image: config.capi_provider_aws_image.clone(),
        command: vec!["/manager".to_string()],
        args: vec![
            "--namespace".to_string(),
            namespace.to_string(),
            "--alsologtostderr".to_string(),
            "--v=4".to_string(),
            "--leader-elect=true".to_string(),
        ],
        env: if has_creds {
            vec![env("AWS_SHARED_CREDENTIALS_FILE", "/home/.aws/credentials")]
        } else {
            Vec::new()
        },
        secret_mounts: if has_creds {
            vec![(PROVIDER_CREDS.target_name.to_string(), "/home/.aws".to_string())]
        } else {
            Vec::new()
        },
        run_as_user: uid,
        replicas: 1,
        ..Default::default()
    })
}

pub fn provider_rules() -> Vec<PolicyRule> {
    vec![
        rule(CAPI_GROUP, &["clusters", "machines", "machinesets", "machinedeployments"], &["get", "list", "watch"]),
        rule(INFRASTRUCTURE_GROUP, &["*"], ALL_VERBS),
        rule("", &["secrets", "events"], ALL_VERBS),
        rule("coordination.k8s.io", &["leases"], ALL_VERBS),
    ]
}
