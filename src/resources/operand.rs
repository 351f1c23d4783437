//! Shared shapes for operator-managed operands in the control plane namespace
//!
//! Each operand is a Deployment running under its own ServiceAccount, bound
//! to a namespaced Role.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSecurityContext, PodSpec, PodTemplateSpec, SecretVolumeSource,
    ServiceAccount, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;

use super::common::standard_labels;

/// Inputs for an operand Deployment
#[derive(Clone, Debug, Default)]
pub struct OperandSpec {
    pub name: String,
    pub namespace: String,
    pub cluster_name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: Vec<EnvVar>,
    /// Secrets mounted read-only, as `(secret name, mount path)`
    pub secret_mounts: Vec<(String, String)>,
    /// Security-context UID of the control plane namespace
    pub run_as_user: Option<i64>,
    pub replicas: i32,
}

fn operand_labels(spec: &OperandSpec) -> BTreeMap<String, String> {
    let mut labels = standard_labels(&spec.cluster_name);
    labels.insert("app".to_string(), spec.name.clone());
    labels
}

fn meta(spec: &OperandSpec) -> ObjectMeta {
    ObjectMeta {
        name: Some(spec.name.clone()),
        namespace: Some(spec.namespace.clone()),
        labels: Some(operand_labels(spec)),
        ..Default::default()
    }
}

pub fn service_account(spec: &OperandSpec) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(spec),
        ..Default::default()
    }
}

pub fn role(spec: &OperandSpec, rules: Vec<PolicyRule>) -> Role {
    Role {
        metadata: meta(spec),
        rules: Some(rules),
    }
}

pub fn role_binding(spec: &OperandSpec) -> RoleBinding {
    RoleBinding {
        metadata: meta(spec),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: spec.name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: spec.name.clone(),
            namespace: Some(spec.namespace.clone()),
            ..Default::default()
        }]),
    }
}

/// Policy rule granting `verbs` on `resources` in `api_group`
pub fn rule(api_group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

pub const ALL_VERBS: &[&str] = &[
    "get", "list", "watch", "create", "update", "patch", "delete",
];

pub fn deployment(spec: &OperandSpec) -> Deployment {
    let labels = operand_labels(spec);
    let selector = BTreeMap::from([("app".to_string(), spec.name.clone())]);

    let volumes: Vec<Volume> = spec
        .secret_mounts
        .iter()
        .map(|(secret, _)| Volume {
            name: secret.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.clone()),
                default_mode: Some(0o640),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();
    let volume_mounts: Vec<VolumeMount> = spec
        .secret_mounts
        .iter()
        .map(|(secret, path)| VolumeMount {
            name: secret.clone(),
            mount_path: path.clone(),
            read_only: Some(true),
            ..Default::default()
        })
        .collect();

    Deployment {
        metadata: meta(spec),
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(spec.name.clone()),
                    security_context: spec.run_as_user.map(|uid| PodSecurityContext {
                        run_as_user: Some(uid),
                        run_as_non_root: Some(true),
                        ..Default::default()
                    }),
                    containers: vec![Container {
                        name: spec.name.clone(),
                        image: Some(spec.image.clone()),
                        command: (!spec.command.is_empty()).then(|| spec.command.clone()),
                        args: (!spec.args.is_empty()).then(|| spec.args.clone()),
                        env: (!spec.env.is_empty()).then(|| spec.env.clone()),
                        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
                        ..Default::default()
                    }],
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}
