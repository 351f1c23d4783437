use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::hosted_cluster::{
    AutoNode, ClusterConfiguration, ClusterNetworking, Condition, DnsSpec, LocalObjectReference,
    PlatformSpec, SecretEncryptionSpec, ServicePublishingStrategyMapping,
};

/// HostedControlPlane is the per-cluster object consumed by the control plane operator.
///
/// It lives in the control plane namespace and carries the subset of the
/// HostedCluster spec the control plane needs, with secret names resolved to
/// their mirrored copies.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "hypershift.openshift.io",
    version = "v1beta1",
    kind = "HostedControlPlane",
    plural = "hostedcontrolplanes",
    shortname = "hcp",
    namespaced,
    status = "HostedControlPlaneStatus",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct HostedControlPlaneSpec {
    pub release_image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_release_image: Option<String>,

    #[serde(default, rename = "clusterID", skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,

    #[serde(default, rename = "infraID", skip_serializing_if = "String::is_empty")]
    pub infra_id: String,

    pub platform: PlatformSpec,

    #[serde(default)]
    pub dns: DnsSpec,

    pub networking: ClusterNetworking,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServicePublishingStrategyMapping>,

    pub pull_secret: LocalObjectReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_creds: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_trust_bundle: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_until: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ClusterConfiguration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_encryption: Option<SecretEncryptionSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_node: Option<AutoNode>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostedControlPlaneStatus {
    #[serde(default)]
    pub ready: bool,

    /// Release image the control plane is currently running
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release_image: String,

    /// Version string of `release_image`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// RFC3339 time at which `release_image` last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_release_image_transition_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<KubeconfigSecretRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Secret and key holding the admin kubeconfig in the control plane namespace
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct KubeconfigSecretRef {
    pub name: String,
    pub key: String,
}

impl HostedControlPlane {
    /// Whether the control plane has converged on the release it was asked to run
    pub fn rollout_complete(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.release_image == self.spec.release_image)
    }

    pub fn is_available(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.conditions
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        })
    }
}
