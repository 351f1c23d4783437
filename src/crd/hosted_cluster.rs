use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// HostedCluster is the Schema for the hostedclusters API
///
/// A HostedCluster describes an OpenShift cluster whose control plane runs as
/// workloads in the management cluster and whose nodes live elsewhere.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "hypershift.openshift.io",
    version = "v1beta1",
    kind = "HostedCluster",
    plural = "hostedclusters",
    shortname = "hc",
    namespaced,
    status = "HostedClusterStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.version.history[?(@.state==\"Completed\")].version"}"#,
    printcolumn = r#"{"name":"KubeConfig", "type":"string", "jsonPath":".status.kubeConfig.name"}"#,
    printcolumn = r#"{"name":"Available", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HostedClusterSpec {
    /// Release image the control plane and nodes should run
    pub release: Release,

    /// Release image for the control plane only, when it differs from `release`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_release: Option<Release>,

    /// Unique cluster identifier, set once
    #[serde(default, rename = "clusterID", skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,

    /// Infrastructure identifier used to tag cloud resources, set once
    #[serde(default, rename = "infraID", skip_serializing_if = "String::is_empty")]
    pub infra_id: String,

    pub platform: PlatformSpec,

    #[serde(default)]
    pub dns: DnsSpec,

    pub networking: ClusterNetworking,

    /// How each control plane service is exposed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServicePublishingStrategyMapping>,

    /// Secret holding the `.dockerconfigjson` pull secret
    pub pull_secret: LocalObjectReference,

    /// Secret holding the `id_rsa.pub` SSH key for nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<LocalObjectReference>,

    /// Secret holding cloud provider `credentials`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_creds: Option<LocalObjectReference>,

    /// Replica count for the default NodePool; zero means no default NodePool
    #[serde(default)]
    pub initial_compute_replicas: i32,

    /// Either `"true"` or an RFC3339 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_until: Option<String>,

    /// ConfigMap holding a `ca-bundle.crt` trusted by the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_trust_bundle: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ClusterConfiguration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_encryption: Option<SecretEncryptionSpec>,

    /// Node autoprovisioning through Karpenter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_node: Option<AutoNode>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Pull spec of the OpenShift release payload
    #[serde(default)]
    pub image: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
pub struct LocalObjectReference {
    #[serde(default)]
    pub name: String,
}

impl LocalObjectReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Supported infrastructure platforms
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
pub enum PlatformType {
    #[serde(rename = "AWS")]
    Aws,
    #[default]
    None,
    KubeVirt,
    Agent,
    Azure,
    PowerVS,
    OpenStack,
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlatformType::Aws => "AWS",
            PlatformType::None => "None",
            PlatformType::KubeVirt => "KubeVirt",
            PlatformType::Agent => "Agent",
            PlatformType::Azure => "Azure",
            PlatformType::PowerVS => "PowerVS",
            PlatformType::OpenStack => "OpenStack",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSpec {
    #[serde(rename = "type")]
    pub type_: PlatformType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsPlatformSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubevirt: Option<KubevirtPlatformSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsPlatformSpec {
    pub region: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_config: Option<AwsCloudProviderConfig>,

    /// Tags applied to every AWS resource created for the cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_tags: Vec<AwsResourceTag>,

    #[serde(default)]
    pub roles_ref: AwsRolesRef,

    /// Legacy per-component role credentials
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<AwsRoleCredentials>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pool_management_creds: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_operator_creds: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_cloud_controller_creds: Option<LocalObjectReference>,

    #[serde(default)]
    pub endpoint_access: AwsEndpointAccessType,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsCloudProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct AwsResourceTag {
    pub key: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsRolesRef {
    #[serde(default, rename = "ingressARN")]
    pub ingress_arn: String,
    #[serde(default, rename = "imageRegistryARN")]
    pub image_registry_arn: String,
    #[serde(default, rename = "storageARN")]
    pub storage_arn: String,
    #[serde(default, rename = "networkARN")]
    pub network_arn: String,
    #[serde(default, rename = "kubeCloudControllerARN")]
    pub kube_cloud_controller_arn: String,
    #[serde(default, rename = "nodePoolManagementARN")]
    pub node_pool_management_arn: String,
    #[serde(default, rename = "controlPlaneOperatorARN")]
    pub control_plane_operator_arn: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct AwsRoleCredentials {
    #[serde(rename = "arn")]
    pub arn: String,
    pub namespace: String,
    pub name: String,
}

/// Whether the API server is reachable from the internet, the VPC, or both
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum AwsEndpointAccessType {
    #[default]
    Public,
    PublicAndPrivate,
    Private,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubevirtPlatformSpec {
    /// Use the management cluster's base domain for guest ingress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_domain_passthrough: Option<bool>,

    /// Random suffix used to name infrastructure objects
    #[serde(default, rename = "generateID", skip_serializing_if = "String::is_empty")]
    pub generate_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DnsSpec {
    #[serde(default)]
    pub base_domain: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum NetworkType {
    OpenShiftSDN,
    Calico,
    OVNKubernetes,
    Other,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworking {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<NetworkType>,

    /// Pod network CIDRs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_network: Vec<ClusterNetworkEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_network: Vec<ServiceNetworkEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub machine_network: Vec<MachineNetworkEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server: Option<ApiServerNetworking>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ovn_kubernetes_config: Option<OvnKubernetesConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkEntry {
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_prefix: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ServiceNetworkEntry {
    pub cidr: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct MachineNetworkEntry {
    pub cidr: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerNetworking {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<String>,

    /// Port the API server listens on; may be set once after creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_cidr_blocks: Vec<String>,
}

/// OVN-Kubernetes internal subnets. Requires a 4.16 or newer release.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OvnKubernetesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<OvnIpv4Config>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipsec: Option<IpsecConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OvnIpv4Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_join_subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_transit_switch_subnet: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IpsecConfig {
    #[serde(default)]
    pub mode: String,
}

/// Control plane services that can be published
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum ServiceType {
    #[serde(rename = "APIServer")]
    ApiServer,
    OAuthServer,
    Konnectivity,
    Ignition,
    #[serde(rename = "OVNSbDb")]
    OvnSbDb,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum PublishingStrategyType {
    #[default]
    LoadBalancer,
    NodePort,
    Route,
    None,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicePublishingStrategyMapping {
    pub service: ServiceType,
    pub service_publishing_strategy: ServicePublishingStrategy,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicePublishingStrategy {
    #[serde(rename = "type")]
    pub type_: PublishingStrategyType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<NodePortPublishingStrategy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RoutePublishingStrategy>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodePortPublishingStrategy {
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePublishingStrategy {
    #[serde(default)]
    pub hostname: String,
}

/// Subset of the OpenShift cluster configuration carried through to the control plane
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxySpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_gates: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub http_proxy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub https_proxy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub no_proxy: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretEncryptionSpec {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_key: Option<LocalObjectReference>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoNode {
    pub provisioner: ProvisionerConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionerConfig {
    /// Only `Karpenter` is supported
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub karpenter: Option<KarpenterConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KarpenterConfig {
    pub platform: PlatformType,
    #[serde(default, rename = "roleARN", skip_serializing_if = "String::is_empty")]
    pub role_arn: String,
}

/// Status of a HostedCluster
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostedClusterStatus {
    /// Release rollout history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<ClusterVersionStatus>,

    /// Secret in the HostedCluster namespace holding the admin kubeconfig
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignition_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionStatus {
    /// Release the cluster is converging towards
    pub desired: Release,

    /// Newest entry first
    #[serde(default)]
    pub history: Vec<UpdateHistory>,

    #[serde(default)]
    pub observed_generation: i64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum UpdateState {
    Completed,
    #[default]
    Partial,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHistory {
    pub state: UpdateState,
    /// RFC3339 timestamp
    pub started_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,
    #[serde(default)]
    pub version: String,
    pub image: String,
    #[serde(default)]
    pub verified: bool,
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// RFC3339 timestamp of the last status change
    pub last_transition_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl HostedCluster {
    /// Whether a condition of the given type is present with status "True"
    pub fn condition_is_true(&self, type_: &str) -> bool {
        find_condition(self.status_conditions(), type_).is_some_and(|c| c.status == "True")
    }

    pub fn status_conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    /// Name of the per-cluster control plane namespace
    pub fn control_plane_namespace(&self) -> String {
        control_plane_namespace_name(
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default(),
        )
    }

    /// Release image the control plane should run
    pub fn control_plane_release_image(&self) -> &str {
        self.spec
            .control_plane_release
            .as_ref()
            .map(|r| r.image.as_str())
            .filter(|image| !image.is_empty())
            .unwrap_or(&self.spec.release.image)
    }
}

/// `<namespace>-<name>`
pub fn control_plane_namespace_name(namespace: &str, name: &str) -> String {
    format!("{}-{}", namespace, name)
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}
