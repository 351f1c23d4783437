//! Karpenter user data for autoNode HostedClusters
//!
//! Karpenter provisions nodes outside of any NodePool, so the operator renders
//! their ignition user data from a singleton in-memory NodePool and records a
//! hash of its inputs on the HostedCluster.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::ResourceExt;
use kube::api::ObjectMeta;
use kube::runtime::controller::Action;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::client::{self, CreateOrUpdate, ParentAnnotatingUpsert, Upsert};
use crate::crd::{HostedCluster, HostedControlPlane, NodePool};
use crate::release::HAPROXY_ROUTER_COMPONENT;
use crate::resources::common::{
    KARPENTER_CONFIG_VERSION_ANNOTATION, annotation, standard_labels,
};
use crate::resources::mirror::{PULL_SECRET, merge_meta, read_secret_key};
use crate::resources::node_pool::karpenter_node_pool;

use super::context::Context;
use super::error::{Error, Result};

pub const KARPENTER_TAINTS_CONFIG_MAP: &str = "karpenter-taints";
pub const KARPENTER_USER_DATA_SECRET: &str = "user-data-karpenter";
pub const KARPENTER_PROVISIONER: &str = "Karpenter";

const KUBELET_CONFIG_LABEL: &str = "hypershift.openshift.io/kubeletconfig-config";
const DEFAULT_API_SERVER_PORT: i32 = 6443;
const DEFAULT_ADVERTISE_ADDRESS: &str = "172.20.0.1";

/// Renders the HAProxy configuration nodes use to reach the API server
#[async_trait]
pub trait HaproxyConfigGenerator: Send + Sync {
    async fn generate(
        &self,
        haproxy_image: &str,
        hc: &HostedCluster,
        hcp: &HostedControlPlane,
    ) -> Result<String>;
}

/// Proxies the advertised API server address to the published endpoint
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticHaproxyConfig;

#[async_trait]
impl HaproxyConfigGenerator for StaticHaproxyConfig {
    async fn generate(
        &self,
        haproxy_image: &str,
        hc: &HostedCluster,
        _hcp: &HostedControlPlane,
    ) -> Result<String> {
        let api_server = hc.spec.networking.api_server.as_ref();
        let port = api_server
            .and_then(|a| a.port)
            .unwrap_or(DEFAULT_API_SERVER_PORT);
        let address = api_server
            .and_then(|a| a.advertise_address.as_deref())
            .unwrap_or(DEFAULT_ADVERTISE_ADDRESS);
        let backend = format!("api.{}.{}", hc.name_any(), hc.spec.dns.base_domain);

        Ok(format!(
            "# image: {haproxy_image}\n\
             global\n  maxconn 7000\n\
             defaults\n  mode tcp\n  timeout client 30m\n  timeout server 30m\n  timeout connect 10s\n\
             frontend local_apiserver\n  bind {address}:{port}\n  default_backend remote_apiserver\n\
             backend remote_apiserver\n  server controlplane {backend}:{port}\n"
        ))
    }
}

/// Whether the HostedCluster asks for Karpenter autoprovisioning
pub fn is_karpenter_enabled(hc: &HostedCluster) -> bool {
    hc.spec
        .auto_node
        .as_ref()
        .is_some_and(|a| a.provisioner.name == KARPENTER_PROVISIONER)
}

/// KubeletConfig registering Karpenter nodes with the unregistered taint
pub fn kubelet_config_map(hc: &HostedCluster, namespace: &str) -> ConfigMap {
    let mut labels = standard_labels(&hc.name_any());
    labels.insert(KUBELET_CONFIG_LABEL.to_string(), "true".to_string());

    let config = json!({
        "apiVersion": "machineconfiguration.openshift.io/v1",
        "kind": "KubeletConfig",
        "metadata": {"name": KARPENTER_TAINTS_CONFIG_MAP},
        "spec": {
            "kubeletConfig": {
                "registerWithTaints": [{
                    "key": "karpenter.sh/unregistered",
                    "value": "true",
                    "effect": "NoExecute",
                }]
            }
        }
    });

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(KARPENTER_TAINTS_CONFIG_MAP.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("config".to_string(), config.to_string())])),
        ..Default::default()
    }
}

/// Hex SHA-256 over everything the user data depends on
pub fn config_hash(
    pull_secret: &[u8],
    haproxy_config: &str,
    release_image: &str,
    node_pool: &NodePool,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pull_secret);
    hasher.update(haproxy_config.as_bytes());
    hasher.update(release_image.as_bytes());
    for config in &node_pool.spec.config {
        hasher.update(config.name.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn short_hash(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

fn token_secret_name(hash: &str) -> String {
    format!("token-karpenter-{}", short_hash(hash))
}

fn user_data(hc: &HostedCluster, namespace: &str, token: &[u8], hash: &str) -> String {
    let endpoint = hc
        .status
        .as_ref()
        .and_then(|s| s.ignition_endpoint.as_deref())
        .unwrap_or_default();
    json!({
        "ignition": {
            "version": "3.2.0",
            "config": {
                "merge": [{
                    "source": format!("https://{}/ignition", endpoint),
                    "httpHeaders": [
                        {"name": "Authorization", "value": format!("Bearer {}", String::from_utf8_lossy(token))},
                        {"name": "NodePool", "value": format!("{}/karpenter", namespace)},
                        {"name": "TargetConfigVersionHash", "value": short_hash(hash)},
                    ],
                }]
            }
        }
    })
    .to_string()
}

/// Reconcile Karpenter user data and stamp the config hash onto the HostedCluster
#[instrument(skip(hc, ctx), fields(name = %hc.name_any(), namespace = hc.namespace().unwrap_or_default()))]
pub async fn reconcile_karpenter(hc: Arc<HostedCluster>, ctx: Arc<Context>) -> Result<Action> {
    if !ctx.config.enable_karpenter
        || !is_karpenter_enabled(&hc)
        || hc.metadata.deletion_timestamp.is_some()
    {
        return Ok(Action::await_change());
    }

    let client = ctx.client.as_ref();
    let namespace = hc.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let cp_namespace = hc.control_plane_namespace();

    let Some(hcp) = client::get_opt::<HostedControlPlane, _>(client, Some(&cp_namespace), &hc.name_any()).await?
    else {
        debug!("hosted control plane not created yet");
        return Ok(Action::await_change());
    };
    let release_image = hcp.spec.release_image.clone();
    if release_image.is_empty() {
        return Ok(Action::await_change());
    }

    let upsert = ParentAnnotatingUpsert::new(Upsert::new(client), &namespace, &hc.name_any());

    let desired = kubelet_config_map(&hc, &cp_namespace);
    let mut config_map = desired.clone();
    upsert
        .create_or_update(&mut config_map, |cm: &mut ConfigMap| {
            merge_meta(&mut cm.metadata, &desired.metadata);
            cm.data = desired.data.clone();
        })
        .await?;

    let pull_secret = read_secret_key(client, &cp_namespace, PULL_SECRET.target_name, &PULL_SECRET).await?;
    let release = ctx.releases.lookup(&release_image, &pull_secret.0).await?;
    let haproxy_image = release
        .component_image(HAPROXY_ROUTER_COMPONENT)
        .ok_or_else(|| {
            Error::ReleaseLookup(format!(
                "release image {} has no {} component",
                release_image, HAPROXY_ROUTER_COMPONENT
            ))
        })?
        .to_string();
    let haproxy_config = ctx.haproxy.generate(&haproxy_image, &hc, &hcp).await?;

    let node_pool = karpenter_node_pool(&hc, &cp_namespace, &release_image, KARPENTER_TAINTS_CONFIG_MAP);
    let hash = config_hash(&pull_secret.0, &haproxy_config, &release_image, &node_pool);

    let token = reconcile_token(&upsert, &hc, &cp_namespace, &hash, &release_image, &haproxy_config).await?;
    reconcile_user_data(&upsert, &hc, &cp_namespace, &token, &hash).await?;

    if annotation(&hc.metadata, KARPENTER_CONFIG_VERSION_ANNOTATION) == Some(hash.as_str()) {
        debug!("karpenter config version unchanged");
        return Ok(Action::await_change());
    }

    // Optimistic lock: the patch fails with a conflict if the object moved on
    let patch = json!({
        "metadata": {
            "resourceVersion": hc.resource_version(),
            "annotations": {KARPENTER_CONFIG_VERSION_ANNOTATION: hash},
        }
    });
    client::merge_patch::<HostedCluster, _>(client, Some(&namespace), &hc.name_any(), patch).await?;
    info!(config_version = %short_hash(&hash), "updated karpenter config version");

    Ok(Action::await_change())
}

async fn reconcile_token<U: CreateOrUpdate>(
    upsert: &U,
    hc: &HostedCluster,
    namespace: &str,
    hash: &str,
    release_image: &str,
    haproxy_config: &str,
) -> Result<Vec<u8>> {
    let desired = ObjectMeta {
        name: Some(token_secret_name(hash)),
        namespace: Some(namespace.to_string()),
        labels: Some(standard_labels(&hc.name_any())),
        ..Default::default()
    };
    let new_token = uuid::Uuid::new_v4().to_string();
    let mut secret = Secret {
        metadata: desired.clone(),
        ..Default::default()
    };
    upsert
        .create_or_update(&mut secret, |s: &mut Secret| {
            merge_meta(&mut s.metadata, &desired);
            let data = s.data.get_or_insert_with(BTreeMap::new);
            data.entry("token".to_string())
                .or_insert_with(|| ByteString(new_token.into_bytes()));
            data.insert("release".to_string(), ByteString(release_image.as_bytes().to_vec()));
            data.insert("config".to_string(), ByteString(haproxy_config.as_bytes().to_vec()));
        })
        .await?;

    secret
        .data
        .and_then(|mut d| d.remove("token"))
        .map(|t| t.0)
        .ok_or_else(|| Error::InvariantViolation(format!("token secret {} has no token", token_secret_name(hash))))
}

async fn reconcile_user_data<U: CreateOrUpdate>(
    upsert: &U,
    hc: &HostedCluster,
    namespace: &str,
    token: &[u8],
    hash: &str,
) -> Result<()> {
    let desired = ObjectMeta {
        name: Some(KARPENTER_USER_DATA_SECRET.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(standard_labels(&hc.name_any())),
        ..Default::default()
    };
    let value = user_data(hc, namespace, token, hash);
    let mut secret = Secret {
        metadata: desired.clone(),
        ..Default::default()
    };
    upsert
        .create_or_update(&mut secret, |s: &mut Secret| {
            merge_meta(&mut s.metadata, &desired);
            s.data = Some(BTreeMap::from([(
                "value".to_string(),
                ByteString(value.into_bytes()),
            )]));
        })
        .await?;
    Ok(())
}
