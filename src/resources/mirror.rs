//! Mirrors of user-provided secrets and configmaps into the control plane namespace
//!
//! Each mirror has exactly one source object in the HostedCluster namespace
//! and a fixed key schema. A source missing its key fails the reconcile
//! before anything is written.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::client::{self, CreateOrUpdate, ObjectClient};
use crate::controller::error::{Error, Result};
use crate::crd::HostedCluster;

use super::common::{REFERENCED_RESOURCE_ANNOTATION, object_key, owner_reference, standard_labels};

/// Description of one mirrored secret
#[derive(Clone, Copy, Debug)]
pub struct SecretMirror {
    /// Human readable name used in error messages
    pub kind: &'static str,
    pub key: &'static str,
    /// Name of the mirror in the control plane namespace
    pub target_name: &'static str,
    pub secret_type: Option<&'static str>,
}

pub const PULL_SECRET: SecretMirror = SecretMirror {
    kind: "pull secret",
    key: ".dockerconfigjson",
    target_name: "pull-secret",
    secret_type: Some("kubernetes.io/dockerconfigjson"),
};

pub const PROVIDER_CREDS: SecretMirror = SecretMirror {
    kind: "provider creds secret",
    key: "credentials",
    target_name: "provider-creds",
    secret_type: None,
};

pub const SSH_KEY: SecretMirror = SecretMirror {
    kind: "ssh secret",
    key: "id_rsa.pub",
    target_name: "ssh-key",
    secret_type: None,
};

pub const TRUST_BUNDLE_KIND: &str = "AdditionalTrustBundle configmap";
pub const TRUST_BUNDLE_KEY: &str = "ca-bundle.crt";
/// Mirror of the additional trust bundle in the control plane namespace
pub const USER_CA_BUNDLE_NAME: &str = "user-ca-bundle";

pub const KUBECONFIG_KEY: &str = "kubeconfig";

/// Name of the admin kubeconfig published next to the HostedCluster
pub fn admin_kubeconfig_name(cluster_name: &str) -> String {
    format!("{}-admin-kubeconfig", cluster_name)
}

fn mirror_meta(hc: &HostedCluster, namespace: &str, name: &str, source: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(standard_labels(&hc.name_any())),
        annotations: Some(BTreeMap::from([(
            REFERENCED_RESOURCE_ANNOTATION.to_string(),
            object_key(&hc.namespace().unwrap_or_default(), source),
        )])),
        ..Default::default()
    }
}

/// Merge desired labels and annotations into a live object without dropping
/// keys owned by others
pub(crate) fn merge_meta(live: &mut ObjectMeta, desired: &ObjectMeta) {
    if let Some(labels) = &desired.labels {
        live.labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());
    }
    if let Some(annotations) = &desired.annotations {
        live.annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations.clone());
    }
    if desired.owner_references.is_some() {
        live.owner_references = desired.owner_references.clone();
    }
}

/// Read a source secret and return the value of its required key
pub async fn read_secret_key<C: ObjectClient + ?Sized>(
    client: &C,
    namespace: &str,
    name: &str,
    mirror: &SecretMirror,
) -> Result<ByteString> {
    let secret: Secret = client::get_opt(client, Some(namespace), name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("{} {}", mirror.kind, object_key(namespace, name))))?;

    secret
        .data
        .and_then(|mut data| data.remove(mirror.key))
        .ok_or_else(|| Error::MissingKey {
            kind: mirror.kind,
            name: name.to_string(),
            key: mirror.key,
        })
}

/// Copy the required key of a source secret into its mirror
pub async fn mirror_secret<C, U>(
    client: &C,
    upsert: &U,
    hc: &HostedCluster,
    source: &str,
    target_namespace: &str,
    mirror: &SecretMirror,
) -> Result<Secret>
where
    C: ObjectClient + ?Sized,
    U: CreateOrUpdate,
{
    let source_namespace = hc.namespace().unwrap_or_default();
    let value = read_secret_key(client, &source_namespace, source, mirror).await?;

    let desired = mirror_meta(hc, target_namespace, mirror.target_name, source);
    let mut target = Secret {
        metadata: desired.clone(),
        ..Default::default()
    };
    let result = upsert
        .create_or_update(&mut target, |secret: &mut Secret| {
            merge_meta(&mut secret.metadata, &desired);
            if let Some(type_) = mirror.secret_type {
                secret.type_ = Some(type_.to_string());
            }
            secret.data = Some(BTreeMap::from([(mirror.key.to_string(), value)]));
        })
        .await?;
    debug!(secret = %mirror.target_name, namespace = %target_namespace, ?result, "mirrored secret");
    Ok(target)
}

/// Mirror the additional trust bundle, or delete a stale mirror when the
/// HostedCluster no longer references one
pub async fn mirror_trust_bundle<C, U>(
    client: &C,
    upsert: &U,
    hc: &HostedCluster,
    target_namespace: &str,
) -> Result<Option<ConfigMap>>
where
    C: ObjectClient + ?Sized,
    U: CreateOrUpdate,
{
    let Some(reference) = hc.spec.additional_trust_bundle.as_ref() else {
        let stale: Option<ConfigMap> = client::get_opt(client, Some(target_namespace), USER_CA_BUNDLE_NAME).await?;
        if stale.is_some()
            && client::delete::<ConfigMap, C>(client, Some(target_namespace), USER_CA_BUNDLE_NAME).await?
        {
            info!(namespace = %target_namespace, "removed unreferenced additional trust bundle");
        }
        return Ok(None);
    };

    let source_namespace = hc.namespace().unwrap_or_default();
    let source: ConfigMap = client::get_opt(client, Some(&source_namespace), &reference.name)
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "{} {}",
                TRUST_BUNDLE_KIND,
                object_key(&source_namespace, &reference.name)
            ))
        })?;
    let bundle = source
        .data
        .and_then(|mut data| data.remove(TRUST_BUNDLE_KEY))
        .ok_or_else(|| Error::MissingKey {
            kind: TRUST_BUNDLE_KIND,
            name: reference.name.clone(),
            key: TRUST_BUNDLE_KEY,
        })?;

    let desired = mirror_meta(hc, target_namespace, USER_CA_BUNDLE_NAME, &reference.name);
    let mut target = ConfigMap {
        metadata: desired.clone(),
        ..Default::default()
    };
    upsert
        .create_or_update(&mut target, |cm: &mut ConfigMap| {
            merge_meta(&mut cm.metadata, &desired);
            cm.data = Some(BTreeMap::from([(TRUST_BUNDLE_KEY.to_string(), bundle)]));
        })
        .await?;
    Ok(Some(target))
}

/// Publish the control plane's kubeconfig next to the HostedCluster
pub async fn mirror_kubeconfig<C, U>(
    client: &C,
    upsert: &U,
    hc: &HostedCluster,
    source_namespace: &str,
    source: &str,
    source_key: &str,
) -> Result<Secret>
where
    C: ObjectClient + ?Sized,
    U: CreateOrUpdate,
{
    let secret: Secret = client::get_opt(client, Some(source_namespace), source)
        .await?
        .ok_or_else(|| Error::NotFound(format!("kubeconfig secret {}", object_key(source_namespace, source))))?;
    let kubeconfig = secret
        .data
        .and_then(|mut data| data.remove(source_key))
        .ok_or_else(|| {
            Error::InvariantViolation(format!(
                "kubeconfig secret {} has no {} key",
                object_key(source_namespace, source),
                source_key
            ))
        })?;

    let name = admin_kubeconfig_name(&hc.name_any());
    let mut desired = mirror_meta(hc, &hc.namespace().unwrap_or_default(), &name, source);
    desired.owner_references = Some(vec![owner_reference(hc)]);
    let mut target = Secret {
        metadata: desired.clone(),
        ..Default::default()
    };
    upsert
        .create_or_update(&mut target, |s: &mut Secret| {
            merge_meta(&mut s.metadata, &desired);
            s.data = Some(BTreeMap::from([(KUBECONFIG_KEY.to_string(), kubeconfig)]));
        })
        .await?;
    Ok(target)
}
