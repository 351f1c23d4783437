//! Common utilities for Kubernetes resource generation
//!
//! Well-known annotation and label keys live here so that the reconciler,
//! the admission webhooks and the OADP subsystem agree on them.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;

use crate::crd::HostedCluster;

/// API version for the HostedCluster CRD
pub const API_VERSION: &str = "hypershift.openshift.io/v1beta1";

/// Kind for the HostedCluster CRD
pub const KIND: &str = "HostedCluster";

/// Operator field manager name for server-side apply
pub const FIELD_MANAGER: &str = "hypershift-operator";

pub const FINALIZER: &str = "hypershift.openshift.io/finalizer";

/// Child to HostedCluster back-pointer, `<namespace>/<name>`
pub const HOSTED_CLUSTER_ANNOTATION: &str = "hypershift.openshift.io/cluster";

/// Marks control plane namespaces
pub const CONTROL_PLANE_LABEL: &str = "hypershift.openshift.io/hosted-control-plane";

pub const SECURITY_CONTEXT_UID_ANNOTATION: &str =
    "hypershift.openshift.io/default-security-context-uid";

/// Mirror to source back-pointer, `<namespace>/<name>`
pub const REFERENCED_RESOURCE_ANNOTATION: &str = "hypershift.openshift.io/referenced-resource";

pub const OADP_PAUSED_BY_ANNOTATION: &str = "oadp.openshift.io/paused-by";
pub const OADP_PAUSED_AT_ANNOTATION: &str = "oadp.openshift.io/paused-at";
/// Value of the paused-by annotation written by the OADP plugin
pub const OADP_PLUGIN_AUTHOR: &str = "hypershift-oadp-plugin";

pub const KARPENTER_CONFIG_VERSION_ANNOTATION: &str =
    "hypershift.openshift.io/karpenterNodePoolCurrentConfigVersion";

pub const HAS_BEEN_AVAILABLE_ANNOTATION: &str = "hypershift.openshift.io/HasBeenAvailable";

pub const ACK_NETWORKING_DISRUPTION_ANNOTATION: &str =
    "hypershift.openshift.io/acknowledge-networking-disruption";

pub const CLEANUP_CLOUD_RESOURCES_ANNOTATION: &str =
    "hypershift.openshift.io/cleanup-cloud-resources";

pub const SKIP_CLOUD_RESOURCES_CLEANUP_ANNOTATION: &str =
    "hypershift.openshift.io/skip-cloud-resources-cleanup";

pub const KUBEVIRT_JSON_PATCH_ANNOTATION: &str = "hypershift.openshift.io/kubevirt-vm-jsonpatch";

pub const SKIP_RELEASE_IMAGE_VALIDATION_ANNOTATION: &str =
    "hypershift.openshift.io/skip-release-image-validation";

pub const DISABLE_CLUSTER_AUTOSCALER_ANNOTATION: &str =
    "hypershift.openshift.io/disable-cluster-autoscaler";

pub const SKIP_DELETE_CONTROL_PLANE_NAMESPACE_ANNOTATION: &str =
    "hypershift.openshift.io/skip-delete-hosted-controlplane-namespace";

/// Generate an owner reference for a HostedCluster
///
/// Only valid for children in the HostedCluster's own namespace; objects in
/// the control plane namespace are tied back through the parent annotation.
pub fn owner_reference(hc: &HostedCluster) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: hc.name_any(),
        uid: hc.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels for every resource the operator creates for a HostedCluster
pub fn standard_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (
            "hypershift.openshift.io/hosted-cluster".to_string(),
            cluster_name.to_string(),
        ),
    ])
}

/// `<namespace>/<name>`
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

pub fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}
