//! Control plane namespace
//!
//! Every HostedCluster gets a namespace `<namespace>-<name>` labeled as a
//! control plane namespace and annotated with its security-context UID.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use crate::crd::HostedCluster;

use super::common::{CONTROL_PLANE_LABEL, SECURITY_CONTEXT_UID_ANNOTATION, annotation, standard_labels};

/// Desired metadata of the control plane namespace, before the UID is known
pub fn control_plane_namespace(hc: &HostedCluster) -> Namespace {
    let mut labels = standard_labels(&hc.name_any());
    labels.insert(CONTROL_PLANE_LABEL.to_string(), "true".to_string());

    Namespace {
        metadata: ObjectMeta {
            name: Some(hc.control_plane_namespace()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// UID recorded on a namespace, if it parses
pub fn security_context_uid(ns: &Namespace) -> Option<i64> {
    annotation(&ns.metadata, SECURITY_CONTEXT_UID_ANNOTATION)?
        .parse()
        .ok()
}

/// Apply the control plane label and, if none is recorded yet, the UID
pub fn apply_control_plane_namespace(live: &mut Namespace, desired: &Namespace, uid: Option<i64>) {
    if let Some(labels) = &desired.metadata.labels {
        live.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());
    }
    if let Some(uid) = uid
        && annotation(&live.metadata, SECURITY_CONTEXT_UID_ANNOTATION).is_none()
    {
        live.annotations_mut()
            .insert(SECURITY_CONTEXT_UID_ANNOTATION.to_string(), uid.to_string());
    }
}
