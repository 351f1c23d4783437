//! HostedControlPlane derived from a HostedCluster
//!
//! Secret and ConfigMap references are rewritten to the mirrored copies in
//! the control plane namespace.

use kube::ResourceExt;
use kube::api::ObjectMeta;

use crate::crd::{
    HostedCluster, HostedControlPlane, HostedControlPlaneSpec, LocalObjectReference, UpdateState,
};

use super::common::{CLEANUP_CLOUD_RESOURCES_ANNOTATION, annotation, standard_labels};
use super::mirror::{PROVIDER_CREDS, PULL_SECRET, SSH_KEY, USER_CA_BUNDLE_NAME};

/// Skeleton HostedControlPlane, named after the HostedCluster
pub fn hosted_control_plane(hc: &HostedCluster) -> HostedControlPlane {
    HostedControlPlane {
        metadata: ObjectMeta {
            name: Some(hc.name_any()),
            namespace: Some(hc.control_plane_namespace()),
            labels: Some(standard_labels(&hc.name_any())),
            ..Default::default()
        },
        spec: HostedControlPlaneSpec::default(),
        status: None,
    }
}

/// Whether the release image on the HostedControlPlane may follow the HostedCluster
///
/// The image is set on creation and afterwards only once the newest history
/// entry has completed.
pub fn release_gate_open(hc: &HostedCluster, hcp: &HostedControlPlane) -> bool {
    if hcp.spec.release_image.is_empty() {
        return true;
    }
    hc.status
        .as_ref()
        .and_then(|s| s.version.as_ref())
        .and_then(|v| v.history.first())
        .is_some_and(|h| h.state == UpdateState::Completed)
}

/// Copy the HostedCluster's desired state onto a live HostedControlPlane
pub fn apply_hosted_control_plane_spec(hcp: &mut HostedControlPlane, hc: &HostedCluster) {
    if release_gate_open(hc, hcp) {
        hcp.spec.release_image = hc.spec.release.image.clone();
        hcp.spec.control_plane_release_image = hc
            .spec
            .control_plane_release
            .as_ref()
            .map(|r| r.image.clone())
            .filter(|image| !image.is_empty());
    }

    let spec = &mut hcp.spec;
    spec.cluster_id = hc.spec.cluster_id.clone();
    spec.infra_id = hc.spec.infra_id.clone();
    spec.platform = hc.spec.platform.clone();
    spec.dns = hc.spec.dns.clone();
    spec.networking = hc.spec.networking.clone();
    spec.services = hc.spec.services.clone();
    spec.pull_secret = LocalObjectReference::new(PULL_SECRET.target_name);
    spec.ssh_key = hc
        .spec
        .ssh_key
        .as_ref()
        .map(|_| LocalObjectReference::new(SSH_KEY.target_name));
    spec.provider_creds = hc
        .spec
        .provider_creds
        .as_ref()
        .map(|_| LocalObjectReference::new(PROVIDER_CREDS.target_name));
    spec.additional_trust_bundle = hc
        .spec
        .additional_trust_bundle
        .as_ref()
        .map(|_| LocalObjectReference::new(USER_CA_BUNDLE_NAME));
    spec.paused_until = hc.spec.paused_until.clone();
    spec.configuration = hc.spec.configuration.clone();
    spec.secret_encryption = hc.spec.secret_encryption.clone();
    spec.auto_node = hc.spec.auto_node.clone();

    match annotation(&hc.metadata, CLEANUP_CLOUD_RESOURCES_ANNOTATION) {
        Some(value) => {
            hcp.annotations_mut()
                .insert(CLEANUP_CLOUD_RESOURCES_ANNOTATION.to_string(), value.to_string());
        }
        None => {
            if let Some(annotations) = hcp.metadata.annotations.as_mut() {
                annotations.remove(CLEANUP_CLOUD_RESOURCES_ANNOTATION);
            }
        }
    }
}
