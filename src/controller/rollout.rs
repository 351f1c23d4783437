//! Release rollout history and availability for HostedClusters
//!
//! Both computations are pure: they read a HostedCluster and its
//! HostedControlPlane and return the status fragment to persist.

use crate::clock::{Clock, format_time};
use crate::crd::{
    ClusterVersionStatus, Condition, HostedCluster, HostedControlPlane, UpdateHistory, UpdateState,
};

use super::status::{condition_reasons, condition_status, condition_types};

const HCP_UNAVAILABLE: &str = "hosted control plane is unavailable";
const KUBECONFIG_UNAVAILABLE: &str = "the hosted control plane kubeconfig is unavailable";

/// Advance `status.version` by one step.
///
/// A rollout counts as complete once the HostedControlPlane reports running
/// the image it was asked to run. During an HCP-internal rollout this can
/// misclassify briefly, which is accepted.
pub fn compute_cluster_version_status(
    clock: &dyn Clock,
    hc: &HostedCluster,
    hcp: Option<&HostedControlPlane>,
) -> ClusterVersionStatus {
    let current = hc
        .status
        .as_ref()
        .and_then(|s| s.version.as_ref())
        .filter(|v| !v.history.is_empty());

    let Some(current) = current else {
        return ClusterVersionStatus {
            desired: hc.spec.release.clone(),
            history: vec![UpdateHistory {
                state: UpdateState::Partial,
                started_time: format_time(clock.now()),
                image: hc.spec.release.image.clone(),
                ..Default::default()
            }],
            observed_generation: hc.metadata.generation.unwrap_or_default(),
        };
    };

    let mut version = current.clone();
    let Some(hcp) = hcp else {
        return version;
    };
    let Some(status) = hcp.status.as_ref() else {
        return version;
    };
    if !hcp.rollout_complete() {
        return version;
    }

    let Some(latest) = version.history.first_mut() else {
        return version;
    };
    latest.state = UpdateState::Completed;
    latest.version = status.version.clone();
    if let Some(completed) = &status.last_release_image_transition_time {
        latest.completion_time = Some(completed.clone());
    }

    if hc.spec.release.image != version.desired.image {
        version.history.insert(
            0,
            UpdateHistory {
                state: UpdateState::Partial,
                started_time: format_time(clock.now()),
                image: hc.spec.release.image.clone(),
                ..Default::default()
            },
        );
        version.desired = hc.spec.release.clone();
        version.observed_generation = hc.metadata.generation.unwrap_or_default();
    }

    version
}

/// Available is True iff the control plane reports Available and the
/// kubeconfig has been published on the HostedCluster
pub fn compute_hosted_cluster_availability(
    hc: &HostedCluster,
    hcp: Option<&HostedControlPlane>,
) -> Condition {
    let hcp_available = hcp.is_some_and(HostedControlPlane::is_available);
    let kubeconfig_available = hc.status.as_ref().is_some_and(|s| s.kube_config.is_some());
    let generation = hc.metadata.generation;

    if hcp_available && kubeconfig_available {
        return Condition {
            type_: condition_types::AVAILABLE.to_string(),
            status: condition_status::TRUE.to_string(),
            reason: condition_reasons::AVAILABLE_AS_EXPECTED.to_string(),
            message: String::new(),
            last_transition_time: String::new(),
            observed_generation: generation,
        };
    }

    let mut messages = Vec::new();
    if !hcp_available {
        messages.push(HCP_UNAVAILABLE);
    }
    if !kubeconfig_available {
        messages.push(KUBECONFIG_UNAVAILABLE);
    }
    Condition {
        type_: condition_types::AVAILABLE.to_string(),
        status: condition_status::FALSE.to_string(),
        reason: condition_reasons::UNAVAILABLE.to_string(),
        message: messages.join("; "),
        last_transition_time: String::new(),
        observed_generation: generation,
    }
}
