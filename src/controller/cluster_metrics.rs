//! Per-HostedCluster lifecycle durations
//!
//! Pure computations over a HostedCluster and the current time. The
//! reconciler publishes the result through [`crate::health::Metrics`].

use chrono::{DateTime, Utc};

use crate::clock::parse_time;
use crate::crd::{HostedCluster, find_condition};
use crate::resources::common::{
    HAS_BEEN_AVAILABLE_ANNOTATION, SKIP_CLOUD_RESOURCES_CLEANUP_ANNOTATION, annotation,
};

use super::status::{condition_status, condition_types};

/// Gauge values for one HostedCluster; `None` means the gauge is not emitted
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterMetrics {
    pub initial_rolling_out: Option<f64>,
    pub waiting_initial_availability: Option<f64>,
    pub deleting: Option<f64>,
    pub guest_cloud_resources_deleting: Option<f64>,
    pub skipped_cloud_resources_deletion: Option<f64>,
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Seconds from creation until the first rollout completed, or until now
/// while it is still in flight
pub fn initial_rolling_out_duration(hc: &HostedCluster, now: DateTime<Utc>) -> Option<f64> {
    let created = hc.metadata.creation_timestamp.as_ref()?.0;
    let initial = hc
        .status
        .as_ref()
        .and_then(|s| s.version.as_ref())
        .and_then(|v| v.history.last());

    match initial
        .and_then(|entry| entry.completion_time.as_deref())
        .and_then(parse_time)
    {
        Some(completed) => Some(seconds_between(created, completed)),
        None => Some(seconds_between(created, now)),
    }
}

/// Seconds from creation until Available first turned True. Not emitted once
/// the HasBeenAvailable annotation is recorded.
pub fn waiting_initial_availability_duration(
    hc: &HostedCluster,
    now: DateTime<Utc>,
) -> Option<f64> {
    if annotation(&hc.metadata, HAS_BEEN_AVAILABLE_ANNOTATION).is_some() {
        return None;
    }
    let created = hc.metadata.creation_timestamp.as_ref()?.0;
    let available = find_condition(hc.status_conditions(), condition_types::AVAILABLE)
        .filter(|c| c.status == condition_status::TRUE)
        .and_then(|c| parse_time(&c.last_transition_time));

    Some(seconds_between(created, available.unwrap_or(now)))
}

pub fn deleting_duration(hc: &HostedCluster, now: DateTime<Utc>) -> Option<f64> {
    let deleted = hc.metadata.deletion_timestamp.as_ref()?.0;
    Some(seconds_between(deleted, now))
}

/// Deletion time, until the guest cloud resources are reported destroyed
pub fn guest_cloud_resources_deleting_duration(
    hc: &HostedCluster,
    now: DateTime<Utc>,
) -> Option<f64> {
    let deleting = deleting_duration(hc, now)?;
    if hc.condition_is_true(condition_types::CLOUD_RESOURCES_DESTROYED) {
        return None;
    }
    Some(deleting)
}

/// 1 while deleting without cloud cleanup, 0 while deleting with it
pub fn skipped_cloud_resources_deletion(hc: &HostedCluster) -> Option<f64> {
    hc.metadata.deletion_timestamp.as_ref()?;

    let invalid_identity = find_condition(
        hc.status_conditions(),
        condition_types::VALID_AWS_IDENTITY_PROVIDER,
    )
    .is_some_and(|c| c.status == condition_status::FALSE);
    let skip_requested =
        annotation(&hc.metadata, SKIP_CLOUD_RESOURCES_CLEANUP_ANNOTATION) == Some("true");

    Some(if invalid_identity || skip_requested { 1.0 } else { 0.0 })
}

pub fn compute_cluster_metrics(hc: &HostedCluster, now: DateTime<Utc>) -> ClusterMetrics {
    ClusterMetrics {
        initial_rolling_out: initial_rolling_out_duration(hc, now),
        waiting_initial_availability: waiting_initial_availability_duration(hc, now),
        deleting: deleting_duration(hc, now),
        guest_cloud_resources_deleting: guest_cloud_resources_deleting_duration(hc, now),
        skipped_cloud_resources_deletion: skipped_cloud_resources_deletion(hc),
    }
}
