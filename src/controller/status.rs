//! HostedCluster conditions and the status subresource write

use crate::client::{self, ObjectClient};
use crate::controller::error::Result;
use crate::crd::{Condition, HostedCluster, HostedClusterStatus};

/// Condition types reported on HostedClusters
pub mod condition_types {
    /// Control plane is serving and its kubeconfig has been published
    pub const AVAILABLE: &str = "Available";
    /// A release rollout is in flight
    pub const CLUSTER_VERSION_PROGRESSING: &str = "ClusterVersionProgressing";
    /// The guest cluster can assume cloud roles through its OIDC provider
    pub const VALID_AWS_IDENTITY_PROVIDER: &str = "ValidAWSIdentityProvider";
    pub const RECONCILIATION_PAUSED: &str = "ReconciliationPaused";
    /// Reported by the control plane operator once guest cloud resources are gone
    pub const CLOUD_RESOURCES_DESTROYED: &str = "CloudResourcesDestroyed";
}

pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

pub mod condition_reasons {
    pub const AS_EXPECTED: &str = "AsExpected";
    pub const AVAILABLE_AS_EXPECTED: &str = "HostedClusterAsExpected";
    pub const UNAVAILABLE: &str = "HostedClusterUnavailable";
    pub const RECONCILIATION_PAUSED: &str = "ReconciliationPaused";
    pub const RELEASE_ROLLING_OUT: &str = "ReleaseRollingOut";
}

/// Accumulates condition changes on top of what a HostedCluster already reports
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
    now: String,
}

impl ConditionBuilder {
    /// Start from existing conditions; `now` stamps any status transition
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>, now: &str) -> Self {
        Self {
            conditions: existing,
            generation,
            now: now.to_string(),
        }
    }

    /// Upsert a condition by type. The transition time only moves when the
    /// status changes.
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        let transitioned = match self.conditions.iter().position(|c| c.type_ == type_) {
            Some(idx) => {
                let prior = self.conditions.swap_remove(idx);
                if prior.status == status {
                    prior.last_transition_time
                } else {
                    self.now.clone()
                }
            }
            None => self.now.clone(),
        };
        self.conditions.push(Condition {
            type_: type_.into(),
            status: status.into(),
            reason: reason.into(),
            message: message.into(),
            last_transition_time: transitioned,
            observed_generation: self.generation,
        });
        self
    }

    /// Install a fully computed condition, keeping the prior transition time if
    /// the status did not change
    pub fn with_condition(self, condition: &Condition) -> Self {
        self.set_condition(
            &condition.type_,
            &condition.status,
            &condition.reason,
            &condition.message,
        )
    }

    /// Conditions ordered by type so repeated passes serialize identically
    pub fn build(mut self) -> Vec<Condition> {
        self.conditions.sort_by(|a, b| a.type_.cmp(&b.type_));
        self.conditions
    }
}

/// Writes HostedCluster status through the optimistic-concurrency status path
pub struct StatusManager<'a, C: ObjectClient + ?Sized> {
    hc: &'a HostedCluster,
    client: &'a C,
}

impl<'a, C: ObjectClient + ?Sized> StatusManager<'a, C> {
    pub fn new(hc: &'a HostedCluster, client: &'a C) -> Self {
        Self { hc, client }
    }

    /// Persist `status` if it differs from what was read. A stale read
    /// surfaces as a conflict error.
    pub async fn update(&self, status: HostedClusterStatus) -> Result<Option<HostedCluster>> {
        if self.hc.status.as_ref() == Some(&status) {
            return Ok(None);
        }
        let mut updated = self.hc.clone();
        updated.status = Some(status);
        Ok(Some(client::update_status(self.client, &updated).await?))
    }
}
