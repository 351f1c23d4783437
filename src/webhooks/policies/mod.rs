//! HostedCluster admission rules
//!
//! Creates and updates run different rule sets; the first denial wins.

pub mod immutability;
pub mod networking;
pub mod platform;

pub use immutability::{redact_mutable_fields, validate_immutability};
pub use networking::{Cidr, validate_networking};
pub use platform::{validate_json_patch_annotation, validate_platform};

use crate::crd::HostedCluster;
use crate::release::Version;

/// Admission verdict; denials carry a machine reason and a user-facing message
#[derive(Debug)]
pub struct ValidationResult {
    pub allowed: bool,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            message: None,
        }
    }

    pub fn denied(reason: &str, message: &str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            message: Some(message.into()),
        }
    }
}

/// Object under review, plus the stored object on update
pub struct ValidationContext<'a> {
    pub cluster: &'a HostedCluster,
    pub old_cluster: Option<&'a HostedCluster>,
    /// Version of the requested release, when it could be resolved
    pub release_version: Option<Version>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(
        cluster: &'a HostedCluster,
        old_cluster: Option<&'a HostedCluster>,
        release_version: Option<Version>,
    ) -> Self {
        Self {
            cluster,
            old_cluster,
            release_version,
        }
    }

    pub fn is_create(&self) -> bool {
        self.old_cluster.is_none()
    }
}

type Policy = fn(&ValidationContext) -> ValidationResult;

const ON_CREATE: [Policy; 3] = [validate_networking, validate_json_patch_annotation, validate_platform];
const ON_UPDATE: [Policy; 3] = [validate_immutability, validate_networking, validate_json_patch_annotation];

/// Run every policy that applies to the request and return the first failure
pub fn validate_all(ctx: &ValidationContext) -> ValidationResult {
    let policies = if ctx.is_create() { ON_CREATE } else { ON_UPDATE };
    policies
        .iter()
        .map(|policy| policy(ctx))
        .find(|result| !result.allowed)
        .unwrap_or_else(ValidationResult::allowed)
}
