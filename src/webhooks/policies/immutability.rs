//! Immutability policies
//!
//! A HostedCluster spec is immutable apart from an explicit set of fields.
//! Both specs are redacted of those fields and must then compare equal.

use crate::crd::{
    ApiServerNetworking, AwsEndpointAccessType, ClusterNetworking, HostedClusterSpec, PlatformType,
};

use super::{ValidationContext, ValidationResult};

/// Zero out every field that may change after creation
///
/// Networking apart from the network type and API server is governed by the
/// networking policy, and endpoint access by its own transition rule, so both
/// are cleared here as well.
pub fn redact_mutable_fields(spec: &HostedClusterSpec) -> HostedClusterSpec {
    let mut spec = spec.clone();

    spec.release.image.clear();
    spec.control_plane_release = None;
    spec.cluster_id.clear();
    spec.infra_id.clear();
    spec.configuration = None;
    spec.additional_trust_bundle = None;
    spec.secret_encryption = None;
    spec.paused_until = None;

    for mapping in &mut spec.services {
        if let Some(node_port) = mapping.service_publishing_strategy.node_port.as_mut() {
            node_port.address.clear();
            node_port.port = None;
        }
    }

    if spec.platform.type_ == PlatformType::Aws
        && let Some(aws) = spec.platform.aws.as_mut()
    {
        aws.resource_tags.clear();
        aws.roles_ref = Default::default();
        aws.roles.clear();
        aws.node_pool_management_creds = None;
        aws.control_plane_operator_creds = None;
        aws.kube_cloud_controller_creds = None;
        aws.endpoint_access = AwsEndpointAccessType::default();
    }

    spec.networking = ClusterNetworking {
        network_type: spec.networking.network_type.take(),
        api_server: spec
            .networking
            .api_server
            .take()
            .filter(|a| *a != ApiServerNetworking::default()),
        ..Default::default()
    };

    spec
}

/// Validate that an update only touches mutable fields
///
/// Rules:
/// - networkType cannot change
/// - clusterID and infraID can only be set when empty
/// - AWS endpoint access cannot move to or from Public
/// - the API server port may be set once if it was never set
/// - everything else outside the mutable set is frozen
pub fn validate_immutability(ctx: &ValidationContext) -> ValidationResult {
    // Only apply immutability checks on UPDATE, not CREATE
    let old_cluster = match ctx.old_cluster {
        Some(c) => c,
        None => return ValidationResult::allowed(),
    };
    let old = &old_cluster.spec;
    let new = &ctx.cluster.spec;

    if old.networking.network_type != new.networking.network_type {
        return ValidationResult::denied(
            "NetworkTypeImmutable",
            "spec.networking.networkType cannot be changed after creation",
        );
    }

    if !old.cluster_id.is_empty() && old.cluster_id != new.cluster_id {
        return ValidationResult::denied(
            "ClusterIDImmutable",
            "spec.clusterID can only be set when it is empty",
        );
    }
    if !old.infra_id.is_empty() && old.infra_id != new.infra_id {
        return ValidationResult::denied(
            "InfraIDImmutable",
            "spec.infraID can only be set when it is empty",
        );
    }

    if let (Some(old_aws), Some(new_aws)) = (old.platform.aws.as_ref(), new.platform.aws.as_ref())
        && old_aws.endpoint_access != new_aws.endpoint_access
        && (old_aws.endpoint_access == AwsEndpointAccessType::Public
            || new_aws.endpoint_access == AwsEndpointAccessType::Public)
    {
        return ValidationResult::denied(
            "EndpointAccessTransitionNotAllowed",
            &format!(
                "transitioning endpoint access from {:?} to {:?} is not allowed",
                old_aws.endpoint_access, new_aws.endpoint_access
            ),
        );
    }

    let mut old_redacted = redact_mutable_fields(old);
    let new_redacted = redact_mutable_fields(new);

    // The API server port may go from unset to set exactly once
    let old_port = old.networking.api_server.as_ref().and_then(|a| a.port);
    let new_port = new.networking.api_server.as_ref().and_then(|a| a.port);
    if old_port.is_none() && new_port.is_some() {
        old_redacted.networking.api_server.get_or_insert_with(Default::default).port = new_port;
    }

    if old_redacted != new_redacted {
        return ValidationResult::denied(
            "ImmutableFieldChanged",
            "attempted change to immutable field(s)",
        );
    }

    ValidationResult::allowed()
}
