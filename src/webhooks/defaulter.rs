//! Defaulting for HostedCluster create and update requests

use json_patch::{Patch, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::controller::error::Result;
use crate::crd::{
    HostedCluster, KubevirtPlatformSpec, NetworkType, PlatformType, PublishingStrategyType,
    ServicePublishingStrategy, ServicePublishingStrategyMapping, ServiceType,
};
use crate::release::ReleaseProvider;

const GENERATED_ID_LENGTH: usize = 10;

/// Fill in the release image and platform defaults
pub async fn default_hosted_cluster(
    hc: &mut HostedCluster,
    releases: &dyn ReleaseProvider,
) -> Result<()> {
    if hc.spec.release.image.is_empty() {
        hc.spec.release.image = releases.default_release_image().await?;
    }

    if hc.spec.platform.type_ == PlatformType::KubeVirt {
        default_kubevirt(hc);
    }
    Ok(())
}

/// Random lowercase alphanumeric id used to name KubeVirt infrastructure
pub fn generate_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LENGTH)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

fn default_kubevirt(hc: &mut HostedCluster) {
    let base_domain_empty = hc.spec.dns.base_domain.is_empty();
    let kubevirt = hc
        .spec
        .platform
        .kubevirt
        .get_or_insert_with(KubevirtPlatformSpec::default);

    if kubevirt.generate_id.is_empty() {
        kubevirt.generate_id = generate_id();
    }
    if base_domain_empty && kubevirt.base_domain_passthrough.is_none() {
        kubevirt.base_domain_passthrough = Some(true);
    }

    if hc.spec.networking.network_type.is_none() {
        hc.spec.networking.network_type = Some(NetworkType::OVNKubernetes);
    }

    for default in kubevirt_service_defaults() {
        if !hc.spec.services.iter().any(|s| s.service == default.service) {
            hc.spec.services.push(default);
        }
    }
}

/// Services published through the management cluster's ingress
fn kubevirt_service_defaults() -> Vec<ServicePublishingStrategyMapping> {
    [
        (ServiceType::ApiServer, PublishingStrategyType::LoadBalancer),
        (ServiceType::OAuthServer, PublishingStrategyType::Route),
        (ServiceType::Konnectivity, PublishingStrategyType::Route),
        (ServiceType::Ignition, PublishingStrategyType::Route),
    ]
    .into_iter()
    .map(|(service, type_)| ServicePublishingStrategyMapping {
        service,
        service_publishing_strategy: ServicePublishingStrategy {
            type_,
            ..Default::default()
        },
    })
    .collect()
}

/// JSON patch replacing `/spec`, or `None` when defaulting changed nothing
pub fn spec_patch(original: &HostedCluster, defaulted: &HostedCluster) -> Result<Option<Patch>> {
    if original.spec == defaulted.spec {
        return Ok(None);
    }
    Ok(Some(Patch(vec![PatchOperation::Replace(ReplaceOperation {
        path: PointerBuf::from_tokens(["spec"]),
        value: serde_json::to_value(&defaulted.spec)?,
    })])))
}
