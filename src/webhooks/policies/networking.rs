//! Networking policies
//!
//! - Network CIDRs must not overlap one another
//! - OVN-Kubernetes sub-configuration needs a 4.16 or newer release
//! - CIDR changes need an explicit acknowledgement and no rollout in flight

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::controller::status::condition_types;
use crate::crd::{ClusterNetworking, HostedClusterSpec};
use crate::release::Version;
use crate::resources::common::{ACK_NETWORKING_DISRUPTION_ANNOTATION, annotation};

use super::{ValidationContext, ValidationResult};

const OVN_CONFIG_MIN_VERSION: Version = Version::new(4, 16, 0);

/// An IPv4 or IPv6 network in CIDR notation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cidr {
    addr: IpAddr,
    prefix: u8,
}

impl Cidr {
    fn bits(&self) -> (u128, u8) {
        match self.addr {
            IpAddr::V4(a) => (u128::from(u32::from(a)), 32),
            IpAddr::V6(a) => (u128::from(a), 128),
        }
    }

    /// Two networks overlap when one contains the other's base address
    pub fn overlaps(&self, other: &Cidr) -> bool {
        let (a, width) = self.bits();
        let (b, other_width) = other.bits();
        if width != other_width {
            return false;
        }
        let prefix = self.prefix.min(other.prefix);
        if prefix == 0 {
            return true;
        }
        let shift = u32::from(width - prefix);
        a >> shift == b >> shift
    }
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("invalid CIDR address: {}", s))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| format!("invalid CIDR address: {}", s))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("invalid CIDR address: {}", s))?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(format!("invalid CIDR address: {}", s));
        }
        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Every CIDR the cluster declares, labelled with the field it came from
fn declared_cidrs(networking: &ClusterNetworking) -> Vec<(&'static str, &str)> {
    let mut cidrs: Vec<(&'static str, &str)> = Vec::new();
    cidrs.extend(
        networking
            .cluster_network
            .iter()
            .map(|e| ("spec.networking.clusterNetwork", e.cidr.as_str())),
    );
    cidrs.extend(
        networking
            .service_network
            .iter()
            .map(|e| ("spec.networking.serviceNetwork", e.cidr.as_str())),
    );
    cidrs.extend(
        networking
            .machine_network
            .iter()
            .map(|e| ("spec.networking.machineNetwork", e.cidr.as_str())),
    );
    if let Some(ipv4) = networking
        .ovn_kubernetes_config
        .as_ref()
        .and_then(|c| c.ipv4.as_ref())
    {
        if let Some(join) = ipv4.internal_join_subnet.as_deref() {
            cidrs.push(("spec.networking.ovnKubernetesConfig.ipv4.internalJoinSubnet", join));
        }
        if let Some(transit) = ipv4.internal_transit_switch_subnet.as_deref() {
            cidrs.push((
                "spec.networking.ovnKubernetesConfig.ipv4.internalTransitSwitchSubnet",
                transit,
            ));
        }
    }
    cidrs
}

/// Check that no two declared networks overlap
pub fn check_cidr_overlap(networking: &ClusterNetworking) -> Result<(), String> {
    let mut parsed: Vec<(&'static str, Cidr)> = Vec::new();
    for (field, raw) in declared_cidrs(networking) {
        let cidr = raw.parse::<Cidr>().map_err(|e| format!("{}: {}", field, e))?;
        if let Some((other_field, other)) = parsed.iter().find(|(_, c)| c.overlaps(&cidr)) {
            return Err(format!(
                "{} {} and {} {} overlap",
                other_field, other, field, cidr
            ));
        }
        parsed.push((field, cidr));
    }
    Ok(())
}

fn cidrs_changed(old: &HostedClusterSpec, new: &HostedClusterSpec) -> bool {
    old.networking.cluster_network != new.networking.cluster_network
        || old.networking.service_network != new.networking.service_network
        || old.networking.machine_network != new.networking.machine_network
        || old.networking.ovn_kubernetes_config != new.networking.ovn_kubernetes_config
}

/// Validate the networking block on create and update
pub fn validate_networking(ctx: &ValidationContext) -> ValidationResult {
    let networking = &ctx.cluster.spec.networking;

    if let Some(old_cluster) = ctx.old_cluster
        && cidrs_changed(&old_cluster.spec, &ctx.cluster.spec)
    {
        let acknowledged = annotation(&ctx.cluster.metadata, ACK_NETWORKING_DISRUPTION_ANNOTATION)
            .is_some_and(|v| v == "true");
        if !acknowledged {
            return ValidationResult::denied(
                "NetworkingChangeNotAcknowledged",
                &format!(
                    "changing network CIDRs disrupts the cluster; set the {}=true annotation in the same update to proceed",
                    ACK_NETWORKING_DISRUPTION_ANNOTATION
                ),
            );
        }
        if old_cluster.condition_is_true(condition_types::CLUSTER_VERSION_PROGRESSING) {
            return ValidationResult::denied(
                "NetworkingChangeDuringRollout",
                "network CIDRs cannot change while a release rollout is in progress",
            );
        }
    }

    if let Err(message) = check_cidr_overlap(networking) {
        return ValidationResult::denied("NetworkCIDROverlap", &message);
    }

    if let Some(ovn) = networking.ovn_kubernetes_config.as_ref()
        && (ovn.ipv4.is_some() || ovn.ipsec.is_some())
    {
        match ctx.release_version {
            Some(version) if version >= OVN_CONFIG_MIN_VERSION => {}
            Some(version) => {
                return ValidationResult::denied(
                    "UnsupportedReleaseVersion",
                    &format!(
                        "spec.networking.ovnKubernetesConfig requires release {} or newer, got {}",
                        OVN_CONFIG_MIN_VERSION, version
                    ),
                );
            }
            None => {
                return ValidationResult::denied(
                    "UnknownReleaseVersion",
                    "spec.networking.ovnKubernetesConfig requires a resolvable release version",
                );
            }
        }
    }

    ValidationResult::allowed()
}
