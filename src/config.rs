//! Operator configuration
//!
//! Everything is read from the environment once at start-up. Values that fail
//! to parse are rejected rather than silently defaulted.

use crate::controller::error::{Error, Result};

pub const DEFAULT_CONTROL_PLANE_OPERATOR_IMAGE: &str = "quay.io/hypershift/hypershift:latest";
pub const DEFAULT_CAPI_MANAGER_IMAGE: &str =
    "registry.k8s.io/cluster-api/cluster-api-controller:v1.8.4";
pub const DEFAULT_CAPI_PROVIDER_AWS_IMAGE: &str =
    "registry.k8s.io/cluster-api-aws/cluster-api-aws-controller:v2.6.1";
pub const DEFAULT_AUTOSCALER_IMAGE: &str =
    "registry.k8s.io/autoscaling/cluster-autoscaler:v1.31.0";
pub const DEFAULT_RELEASE_IMAGE: &str =
    "quay.io/openshift-release-dev/ocp-release:4.17.0-x86_64";
pub const DEFAULT_UID_RANGE_MIN: i64 = 1001;
pub const DEFAULT_UID_RANGE_SIZE: i64 = 10000;

#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Restrict watches to one namespace; `None` is cluster-wide
    pub watch_namespace: Option<String>,
    pub control_plane_operator_image: String,
    pub capi_manager_image: String,
    pub capi_provider_aws_image: String,
    pub autoscaler_image: String,
    pub default_release_image: String,
    pub enable_autoprovision: bool,
    pub enable_karpenter: bool,
    pub uid_range_min: i64,
    pub uid_range_size: i64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            control_plane_operator_image: DEFAULT_CONTROL_PLANE_OPERATOR_IMAGE.to_string(),
            capi_manager_image: DEFAULT_CAPI_MANAGER_IMAGE.to_string(),
            capi_provider_aws_image: DEFAULT_CAPI_PROVIDER_AWS_IMAGE.to_string(),
            autoscaler_image: DEFAULT_AUTOSCALER_IMAGE.to_string(),
            default_release_image: DEFAULT_RELEASE_IMAGE.to_string(),
            enable_autoprovision: false,
            enable_karpenter: false,
            uid_range_min: DEFAULT_UID_RANGE_MIN,
            uid_range_size: DEFAULT_UID_RANGE_SIZE,
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: String| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default)
        };

        let config = Self {
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|v| !v.trim().is_empty()),
            control_plane_operator_image: string(
                "CONTROL_PLANE_OPERATOR_IMAGE",
                defaults.control_plane_operator_image,
            ),
            capi_manager_image: string("CAPI_MANAGER_IMAGE", defaults.capi_manager_image),
            capi_provider_aws_image: string(
                "CAPI_PROVIDER_AWS_IMAGE",
                defaults.capi_provider_aws_image,
            ),
            autoscaler_image: string("AUTOSCALER_IMAGE", defaults.autoscaler_image),
            default_release_image: string("DEFAULT_RELEASE_IMAGE", defaults.default_release_image),
            enable_autoprovision: parse_bool("ENABLE_AUTOPROVISION", lookup("ENABLE_AUTOPROVISION"))?,
            enable_karpenter: parse_bool("ENABLE_KARPENTER", lookup("ENABLE_KARPENTER"))?,
            uid_range_min: parse_int("UID_RANGE_MIN", lookup("UID_RANGE_MIN"), defaults.uid_range_min)?,
            uid_range_size: parse_int(
                "UID_RANGE_SIZE",
                lookup("UID_RANGE_SIZE"),
                defaults.uid_range_size,
            )?,
        };

        if config.uid_range_min < 0 || config.uid_range_size <= 0 {
            return Err(Error::InvalidConfig(format!(
                "UID range [{}, +{}) is empty or negative",
                config.uid_range_min, config.uid_range_size
            )));
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Result<bool> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        Some(v) => Err(Error::InvalidConfig(format!(
            "{} must be true or false, got {:?}",
            key, v
        ))),
    }
}

fn parse_int(key: &str, value: Option<String>, default: i64) -> Result<i64> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("{} must be an integer, got {:?}", key, v))),
    }
}
