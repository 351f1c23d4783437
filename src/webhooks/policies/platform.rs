//! Platform policies
//!
//! - KubeVirt clusters need a 4.14 or newer release
//! - The KubeVirt VM JSON patch annotation must be a well-formed patch list

use serde_json::Value;

use crate::crd::PlatformType;
use crate::release::Version;
use crate::resources::common::{
    KUBEVIRT_JSON_PATCH_ANNOTATION, SKIP_RELEASE_IMAGE_VALIDATION_ANNOTATION, annotation,
};

use super::{ValidationContext, ValidationResult};

const KUBEVIRT_MIN_VERSION: Version = Version::new(4, 14, 0);

pub fn validate_platform(ctx: &ValidationContext) -> ValidationResult {
    let cluster = ctx.cluster;
    if cluster.spec.platform.type_ != PlatformType::KubeVirt {
        return ValidationResult::allowed();
    }
    if annotation(&cluster.metadata, SKIP_RELEASE_IMAGE_VALIDATION_ANNOTATION).is_some() {
        return ValidationResult::allowed();
    }

    match ctx.release_version {
        Some(version) if version >= KUBEVIRT_MIN_VERSION => ValidationResult::allowed(),
        Some(version) => ValidationResult::denied(
            "UnsupportedReleaseVersion",
            &format!(
                "the minimum version supported for platform KubeVirt is {}, got {}",
                KUBEVIRT_MIN_VERSION, version
            ),
        ),
        None => ValidationResult::denied(
            "UnknownReleaseVersion",
            &format!(
                "could not determine the version of release image {}",
                cluster.spec.release.image
            ),
        ),
    }
}

/// Check the JSON patch annotation decodes as a list of operations
pub fn validate_json_patch_annotation(ctx: &ValidationContext) -> ValidationResult {
    let Some(raw) = annotation(&ctx.cluster.metadata, KUBEVIRT_JSON_PATCH_ANNOTATION) else {
        return ValidationResult::allowed();
    };

    match check_json_patch(raw) {
        Ok(()) => ValidationResult::allowed(),
        Err(message) => ValidationResult::denied(
            "InvalidJSONPatch",
            &format!("{} annotation: {}", KUBEVIRT_JSON_PATCH_ANNOTATION, message),
        ),
    }
}

fn check_json_patch(raw: &str) -> Result<(), String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))?;
    let operations = value
        .as_array()
        .ok_or_else(|| "expected a JSON array of patch operations".to_string())?;

    for (i, op) in operations.iter().enumerate() {
        let op = op
            .as_object()
            .ok_or_else(|| format!("operation {} is not an object", i))?;
        for field in ["op", "path", "value"] {
            if !op.contains_key(field) {
                return Err(format!("operation {} is missing the {:?} field", i, field));
            }
        }
    }
    Ok(())
}
