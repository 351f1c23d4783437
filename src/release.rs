//! Release image metadata
//!
//! Resolving a release payload is done by an external service; the operator
//! only needs the version string and a few component image references.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::controller::error::{Error, Result};

/// Component image names looked up in release payloads
pub const HAPROXY_ROUTER_COMPONENT: &str = "haproxy-router";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseImage {
    pub image: String,
    pub version: String,
    /// Component name to image pull spec
    pub component_images: BTreeMap<String, String>,
}

impl ReleaseImage {
    pub fn semantic_version(&self) -> Option<Version> {
        Version::parse(&self.version)
    }

    pub fn component_image(&self, name: &str) -> Option<&str> {
        self.component_images.get(name).map(String::as_str)
    }
}

#[async_trait]
pub trait ReleaseProvider: Send + Sync {
    /// Resolve metadata for a release image
    async fn lookup(&self, image: &str, pull_secret: &[u8]) -> Result<ReleaseImage>;

    /// Release image used when a HostedCluster does not name one
    async fn default_release_image(&self) -> Result<String>;
}

/// Release provider backed by a fixed table, with versions parsed from image
/// tags for images it has not been told about
#[derive(Debug, Default)]
pub struct StaticReleaseProvider {
    default_image: String,
    releases: RwLock<HashMap<String, ReleaseImage>>,
}

impl StaticReleaseProvider {
    pub fn new(default_image: impl Into<String>) -> Self {
        Self {
            default_image: default_image.into(),
            releases: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_release(self, release: ReleaseImage) -> Self {
        self.insert(release);
        self
    }

    pub fn insert(&self, release: ReleaseImage) {
        if let Ok(mut releases) = self.releases.write() {
            releases.insert(release.image.clone(), release);
        }
    }
}

#[async_trait]
impl ReleaseProvider for StaticReleaseProvider {
    async fn lookup(&self, image: &str, _pull_secret: &[u8]) -> Result<ReleaseImage> {
        if let Some(release) = self
            .releases
            .read()
            .ok()
            .and_then(|releases| releases.get(image).cloned())
        {
            return Ok(release);
        }

        let version = version_from_image_tag(image).ok_or_else(|| {
            Error::ReleaseLookup(format!("no metadata for release image {}", image))
        })?;
        Ok(ReleaseImage {
            image: image.to_string(),
            version,
            component_images: BTreeMap::new(),
        })
    }

    async fn default_release_image(&self) -> Result<String> {
        if self.default_image.is_empty() {
            return Err(Error::ReleaseLookup(
                "no default release image configured".to_string(),
            ));
        }
        Ok(self.default_image.clone())
    }
}

/// `quay.io/openshift-release-dev/ocp-release:4.17.0-x86_64` yields `4.17.0`
fn version_from_image_tag(image: &str) -> Option<String> {
    if image.contains('@') {
        return None;
    }
    let (_, tag) = image.rsplit_once(':')?;
    let version = Version::parse(tag)?;
    Some(version.to_string())
}

/// Major.minor.patch, ignoring any pre-release or build suffix
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let core = s
            .trim()
            .trim_start_matches('v')
            .split(['-', '+'])
            .next()?;
        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
