//! Error types for the HostedCluster controllers

use std::time::Duration;

use thiserror::Error;

use super::uid_allocator::UidAllocatorError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube api call failed: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed to encode or decode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("object has no {0}")]
    MissingObjectKey(&'static str),

    #[error("invalid operator configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} not found")]
    NotFound(String),

    /// A mirrored secret or configmap lacks its required key
    #[error("hostedcluster {kind} \"{name}\" must have a {key} key")]
    MissingKey {
        kind: &'static str,
        name: String,
        key: &'static str,
    },

    #[error("UID allocation failed: {0}")]
    UidAllocation(#[from] UidAllocatorError),

    #[error("Release lookup failed: {0}")]
    ReleaseLookup(String),

    #[error("error listing Velero backups in namespace {namespace}: {source}")]
    BackupList {
        namespace: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl Error {
    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube(kube::Error::Api(resp)) => Some(resp.code),
            Error::BackupList { source, .. } => source.api_code(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_)) || self.api_code() == Some(404)
    }

    /// Resource version conflict on update; handled by requeueing immediately
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }

    /// Whether another attempt could succeed without a user changing something.
    /// Client errors other than conflicts and throttling are final.
    pub fn is_retryable(&self) -> bool {
        if let Some(code) = self.api_code() {
            return !(400..500).contains(&code) || matches!(code, 409 | 429);
        }
        match self {
            Error::Kube(_) | Error::NotFound(_) | Error::ReleaseLookup(_) => true,
            Error::BackupList { source, .. } => source.is_retryable(),
            // Configuration bugs: retried, but only at the slow end of the backoff
            Error::MissingKey { .. }
            | Error::UidAllocation(_)
            | Error::InvariantViolation(_)
            | Error::InvalidConfig(_)
            | Error::Json(_)
            | Error::MissingObjectKey(_) => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Requeue delays for failed reconciles
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound, also used for errors that will not clear on their own
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay added or removed at random
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let spread = base * self.jitter * (rand::random::<f64>() * 2.0 - 1.0);
        let secs = (base + spread).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Conflicts requeue at once; other retryable errors back off exponentially
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        match (error.is_conflict(), error.is_retryable()) {
            (true, _) => Duration::ZERO,
            (false, true) => self.delay_for_attempt(attempt),
            (false, false) => self.max_delay,
        }
    }
}
