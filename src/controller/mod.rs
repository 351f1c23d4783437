pub mod autoprovision;
pub mod cluster_metrics;
pub mod context;
pub mod deletion;
pub mod error;
pub mod karpenter;
pub mod pause;
pub mod reconciler;
pub mod rollout;
pub mod status;
pub mod uid_allocator;

pub use autoprovision::reconcile_autoprovision;
pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use karpenter::{HaproxyConfigGenerator, StaticHaproxyConfig, reconcile_karpenter};
pub use reconciler::{error_policy, reconcile, reconcile_key};
pub use rollout::{compute_cluster_version_status, compute_hosted_cluster_availability};
pub use status::{ConditionBuilder, StatusManager};
pub use uid_allocator::{UidAllocator, UidAllocatorError};
