//! OADP backup integration
//!
//! The OADP plugin pauses a HostedCluster while Velero backs it up and marks
//! it with audit annotations. If the backup hangs or Velero goes away, the
//! operator detects it here and resumes the cluster.

pub mod cache;
pub mod recovery;

pub use cache::{VeleroBackupCache, backup_phase, is_terminal_phase};
pub use recovery::{check_oadp_recovery, has_oadp_pause_annotations, resume_cluster};

use kube::api::{ApiResource, GroupVersionKind};

/// Namespace the OADP operator keeps Velero backups in
pub const BACKUP_NAMESPACE: &str = "openshift-adp";

pub fn backup_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("velero.io", "v1", "Backup"))
}
