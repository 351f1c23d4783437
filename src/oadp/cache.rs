//! TTL cache over Velero Backup objects
//!
//! Entries for a namespace live for the default TTL, or for the short TTL
//! while any cached backup has a non-terminal phase so that progress is
//! picked up promptly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::api::{ApiResource, DynamicObject, ListParams};
use tokio::sync::RwLock;
use tracing::debug;

use crate::client::ObjectClient;
use crate::clock::{Clock, SystemClock};
use crate::controller::error::{Error, Result};

pub const DEFAULT_TTL: Duration = Duration::from_secs(150);
pub const IN_PROGRESS_TTL: Duration = Duration::from_secs(30);

/// Phases after which a backup no longer changes
pub const TERMINAL_PHASES: [&str; 4] = ["Completed", "Failed", "PartiallyFailed", "Deleted"];

pub fn backup_phase(backup: &DynamicObject) -> Option<&str> {
    backup.data.get("status")?.get("phase")?.as_str()
}

pub fn is_terminal_phase(phase: &str) -> bool {
    TERMINAL_PHASES.contains(&phase)
}

/// Backups without a phase do not count as in progress
fn has_in_progress_backups(backups: &[DynamicObject]) -> bool {
    backups
        .iter()
        .filter_map(backup_phase)
        .any(|phase| !is_terminal_phase(phase))
}

#[derive(Clone, Debug)]
struct CacheEntry {
    backups: Vec<DynamicObject>,
    timestamp: DateTime<Utc>,
}

pub struct VeleroBackupCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: RwLock<Duration>,
    clock: Arc<dyn Clock>,
}

impl Default for VeleroBackupCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl VeleroBackupCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl: RwLock::new(DEFAULT_TTL),
            clock,
        }
    }

    /// Backups in `namespace`, served from cache while the entry is fresh
    pub async fn get_backups<C: ObjectClient + ?Sized>(
        &self,
        client: &C,
        namespace: &str,
        resource: &ApiResource,
    ) -> Result<Vec<DynamicObject>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(namespace) {
                let ttl = if has_in_progress_backups(&entry.backups) {
                    IN_PROGRESS_TTL
                } else {
                    *self.default_ttl.read().await
                };
                let age = (self.clock.now() - entry.timestamp)
                    .to_std()
                    .unwrap_or_default();
                if age < ttl {
                    debug!(namespace, count = entry.backups.len(), ?age, ?ttl, "using cached Velero backups");
                    return Ok(entry.backups.clone());
                }
                debug!(namespace, ?age, ?ttl, "Velero backup cache expired");
            }
        }

        let backups = match client
            .list(resource, Some(namespace), &ListParams::default())
            .await
        {
            Ok(backups) => backups,
            Err(e) if e.is_not_found() => {
                debug!(namespace, "no Velero backups found");
                Vec::new()
            }
            Err(e) => {
                return Err(Error::BackupList {
                    namespace: namespace.to_string(),
                    source: Box::new(e),
                });
            }
        };

        self.entries.write().await.insert(
            namespace.to_string(),
            CacheEntry {
                backups: backups.clone(),
                timestamp: self.clock.now(),
            },
        );
        debug!(namespace, count = backups.len(), "cached fresh Velero backups");
        Ok(backups)
    }

    pub async fn clear_namespace(&self, namespace: &str) {
        self.entries.write().await.remove(namespace);
    }

    pub async fn clear_all(&self) {
        self.entries.write().await.clear();
    }

    pub async fn set_ttl(&self, ttl: Duration) {
        *self.default_ttl.write().await = ttl;
    }

    pub async fn ttl(&self) -> Duration {
        *self.default_ttl.read().await
    }
}
