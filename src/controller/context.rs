use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::client::ObjectClient;
use crate::clock::{Clock, SystemClock};
use crate::config::OperatorConfig;
use crate::health::HealthState;
use crate::oadp::VeleroBackupCache;
use crate::release::ReleaseProvider;

use super::karpenter::{HaproxyConfigGenerator, StaticHaproxyConfig};
use super::uid_allocator::UidAllocator;

/// Shared context for the HostedCluster controllers
pub struct Context {
    /// Object store client
    pub client: Arc<dyn ObjectClient>,
    pub config: OperatorConfig,
    pub clock: Arc<dyn Clock>,
    /// Security-context UIDs for control plane namespaces
    pub uid_allocator: UidAllocator,
    /// Velero backups consulted for OADP pause recovery
    pub backup_cache: VeleroBackupCache,
    /// Release image metadata lookup
    pub releases: Arc<dyn ReleaseProvider>,
    pub haproxy: Arc<dyn HaproxyConfigGenerator>,
    /// Health state for recording metrics (optional)
    pub health_state: Option<Arc<HealthState>>,
    /// Consecutive failures per `<namespace>/<name>`, reset on success
    failures: Mutex<HashMap<String, u32>>,
}

impl Context {
    pub fn new(
        client: Arc<dyn ObjectClient>,
        config: OperatorConfig,
        releases: Arc<dyn ReleaseProvider>,
    ) -> Self {
        Self::with_clock(client, config, releases, Arc::new(SystemClock))
    }

    pub fn with_clock(
        client: Arc<dyn ObjectClient>,
        config: OperatorConfig,
        releases: Arc<dyn ReleaseProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let uid_allocator =
            UidAllocator::new(config.uid_range_min, config.uid_range_size, clock.clone());
        Self {
            client,
            config,
            uid_allocator,
            backup_cache: VeleroBackupCache::new(clock.clone()),
            clock,
            releases,
            haproxy: Arc::new(StaticHaproxyConfig),
            health_state: None,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    pub fn with_haproxy(mut self, haproxy: Arc<dyn HaproxyConfigGenerator>) -> Self {
        self.haproxy = haproxy;
        self
    }

    /// Count a failed reconcile and return how many happened in a row before it
    pub fn record_failure(&self, key: &str) -> u32 {
        let Ok(mut failures) = self.failures.lock() else {
            return 0;
        };
        let count = failures.entry(key.to_string()).or_insert(0);
        let previous = *count;
        *count = count.saturating_add(1);
        previous
    }

    pub fn reset_failures(&self, key: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(key);
        }
    }
}
