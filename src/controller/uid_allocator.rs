//! Security context UID allocation for control plane namespaces
//!
//! The authoritative record of which UIDs are taken is the UID annotation on
//! each labeled control plane namespace. The allocator keeps an in-memory
//! index of those values and rebuilds it from a namespace list on first use
//! and whenever the index is older than the refresh interval. Writing the
//! chosen UID onto a namespace is the caller's job; drift between replicas
//! is reconciled by the next refresh.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ListParams;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::{self, ObjectClient};
use crate::clock::{Clock, SystemClock};
use crate::config::{DEFAULT_UID_RANGE_MIN, DEFAULT_UID_RANGE_SIZE};
use crate::resources::common::{CONTROL_PLANE_LABEL, SECURITY_CONTEXT_UID_ANNOTATION, annotation};

use super::error::Result;

pub const REFRESH_INTERVAL_HOURS: i64 = 8;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UidAllocatorError {
    #[error("security context UID range [{min}, {max}) exhausted")]
    Exhausted { min: i64, max: i64 },
}

#[derive(Debug, Default)]
struct AllocatorState {
    allocated: BTreeSet<i64>,
    initialized: bool,
    last_refresh: Option<DateTime<Utc>>,
}

pub struct UidAllocator {
    min_uid: i64,
    max_count: i64,
    refresh_interval: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<AllocatorState>,
}

impl Default for UidAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_UID_RANGE_MIN, DEFAULT_UID_RANGE_SIZE, Arc::new(SystemClock))
    }
}

impl UidAllocator {
    pub fn new(min_uid: i64, max_count: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_uid,
            max_count,
            refresh_interval: Duration::hours(REFRESH_INTERVAL_HOURS),
            clock,
            state: Mutex::new(AllocatorState::default()),
        }
    }

    fn in_range(&self, uid: i64) -> bool {
        uid >= self.min_uid && uid < self.min_uid + self.max_count
    }

    /// Hand out the lowest UID not known to be in use
    pub async fn allocate<C: ObjectClient + ?Sized>(&self, client: &C) -> Result<i64> {
        let mut state = self.state.lock().await;

        let now = self.clock.now();
        let stale = state
            .last_refresh
            .is_none_or(|last| now - last > self.refresh_interval);
        if !state.initialized || stale {
            self.refresh_locked(&mut state, client).await?;
        }

        let uid = (self.min_uid..self.min_uid + self.max_count)
            .find(|uid| !state.allocated.contains(uid))
            .ok_or(UidAllocatorError::Exhausted {
                min: self.min_uid,
                max: self.min_uid + self.max_count,
            })?;
        state.allocated.insert(uid);
        debug!(uid, "allocated security context UID");
        Ok(uid)
    }

    /// Rebuild the index from the cluster regardless of its age
    pub async fn initialize_from_namespaces<C: ObjectClient + ?Sized>(&self, client: &C) -> Result<()> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state, client).await
    }

    /// UIDs currently recorded as taken
    pub async fn allocated(&self) -> BTreeSet<i64> {
        self.state.lock().await.allocated.clone()
    }

    async fn refresh_locked<C: ObjectClient + ?Sized>(
        &self,
        state: &mut AllocatorState,
        client: &C,
    ) -> Result<()> {
        let selector = format!("{}=true", CONTROL_PLANE_LABEL);
        let namespaces: Vec<Namespace> =
            client::list(client, None, &ListParams::default().labels(&selector)).await?;

        let observed: BTreeSet<i64> = namespaces
            .iter()
            .filter_map(|ns| annotation(&ns.metadata, SECURITY_CONTEXT_UID_ANNOTATION))
            .filter_map(|value| value.trim().parse::<i64>().ok())
            .filter(|uid| self.in_range(*uid))
            .collect();

        info!(
            namespaces = namespaces.len(),
            allocated = observed.len(),
            "refreshed security context UID index"
        );
        state.allocated = observed;
        state.initialized = true;
        state.last_refresh = Some(self.clock.now());
        Ok(())
    }
}
