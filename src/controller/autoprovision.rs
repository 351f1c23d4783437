//! Autoprovision shim NodePool
//!
//! With autoprovisioning enabled, every AWS HostedCluster gets a zero-replica
//! NodePool that stands in for capacity created outside of NodePools.

use std::sync::Arc;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{info, instrument};

use crate::client::{CreateOrUpdate, OperationResult, ParentAnnotatingUpsert, Upsert};
use crate::crd::{HostedCluster, NodePool, PlatformType};
use crate::resources::common::owner_reference;
use crate::resources::mirror::merge_meta;
use crate::resources::node_pool::autoprovision_node_pool;

use super::context::Context;
use super::error::{Error, Result};

#[instrument(skip(hc, ctx), fields(name = %hc.name_any(), namespace = hc.namespace().unwrap_or_default()))]
pub async fn reconcile_autoprovision(hc: Arc<HostedCluster>, ctx: Arc<Context>) -> Result<Action> {
    if !ctx.config.enable_autoprovision
        || hc.spec.platform.type_ != PlatformType::Aws
        || hc.metadata.deletion_timestamp.is_some()
    {
        return Ok(Action::await_change());
    }
    let namespace = hc.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

    let upsert = ParentAnnotatingUpsert::new(Upsert::new(ctx.client.as_ref()), &namespace, &hc.name_any());
    let mut desired = autoprovision_node_pool(&hc);
    desired.metadata.owner_references = Some(vec![owner_reference(&hc)]);

    let mut np = desired.clone();
    // Replicas and release are left alone once the NodePool exists
    let result = upsert
        .create_or_update(&mut np, |live: &mut NodePool| {
            merge_meta(&mut live.metadata, &desired.metadata);
            live.spec.cluster_name = desired.spec.cluster_name.clone();
            live.spec.platform.type_ = PlatformType::Aws;
        })
        .await?;
    if result == OperationResult::Created {
        info!(node_pool = %np.name_any(), "created autoprovision node pool");
    }

    Ok(Action::await_change())
}
