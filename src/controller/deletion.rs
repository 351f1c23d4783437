//! Cascading HostedCluster deletion
//!
//! NodePools go first, then the CAPI Cluster. The control plane namespace is
//! only removed once the Cluster is gone, and the finalizer only after that.

use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use kube::api::ListParams;
use kube::runtime::controller::Action;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::client::{self, ObjectClient};
use crate::crd::{HostedCluster, NodePool};
use crate::resources::capi;
use crate::resources::common::{
    FINALIZER, SKIP_DELETE_CONTROL_PLANE_NAMESPACE_ANNOTATION, annotation, has_finalizer,
};

use super::error::Result;

/// Requeue interval while the CAPI Cluster is being torn down
pub const DELETION_REQUEUE: Duration = Duration::from_secs(5);

/// Delete the NodePools that belong to the HostedCluster. Returns how many
/// delete calls were issued.
pub async fn delete_node_pools<C: ObjectClient + ?Sized>(client: &C, hc: &HostedCluster) -> Result<usize> {
    let namespace = hc.namespace().unwrap_or_default();
    let node_pools: Vec<NodePool> = client::list(client, Some(&namespace), &ListParams::default()).await?;

    let mut deleted = 0;
    for np in node_pools
        .iter()
        .filter(|np| np.spec.cluster_name == hc.name_any())
    {
        if client::delete::<NodePool, C>(client, Some(&namespace), &np.name_any()).await? {
            info!(node_pool = %np.name_any(), "deleted node pool");
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Run one pass of the deletion cascade
#[instrument(skip(client, hc), fields(name = %hc.name_any(), namespace = hc.namespace().unwrap_or_default()))]
pub async fn delete_hosted_cluster<C: ObjectClient + ?Sized>(client: &C, hc: &HostedCluster) -> Result<Action> {
    delete_node_pools(client, hc).await?;

    let cp_namespace = hc.control_plane_namespace();
    let cluster_name = capi::cluster_name(hc);
    if client
        .delete(&capi::cluster_resource(), Some(&cp_namespace), &cluster_name)
        .await?
    {
        info!(cluster = %cluster_name, "waiting for CAPI cluster deletion");
        return Ok(Action::requeue(DELETION_REQUEUE));
    }

    if annotation(&hc.metadata, SKIP_DELETE_CONTROL_PLANE_NAMESPACE_ANNOTATION).is_some() {
        debug!(namespace = %cp_namespace, "leaving control plane namespace in place");
    } else if client::delete::<Namespace, C>(client, None, &cp_namespace).await? {
        info!(namespace = %cp_namespace, "deleted control plane namespace");
    }

    remove_finalizer(client, hc).await?;
    Ok(Action::await_change())
}

/// Drop the operator's finalizer, guarded by the resource version that was read
pub async fn remove_finalizer<C: ObjectClient + ?Sized>(client: &C, hc: &HostedCluster) -> Result<()> {
    if !has_finalizer(&hc.metadata, FINALIZER) {
        return Ok(());
    }
    let remaining: Vec<&String> = hc.finalizers().iter().filter(|f| *f != FINALIZER).collect();
    let patch = json!({
        "metadata": {
            "resourceVersion": hc.resource_version(),
            "finalizers": remaining,
        }
    });
    client::merge_patch::<HostedCluster, C>(client, hc.namespace().as_deref(), &hc.name_any(), patch).await?;
    info!("removed finalizer");
    Ok(())
}
