//! Decide whether an OADP-paused HostedCluster can be resumed, and resume it

use kube::ResourceExt;
use kube::api::{DynamicObject, ListParams};
use tracing::{debug, info};

use super::cache::{VeleroBackupCache, backup_phase, is_terminal_phase};
use super::{BACKUP_NAMESPACE, backup_resource};
use crate::client::{self, CreateOrUpdate, ObjectClient};
use crate::controller::error::Result;
use crate::crd::{HostedCluster, NodePool};
use crate::resources::common::{
    OADP_PAUSED_AT_ANNOTATION, OADP_PAUSED_BY_ANNOTATION, OADP_PLUGIN_AUTHOR, annotation,
};

pub fn has_oadp_pause_annotations(hc: &HostedCluster) -> bool {
    annotation(&hc.metadata, OADP_PAUSED_BY_ANNOTATION) == Some(OADP_PLUGIN_AUTHOR)
        && annotation(&hc.metadata, OADP_PAUSED_AT_ANNOTATION).is_some_and(|at| !at.is_empty())
}

/// Name or included-namespace match. Substring matching on names can pick up
/// another cluster sharing a prefix; that is known and kept.
pub fn is_backup_related(backup: &DynamicObject, hc: &HostedCluster) -> bool {
    let name = hc.name_any();
    let namespace = hc.namespace().unwrap_or_default();
    let control_plane_namespace = format!("{}-{}", namespace, name);

    let backup_name = backup.name_any();
    if backup_name.contains(&name) || backup_name.contains(&control_plane_namespace) {
        return true;
    }

    backup
        .data
        .get("spec")
        .and_then(|spec| spec.get("includedNamespaces"))
        .and_then(|v| v.as_array())
        .is_some_and(|included| {
            included
                .iter()
                .filter_map(|ns| ns.as_str())
                .any(|ns| ns == namespace || ns == control_plane_namespace)
        })
}

/// Most recent related backup in the OADP namespace
async fn find_last_related_backup<C: ObjectClient + ?Sized>(
    client: &C,
    cache: &VeleroBackupCache,
    hc: &HostedCluster,
) -> Result<Option<DynamicObject>> {
    let backups = cache
        .get_backups(client, BACKUP_NAMESPACE, &backup_resource())
        .await?;

    let mut related: Vec<DynamicObject> = backups
        .into_iter()
        .filter(|b| is_backup_related(b, hc))
        .collect();
    debug!(cluster = %hc.name_any(), related = related.len(), "filtered Velero backups");

    related.sort_by(|a, b| {
        let created = |o: &DynamicObject| o.metadata.creation_timestamp.as_ref().map(|t| t.0);
        created(b).cmp(&created(a))
    });
    Ok(related.into_iter().next())
}

/// Whether a cluster paused by the OADP plugin may be unpaused
pub async fn check_oadp_recovery<C: ObjectClient + ?Sized>(
    client: &C,
    cache: &VeleroBackupCache,
    hc: &HostedCluster,
) -> Result<bool> {
    if !has_oadp_pause_annotations(hc) {
        debug!(cluster = %hc.name_any(), "not paused by the OADP plugin");
        return Ok(false);
    }

    let Some(backup) = find_last_related_backup(client, cache, hc).await? else {
        debug!(cluster = %hc.name_any(), "no related backups for OADP-paused cluster");
        return Ok(true);
    };

    let phase = backup_phase(&backup).unwrap_or_default();
    if is_terminal_phase(phase) {
        debug!(
            cluster = %hc.name_any(),
            backup = %backup.name_any(),
            phase,
            "last related backup is terminal"
        );
        cache.clear_namespace(BACKUP_NAMESPACE).await;
        return Ok(true);
    }

    debug!(
        cluster = %hc.name_any(),
        backup = %backup.name_any(),
        phase,
        "last related backup still in progress"
    );
    Ok(false)
}

fn scrub_annotations(meta: &mut kube::api::ObjectMeta) {
    if let Some(annotations) = meta.annotations.as_mut() {
        annotations.remove(OADP_PAUSED_BY_ANNOTATION);
        annotations.remove(OADP_PAUSED_AT_ANNOTATION);
    }
}

/// Strip the OADP markers and unpause the HostedCluster and its NodePools
pub async fn resume_cluster<C, U>(client: &C, upsert: &U, hc: &HostedCluster) -> Result<()>
where
    C: ObjectClient + ?Sized,
    U: CreateOrUpdate,
{
    info!(
        cluster = %hc.name_any(),
        paused_at = annotation(&hc.metadata, OADP_PAUSED_AT_ANNOTATION).unwrap_or_default(),
        "resuming cluster from hung OADP backup"
    );

    let mut updated = hc.clone();
    upsert
        .create_or_update(&mut updated, |obj: &mut HostedCluster| {
            scrub_annotations(&mut obj.metadata);
            obj.spec.paused_until = None;
        })
        .await?;

    let namespace = hc.namespace().unwrap_or_default();
    let name = hc.name_any();
    let node_pools: Vec<NodePool> =
        client::list(client, Some(&namespace), &ListParams::default()).await?;
    let mut resumed = 0;
    for mut node_pool in node_pools
        .into_iter()
        .filter(|np| np.spec.cluster_name == name)
    {
        upsert
            .create_or_update(&mut node_pool, |obj: &mut NodePool| {
                scrub_annotations(&mut obj.metadata);
                obj.spec.paused_until = None;
            })
            .await?;
        resumed += 1;
    }

    info!(cluster = %name, node_pools = resumed, "resumed cluster and node pools from OADP pause");
    Ok(())
}
