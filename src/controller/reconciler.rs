//! Reconciliation logic for HostedCluster resources
//!
//! A pass runs in a fixed order: status first, then the finalizer, then the
//! dependent objects. Status stays observable when dependents fail, and the
//! finalizer is never added before there is anything to clean up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::ResourceExt;
use kube::api::DynamicObject;
use kube::runtime::controller::Action;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};

use crate::client::{
    self, CreateOrUpdate, ObjectClient, OperationResult, ParentAnnotatingUpsert, Upsert,
    annotate_parent, create_or_update_dynamic,
};
use crate::clock::{Clock, format_time};
use crate::crd::{
    HostedCluster, HostedClusterStatus, HostedControlPlane, LocalObjectReference, NodePool,
    UpdateState,
};
use crate::oadp::{check_oadp_recovery, has_oadp_pause_annotations, resume_cluster};
use crate::resources::common::{
    ACK_NETWORKING_DISRUPTION_ANNOTATION, FINALIZER, HAS_BEEN_AVAILABLE_ANNOTATION, annotation,
    has_finalizer, object_key,
};
use crate::resources::mirror::{
    KUBECONFIG_KEY, PROVIDER_CREDS, PULL_SECRET, SSH_KEY, admin_kubeconfig_name, merge_meta,
    mirror_kubeconfig, mirror_secret, mirror_trust_bundle,
};
use crate::resources::namespace::{
    apply_control_plane_namespace, control_plane_namespace, security_context_uid,
};
use crate::resources::operand::{self, OperandSpec};
use crate::resources::{
    autoscaler, capi, control_plane_operator, hosted_control_plane, node_pool,
};

use super::cluster_metrics::compute_cluster_metrics;
use super::context::Context;
use super::deletion::delete_hosted_cluster;
use super::error::{BackoffConfig, Error, Result};
use super::pause::{PauseState, pause_state};
use super::rollout::{compute_cluster_version_status, compute_hosted_cluster_availability};
use super::status::{
    ConditionBuilder, StatusManager, condition_reasons, condition_status, condition_types,
};

/// Resync interval for clusters with nothing pending
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Main reconciliation function
#[instrument(skip(hc, ctx), fields(name = %hc.name_any(), namespace = hc.namespace().unwrap_or_default()))]
pub async fn reconcile(hc: Arc<HostedCluster>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = hc.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = hc.name_any();

    let start = Instant::now();
    let result = reconcile_key(&ctx, &namespace, &name).await;

    if let Some(state) = &ctx.health_state {
        state
            .metrics
            .record_reconcile(&namespace, &name, start.elapsed().as_secs_f64());
        if result.is_err() {
            state.metrics.record_error(&namespace, &name);
        }
    }
    if result.is_ok() {
        ctx.reset_failures(&object_key(&namespace, &name));
    }
    result
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(hc: Arc<HostedCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = object_key(&hc.namespace().unwrap_or_default(), &hc.name_any());
    let attempt = ctx.record_failure(&key);
    let delay = BackoffConfig::default().delay_for_error(error, attempt);

    if error.is_conflict() {
        debug!(cluster = %key, "conflict, requeueing immediately");
    } else if error.is_retryable() {
        warn!(cluster = %key, attempt, "retryable error: {}, requeuing in {:?}", error, delay);
    } else {
        error!(cluster = %key, attempt, "reconcile failed: {}, requeuing in {:?}", error, delay);
    }

    Action::requeue(delay)
}

/// Reconcile the HostedCluster stored under `namespace/name`
pub async fn reconcile_key(ctx: &Context, namespace: &str, name: &str) -> Result<Action> {
    let client = ctx.client.as_ref();

    let Some(hc) = client::get_opt::<HostedCluster, _>(client, Some(namespace), name).await? else {
        debug!("hosted cluster no longer exists");
        if let Some(state) = &ctx.health_state {
            state.metrics.clear_cluster_metrics(namespace, name);
        }
        return Ok(Action::await_change());
    };

    if hc.metadata.deletion_timestamp.is_some() {
        record_cluster_metrics(ctx, &hc);
        return delete_hosted_cluster(client, &hc).await;
    }

    let pause = pause_state(hc.spec.paused_until.as_deref(), ctx.clock.now());
    if pause.is_paused() {
        return reconcile_paused(ctx, &hc, pause).await;
    }

    let cp_namespace = hc.control_plane_namespace();
    let hcp: Option<HostedControlPlane> =
        client::get_opt(client, Some(&cp_namespace), name).await?;

    let hc = match update_status(ctx, &hc, hcp.as_ref()).await {
        Ok(hc) => hc,
        Err(e) if e.is_conflict() => {
            debug!("status update conflicted, requeueing");
            return Ok(Action::requeue(Duration::ZERO));
        }
        Err(e) => return Err(e),
    };
    let hc = mark_has_been_available(client, hc).await?;

    let hc = if has_finalizer(&hc.metadata, FINALIZER) {
        hc
    } else {
        match add_finalizer(client, &hc).await {
            Ok(hc) => hc,
            Err(e) if e.is_conflict() => {
                debug!("finalizer update conflicted, requeueing");
                return Ok(Action::requeue(Duration::ZERO));
            }
            Err(e) => return Err(e),
        }
    };

    let hc = reconcile_dependents(ctx, hc).await?;
    record_cluster_metrics(ctx, &hc);

    info!("reconciled hosted cluster");
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Status the HostedCluster should report given its control plane
///
/// `kubeconfig` names the published admin kubeconfig, if any.
pub fn desired_status(
    clock: &dyn Clock,
    hc: &HostedCluster,
    hcp: Option<&HostedControlPlane>,
    kubeconfig: Option<LocalObjectReference>,
) -> HostedClusterStatus {
    let mut status = hc.status.clone().unwrap_or_default();
    status.kube_config = kubeconfig;

    let mut observed = hc.clone();
    observed.status = Some(status.clone());
    let version = compute_cluster_version_status(clock, &observed, hcp);
    let available = compute_hosted_cluster_availability(&observed, hcp);

    let (progressing, reason, message) = match version.history.first() {
        Some(latest) if latest.state == UpdateState::Partial => (
            condition_status::TRUE,
            condition_reasons::RELEASE_ROLLING_OUT,
            format!("Working towards {}", latest.image),
        ),
        Some(latest) => (
            condition_status::FALSE,
            condition_reasons::AS_EXPECTED,
            format!("Cluster version is {}", latest.version),
        ),
        None => (condition_status::UNKNOWN, condition_reasons::AS_EXPECTED, String::new()),
    };

    let now = format_time(clock.now());
    status.conditions =
        ConditionBuilder::from_existing(std::mem::take(&mut status.conditions), hc.metadata.generation, &now)
            .with_condition(&available)
            .set_condition(condition_types::CLUSTER_VERSION_PROGRESSING, progressing, reason, &message)
            .set_condition(
                condition_types::RECONCILIATION_PAUSED,
                condition_status::FALSE,
                condition_reasons::AS_EXPECTED,
                "Reconciliation active on resource",
            )
            .build();
    status.version = Some(version);
    status
}

/// Recompute and persist status. Returns the HostedCluster as stored.
async fn update_status(
    ctx: &Context,
    hc: &HostedCluster,
    hcp: Option<&HostedControlPlane>,
) -> Result<HostedCluster> {
    let client = ctx.client.as_ref();
    let kubeconfig_name = admin_kubeconfig_name(&hc.name_any());
    let kubeconfig = client::get_opt::<Secret, _>(client, hc.namespace().as_deref(), &kubeconfig_name)
        .await?
        .map(|_| LocalObjectReference::new(kubeconfig_name));

    let status = desired_status(ctx.clock.as_ref(), hc, hcp, kubeconfig);
    match StatusManager::new(hc, client).update(status).await? {
        Some(updated) => {
            debug!("updated status");
            Ok(updated)
        }
        None => Ok(hc.clone()),
    }
}

/// Merge-patch annotations, guarded by the resource version that was read.
/// A `null` value removes the annotation.
async fn patch_annotations<C: ObjectClient + ?Sized>(
    client: &C,
    hc: &HostedCluster,
    annotations: Value,
) -> Result<HostedCluster> {
    let patch = json!({
        "metadata": {
            "resourceVersion": hc.resource_version(),
            "annotations": annotations,
        }
    });
    client::merge_patch(client, hc.namespace().as_deref(), &hc.name_any(), patch).await
}

async fn mark_has_been_available<C: ObjectClient + ?Sized>(
    client: &C,
    hc: HostedCluster,
) -> Result<HostedCluster> {
    if !hc.condition_is_true(condition_types::AVAILABLE)
        || annotation(&hc.metadata, HAS_BEEN_AVAILABLE_ANNOTATION).is_some()
    {
        return Ok(hc);
    }
    info!("hosted cluster became available");
    patch_annotations(client, &hc, json!({HAS_BEEN_AVAILABLE_ANNOTATION: "true"})).await
}

async fn add_finalizer<C: ObjectClient + ?Sized>(client: &C, hc: &HostedCluster) -> Result<HostedCluster> {
    let mut finalizers = hc.finalizers().to_vec();
    finalizers.push(FINALIZER.to_string());
    let patch = json!({
        "metadata": {
            "resourceVersion": hc.resource_version(),
            "finalizers": finalizers,
        }
    });
    let updated = client::merge_patch(client, hc.namespace().as_deref(), &hc.name_any(), patch).await?;
    info!("added finalizer");
    Ok(updated)
}

/// Handle a paused HostedCluster: recover from a hung OADP backup if possible,
/// otherwise report the pause and come back later
async fn reconcile_paused(ctx: &Context, hc: &HostedCluster, pause: PauseState) -> Result<Action> {
    let client = ctx.client.as_ref();
    let namespace = hc.namespace().unwrap_or_default();

    if has_oadp_pause_annotations(hc) && check_oadp_recovery(client, &ctx.backup_cache, hc).await? {
        let upsert = ParentAnnotatingUpsert::new(Upsert::new(client), &namespace, &hc.name_any());
        resume_cluster(client, &upsert, hc).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    let mut status = hc.status.clone().unwrap_or_default();
    let now = format_time(ctx.clock.now());
    let message = match pause {
        PauseState::Until(until) => format!("Reconciliation paused until: {}", format_time(until)),
        _ => "Reconciliation paused".to_string(),
    };
    status.conditions =
        ConditionBuilder::from_existing(std::mem::take(&mut status.conditions), hc.metadata.generation, &now)
            .set_condition(
                condition_types::RECONCILIATION_PAUSED,
                condition_status::TRUE,
                condition_reasons::RECONCILIATION_PAUSED,
                &message,
            )
            .build();
    match StatusManager::new(hc, client).update(status).await {
        Ok(_) => {}
        Err(e) if e.is_conflict() => return Ok(Action::requeue(Duration::ZERO)),
        Err(e) => return Err(e),
    }

    let requeue = pause.requeue_after(ctx.clock.now()).unwrap_or(RESYNC_INTERVAL);
    info!(requeue_after = ?requeue, "reconciliation paused");
    Ok(Action::requeue(requeue))
}

/// Create or refresh everything the HostedCluster owns
async fn reconcile_dependents(ctx: &Context, hc: HostedCluster) -> Result<HostedCluster> {
    let client = ctx.client.as_ref();
    let namespace = hc.namespace().unwrap_or_default();
    let name = hc.name_any();
    let cp_namespace = hc.control_plane_namespace();
    let upsert = ParentAnnotatingUpsert::new(Upsert::new(client), &namespace, &name);

    let uid = reconcile_namespace(ctx, &upsert, &hc).await?;

    mirror_secret(client, &upsert, &hc, &hc.spec.pull_secret.name, &cp_namespace, &PULL_SECRET).await?;
    if let Some(creds) = &hc.spec.provider_creds {
        mirror_secret(client, &upsert, &hc, &creds.name, &cp_namespace, &PROVIDER_CREDS).await?;
    }
    if let Some(ssh_key) = &hc.spec.ssh_key {
        mirror_secret(client, &upsert, &hc, &ssh_key.name, &cp_namespace, &SSH_KEY).await?;
    }
    mirror_trust_bundle(client, &upsert, &hc, &cp_namespace).await?;

    if hc.spec.initial_compute_replicas > 0 {
        let mut np = node_pool::default_node_pool(&hc);
        if upsert.create_or_update(&mut np, |_: &mut NodePool| {}).await? == OperationResult::Created {
            info!(node_pool = %np.name_any(), "created default node pool");
        }
    }

    reconcile_capi_cluster(client, &hc, &namespace, &cp_namespace).await?;

    let mut hcp = hosted_control_plane::hosted_control_plane(&hc);
    let result = upsert
        .create_or_update(&mut hcp, |live: &mut HostedControlPlane| {
            hosted_control_plane::apply_hosted_control_plane_spec(live, &hc);
        })
        .await?;
    debug!(?result, "reconciled hosted control plane");

    let mut hc = hc;
    if annotation(&hc.metadata, ACK_NETWORKING_DISRUPTION_ANNOTATION).is_some() {
        hc = patch_annotations(client, &hc, json!({ACK_NETWORKING_DISRUPTION_ANNOTATION: null})).await?;
        info!("consumed networking disruption acknowledgement");
    }

    let kubeconfig = hcp.status.as_ref().and_then(|s| s.kube_config.clone());
    if let Some(source) = &kubeconfig {
        let key = if source.key.is_empty() { KUBECONFIG_KEY } else { source.key.as_str() };
        mirror_kubeconfig(client, &upsert, &hc, &cp_namespace, &source.name, key).await?;
        let published = hc.status.as_ref().is_some_and(|s| s.kube_config.is_some());
        if !published {
            hc = update_status(ctx, &hc, Some(&hcp)).await?;
            hc = mark_has_been_available(client, hc).await?;
        }
    }

    reconcile_operand(
        &upsert,
        capi::manager_spec(&ctx.config, &hc, &cp_namespace, Some(uid)),
        capi::manager_rules(),
    )
    .await?;
    if let Some(spec) = capi::provider_spec(&ctx.config, &hc, &cp_namespace, Some(uid)) {
        reconcile_operand(&upsert, spec, capi::provider_rules()).await?;
    }

    match &kubeconfig {
        Some(source) if !autoscaler::is_disabled(&hc) => {
            let spec = autoscaler::operand_spec(&ctx.config, &hc, &cp_namespace, &source.name, Some(uid));
            reconcile_operand(&upsert, spec, autoscaler::rules()).await?;
        }
        Some(_) => debug!("cluster autoscaler disabled by annotation"),
        None => debug!("cluster autoscaler waiting for kubeconfig"),
    }

    reconcile_operand(
        &upsert,
        control_plane_operator::operand_spec(&ctx.config, &hc, &cp_namespace, Some(uid)),
        control_plane_operator::rules(),
    )
    .await?;

    Ok(hc)
}

/// Ensure the control plane namespace exists and carries a UID. Returns the UID.
async fn reconcile_namespace<U: CreateOrUpdate>(
    ctx: &Context,
    upsert: &U,
    hc: &HostedCluster,
) -> Result<i64> {
    let client = ctx.client.as_ref();
    let desired = control_plane_namespace(hc);
    let existing: Option<Namespace> = client::get_opt(client, None, &desired.name_any()).await?;

    let uid = match existing.as_ref().and_then(security_context_uid) {
        Some(uid) => uid,
        None => ctx.uid_allocator.allocate(client).await?,
    };

    let mut ns = desired.clone();
    let result = upsert
        .create_or_update(&mut ns, |live: &mut Namespace| {
            apply_control_plane_namespace(live, &desired, Some(uid));
        })
        .await?;
    if result == OperationResult::Created {
        info!(namespace = %ns.name_any(), uid, "created control plane namespace");
    }

    // The annotation on the live namespace wins over a fresh allocation
    Ok(security_context_uid(&ns).unwrap_or(uid))
}

async fn reconcile_capi_cluster<C: ObjectClient + ?Sized>(
    client: &C,
    hc: &HostedCluster,
    namespace: &str,
    cp_namespace: &str,
) -> Result<()> {
    let parent = object_key(namespace, &hc.name_any());

    let (infra_resource, mut infra): (_, DynamicObject) = capi::infra_cluster(hc, cp_namespace);
    annotate_parent(&mut infra, &parent);
    create_or_update_dynamic(client, &infra_resource, &infra).await?;

    let mut cluster = capi::capi_cluster(hc, cp_namespace);
    annotate_parent(&mut cluster, &parent);
    create_or_update_dynamic(client, &capi::cluster_resource(), &cluster).await?;
    Ok(())
}

/// ServiceAccount, Role, RoleBinding and Deployment for one operand
async fn reconcile_operand<U: CreateOrUpdate>(
    upsert: &U,
    spec: OperandSpec,
    rules: Vec<PolicyRule>,
) -> Result<()> {
    let desired = operand::service_account(&spec);
    let mut sa = desired.clone();
    upsert
        .create_or_update(&mut sa, |live| merge_meta(&mut live.metadata, &desired.metadata))
        .await?;

    let desired = operand::role(&spec, rules);
    let mut role = desired.clone();
    upsert
        .create_or_update(&mut role, |live| {
            merge_meta(&mut live.metadata, &desired.metadata);
            live.rules = desired.rules.clone();
        })
        .await?;

    let desired = operand::role_binding(&spec);
    let mut binding = desired.clone();
    upsert
        .create_or_update(&mut binding, |live| {
            merge_meta(&mut live.metadata, &desired.metadata);
            live.subjects = desired.subjects.clone();
        })
        .await?;

    let desired = operand::deployment(&spec);
    let mut deployment = desired.clone();
    let result = upsert
        .create_or_update(&mut deployment, |live| {
            merge_meta(&mut live.metadata, &desired.metadata);
            live.spec = desired.spec.clone();
        })
        .await?;
    if result != OperationResult::None {
        info!(operand = %spec.name, ?result, "reconciled operand");
    }
    Ok(())
}

fn record_cluster_metrics(ctx: &Context, hc: &HostedCluster) {
    if let Some(state) = &ctx.health_state {
        let values = compute_cluster_metrics(hc, ctx.clock.now());
        state.metrics.set_cluster_metrics(
            &hc.namespace().unwrap_or_default(),
            &hc.name_any(),
            &hc.spec.cluster_id,
            &values,
        );
    }
}
