pub mod client;
pub mod clock;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod oadp;
pub mod release;
pub mod resources;
pub mod webhooks;

pub use config::OperatorConfig;
pub use controller::{
    BackoffConfig, Context, Error, Result, error_policy, reconcile, reconcile_autoprovision,
    reconcile_karpenter, reconcile_key,
};
pub use crd::{HostedCluster, HostedControlPlane, NodePool};
pub use health::{HealthState, Metrics};
pub use webhooks::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, WebhookState,
    run_webhook_server,
};

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::Controller;
use kube::runtime::controller::{Action, Error as ControllerError};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::{Config as WatcherConfig, Error as WatcherError};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;

use crate::client::{KubeObjectClient, ObjectClient, parent_from_annotations};
use crate::release::{ReleaseProvider, StaticReleaseProvider};
use crate::resources::common::FIELD_MANAGER;

/// Api over the configured watch namespace, or every namespace when unset
fn watch_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    namespace.map_or_else(|| Api::all(client.clone()), |ns| Api::namespaced(client.clone(), ns))
}

type RunResult = std::result::Result<(ObjectRef<HostedCluster>, Action), ControllerError<Error, WatcherError>>;

/// A HostedCluster that vanished mid-pass is expected churn, not a failure
async fn log_outcome(controller: &'static str, result: RunResult) {
    match result {
        Ok((obj, _)) => tracing::debug!(controller, name = %obj.name, "Reconciled"),
        Err(ControllerError::ReconcilerFailed(err, obj)) if err.is_not_found() => {
            tracing::debug!(controller, name = %obj.name, "HostedCluster gone before reconcile finished: {}", err);
        }
        Err(e) => tracing::error!(controller, "Reconciliation error: {:?}", e),
    }
}

/// Map a child object back to the HostedCluster named in its parent annotation
pub fn enqueue_parent<K: Resource>(obj: K) -> Option<ObjectRef<HostedCluster>> {
    let (namespace, name) = parent_from_annotations(obj.annotations())?;
    Some(ObjectRef::new(&name).within(&namespace))
}

/// Build the shared controller context backed by the live API server
pub fn build_context(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) -> Context {
    let object_client: Arc<dyn ObjectClient> = Arc::new(KubeObjectClient::new(client));
    let releases: Arc<dyn ReleaseProvider> =
        Arc::new(StaticReleaseProvider::new(config.default_release_image.clone()));
    let ctx = Context::new(object_client, config, releases);
    match health_state {
        Some(state) => ctx.with_health_state(state),
        None => ctx,
    }
}

/// Run the HostedCluster controller and, when enabled, the auxiliary ones.
///
/// Returns once every controller stream has ended, which should not happen
/// in normal operation.
pub async fn run_controller(ctx: Arc<Context>, client: Client) {
    let namespace = ctx.config.watch_namespace.clone();
    let scope_msg = namespace.as_deref().unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for HostedCluster resources (scope: {})",
        scope_msg
    );

    if let Err(e) = ctx
        .uid_allocator
        .initialize_from_namespaces(ctx.client.as_ref())
        .await
    {
        tracing::error!("Failed to seed UID allocator from existing namespaces: {}", e);
    }

    if let Some(state) = &ctx.health_state {
        state.set_ready(true).await;
    }

    let main = run_hosted_cluster_controller(ctx.clone(), client.clone(), namespace.clone());
    let karpenter = async {
        if ctx.config.enable_karpenter {
            run_aux_controller(
                "karpenter",
                ctx.clone(),
                client.clone(),
                namespace.clone(),
                reconcile_karpenter,
            )
            .await;
        }
    };
    let autoprovision = async {
        if ctx.config.enable_autoprovision {
            run_aux_controller(
                "autoprovision",
                ctx.clone(),
                client.clone(),
                namespace.clone(),
                reconcile_autoprovision,
            )
            .await;
        }
    };

    futures::join!(main, karpenter, autoprovision);
}

async fn run_hosted_cluster_controller(ctx: Arc<Context>, client: Client, namespace: Option<String>) {
    let clusters: Api<HostedCluster> = watch_api(client.clone(), namespace.as_deref());
    let node_pools: Api<NodePool> = watch_api(client.clone(), namespace.as_deref());
    // Control plane objects live in per-cluster namespaces outside any watch scope
    let control_planes: Api<HostedControlPlane> = Api::all(client.clone());
    let deployments: Api<Deployment> = Api::all(client);

    let all = || WatcherConfig::default().any_semantic();
    let managed = all().labels(&format!("app.kubernetes.io/managed-by={}", FIELD_MANAGER));

    Controller::new(clusters, all())
        .owns(node_pools, all())
        .watches(control_planes, all(), enqueue_parent)
        .watches(deployments, managed, enqueue_parent)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| log_outcome("hostedcluster", result))
        .await;

    tracing::error!("HostedCluster controller stream ended unexpectedly");
}

/// Run a HostedCluster controller that only drives one gated feature
async fn run_aux_controller<F, Fut>(
    name: &'static str,
    ctx: Arc<Context>,
    client: Client,
    namespace: Option<String>,
    reconciler: F,
) where
    F: FnMut(Arc<HostedCluster>, Arc<Context>) -> Fut,
    Fut: Future<Output = Result<Action>> + Send + 'static,
{
    tracing::info!("Starting {} controller", name);
    let clusters: Api<HostedCluster> = watch_api(client, namespace.as_deref());

    Controller::new(clusters, WatcherConfig::default().any_semantic())
        .run(reconciler, error_policy, ctx)
        .for_each(|result| log_outcome(name, result))
        .await;

    tracing::error!("{} controller stream ended unexpectedly", name);
}
