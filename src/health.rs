//! Probe and metrics endpoints
//!
//! Served on every replica, leader or not:
//! - `/healthz` answers as long as the process is up
//! - `/readyz` answers 200 once controllers are running and 503 during shutdown
//! - `/metrics` exposes the Prometheus registry below

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::controller::cluster_metrics::ClusterMetrics;

/// Address the probe server binds to
pub const HEALTH_ADDR: &str = "0.0.0.0:8080";

const OPENMETRICS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// `namespace`/`name` of the HostedCluster a reconcile ran for
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReconcileLabels {
    pub namespace: String,
    pub name: String,
}

impl EncodeLabelSet for ReconcileLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())
    }
}

/// Lifecycle gauge labels; `_id` is the cluster id, empty until assigned
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ClusterLabels {
    pub namespace: String,
    pub name: String,
    pub id: String,
}

impl EncodeLabelSet for ClusterLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        ("_id", self.id.as_str()).encode(encoder.encode_label())
    }
}

type DurationGauge = Family<ClusterLabels, Gauge<f64, AtomicU64>>;

pub struct Metrics {
    pub reconciliations_total: Family<ReconcileLabels, Counter>,
    pub reconciliation_errors_total: Family<ReconcileLabels, Counter>,
    pub reconcile_duration_seconds: Family<ReconcileLabels, Histogram>,

    pub initial_rolling_out_duration: DurationGauge,
    pub waiting_initial_availability_duration: DurationGauge,
    pub deleting_duration: DurationGauge,
    pub guest_cloud_resources_deleting_duration: DurationGauge,
    pub skipped_cloud_resources_deletion: DurationGauge,

    /// Gauge labels last published per `(namespace, name)`. A cluster id
    /// change leaves the old series behind unless it is removed by these.
    emitted: Mutex<HashMap<(String, String), ClusterLabels>>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn duration_gauge(registry: &mut Registry, name: &str, help: &str) -> DurationGauge {
    let gauge = DurationGauge::default();
    registry.register(name, help, gauge.clone());
    gauge
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let reconciliations_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "hypershift_operator_reconciliations",
            "HostedCluster reconcile passes",
            reconciliations_total.clone(),
        );
        let reconciliation_errors_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "hypershift_operator_reconciliation_errors",
            "HostedCluster reconcile passes that returned an error",
            reconciliation_errors_total.clone(),
        );
        let reconcile_duration_seconds =
            Family::<ReconcileLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "hypershift_operator_reconcile_duration_seconds",
            "Wall time of a HostedCluster reconcile pass",
            reconcile_duration_seconds.clone(),
        );

        let initial_rolling_out_duration = duration_gauge(
            &mut registry,
            "hypershift_cluster_initial_rolling_out_duration_seconds",
            "Time in seconds it is taking to roll out the initial version since the creation of the HostedCluster",
        );
        let waiting_initial_availability_duration = duration_gauge(
            &mut registry,
            "hypershift_cluster_waiting_initial_avaibility_duration_seconds",
            "Time in seconds it is taking to get the Available condition becoming true since the creation of the HostedCluster",
        );
        let deleting_duration = duration_gauge(
            &mut registry,
            "hypershift_cluster_deleting_duration_seconds",
            "Time in seconds it is taking to delete the HostedCluster since the beginning of the delete",
        );
        let guest_cloud_resources_deleting_duration = duration_gauge(
            &mut registry,
            "hypershift_cluster_guest_cloud_resources_deleting_duration_seconds",
            "Time in seconds it is taking to get the CloudResourcesDestroyed condition become true since the beginning of the delete",
        );
        let skipped_cloud_resources_deletion = duration_gauge(
            &mut registry,
            "hypershift_cluster_skipped_cloud_resources_deletion",
            "Set to 1 while a HostedCluster is deleting without cleaning up its cloud resources",
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            reconcile_duration_seconds,
            initial_rolling_out_duration,
            waiting_initial_availability_duration,
            deleting_duration,
            guest_cloud_resources_deleting_duration,
            skipped_cloud_resources_deletion,
            emitted: Mutex::new(HashMap::new()),
            registry,
        }
    }

    fn reconcile_labels(namespace: &str, name: &str) -> ReconcileLabels {
        ReconcileLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Count one reconcile pass and observe how long it took
    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let labels = Self::reconcile_labels(namespace, name);
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    pub fn record_error(&self, namespace: &str, name: &str) {
        self.reconciliation_errors_total
            .get_or_create(&Self::reconcile_labels(namespace, name))
            .inc();
    }

    fn gauges(&self) -> [&DurationGauge; 5] {
        [
            &self.initial_rolling_out_duration,
            &self.waiting_initial_availability_duration,
            &self.deleting_duration,
            &self.guest_cloud_resources_deleting_duration,
            &self.skipped_cloud_resources_deletion,
        ]
    }

    /// Publish the lifecycle gauges for one HostedCluster. Gauges whose value
    /// is `None` are removed.
    pub fn set_cluster_metrics(&self, namespace: &str, name: &str, cluster_id: &str, values: &ClusterMetrics) {
        let labels = ClusterLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
            id: cluster_id.to_string(),
        };

        if let Ok(mut emitted) = self.emitted.lock()
            && let Some(previous) = emitted.insert((labels.namespace.clone(), labels.name.clone()), labels.clone())
            && previous != labels
        {
            for gauge in self.gauges() {
                gauge.remove(&previous);
            }
        }

        let values = [
            values.initial_rolling_out,
            values.waiting_initial_availability,
            values.deleting,
            values.guest_cloud_resources_deleting,
            values.skipped_cloud_resources_deletion,
        ];
        for (gauge, value) in self.gauges().into_iter().zip(values) {
            match value {
                Some(v) => {
                    gauge.get_or_create(&labels).set(v);
                }
                None => {
                    gauge.remove(&labels);
                }
            }
        }
    }

    /// Drop every gauge for a HostedCluster that no longer exists
    pub fn clear_cluster_metrics(&self, namespace: &str, name: &str) {
        let Ok(mut emitted) = self.emitted.lock() else {
            return;
        };
        if let Some(labels) = emitted.remove(&(namespace.to_string(), name.to_string())) {
            for gauge in self.gauges() {
                gauge.remove(&labels);
            }
        }
    }

    /// Text exposition of the registry; empty if encoding fails
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        match encode(&mut buffer, &self.registry) {
            Ok(()) => buffer,
            Err(e) => {
                tracing::error!("Failed to encode metrics: {}", e);
                String::new()
            }
        }
    }
}

/// State shared by the probe handlers
pub struct HealthState {
    /// Flipped on once controllers start and off when shutdown begins
    pub ready: RwLock<bool>,
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    match state.is_ready().await {
        true => (StatusCode::OK, "ready"),
        false => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, OPENMETRICS_TEXT)], state.metrics.encode())
}

pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve probes and metrics on [`HEALTH_ADDR`] until the listener fails
pub async fn run_health_server(state: Arc<HealthState>) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(HEALTH_ADDR).await?;
    tracing::info!("Health server listening on {}", HEALTH_ADDR);
    axum::serve(listener, create_router(state)).await
}
