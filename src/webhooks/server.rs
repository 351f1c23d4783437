//! Admission endpoints for HostedClusters
//!
//! `/validate-hostedcluster` runs the policies in [`super::policies`];
//! `/mutate-hostedcluster` runs the defaulter and answers with a JSON patch
//! replacing `/spec`. Both answer DELETE with an unconditional allow.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::defaulter::{default_hosted_cluster, spec_patch};
use super::policies::{ValidationContext, validate_all};
use crate::client::ObjectClient;
use crate::crd::HostedCluster;
use crate::release::{ReleaseProvider, Version};
use crate::resources::mirror::{PULL_SECRET, read_secret_key};

pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
pub const WEBHOOK_PORT: u16 = 8443;

const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";
const DENIED_CODE: i32 = 403;

/// `admission.k8s.io/v1` AdmissionReview as sent by the API server
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    pub api_version: String,
    pub kind: String,
    pub request: Option<AdmissionRequest>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    pub operation: String,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub object: Option<serde_json::Value>,
    pub old_object: Option<serde_json::Value>,
}

impl AdmissionRequest {
    fn is_delete(&self) -> bool {
        self.operation == "DELETE"
    }

    fn hosted_cluster(&self) -> Result<HostedCluster, String> {
        let object = self
            .object
            .clone()
            .ok_or_else(|| "Missing object in request".to_string())?;
        serde_json::from_value(object).map_err(|e| format!("Failed to parse object: {}", e))
    }

    /// Prior object on UPDATE. An unreadable one is validated as a CREATE.
    fn old_hosted_cluster(&self) -> Option<HostedCluster> {
        let old = self.old_object.clone()?;
        serde_json::from_value(old)
            .inspect_err(|e| warn!(error = %e, "Failed to parse old HostedCluster, treating as CREATE"))
            .ok()
    }
}

/// AdmissionReview sent back to the API server
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub response: AdmissionResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionStatus>,
    /// JSON patch, base64 encoded on the wire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<ByteString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionStatus {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AdmissionReviewResponse {
    fn new(response: AdmissionResponse) -> Self {
        Self {
            api_version: ADMISSION_API_VERSION.to_string(),
            kind: "AdmissionReview".to_string(),
            response,
        }
    }

    pub fn allow(uid: &str) -> Self {
        Self::new(AdmissionResponse {
            uid: uid.to_string(),
            allowed: true,
            status: None,
            patch: None,
            patch_type: None,
        })
    }

    pub fn deny(uid: &str, message: &str, reason: Option<&str>) -> Self {
        Self::new(AdmissionResponse {
            uid: uid.to_string(),
            allowed: false,
            status: Some(AdmissionStatus {
                code: DENIED_CODE,
                message: message.to_string(),
                reason: reason.map(String::from),
            }),
            patch: None,
            patch_type: None,
        })
    }

    fn with_json_patch(mut self, patch: Vec<u8>) -> Self {
        self.response.patch = Some(ByteString(patch));
        self.response.patch_type = Some("JSONPatch".to_string());
        self
    }
}

type Reply = (StatusCode, AdmissionReviewResponse);

fn ok(response: AdmissionReviewResponse) -> Reply {
    (StatusCode::OK, response)
}

/// Unwrap the request, or the reply for a review that carries none
fn take_request(review: AdmissionReview) -> Result<AdmissionRequest, Reply> {
    review.request.ok_or_else(|| {
        error!("Admission review missing request");
        (
            StatusCode::BAD_REQUEST,
            AdmissionReviewResponse::deny("", "Missing request in AdmissionReview", None),
        )
    })
}

/// Handles shared by the admission handlers
pub struct WebhookState {
    pub client: Arc<dyn ObjectClient>,
    pub releases: Arc<dyn ReleaseProvider>,
}

impl WebhookState {
    pub fn new(client: Arc<dyn ObjectClient>, releases: Arc<dyn ReleaseProvider>) -> Self {
        Self { client, releases }
    }
}

pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/validate-hostedcluster", post(validate_hosted_cluster))
        .route("/mutate-hostedcluster", post(mutate_hosted_cluster))
        .with_state(state)
}

async fn validate_hosted_cluster(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview>,
) -> impl IntoResponse {
    let (status, response) = review_validation(&state, review).await;
    (status, Json(response))
}

async fn mutate_hosted_cluster(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview>,
) -> impl IntoResponse {
    let (status, response) = review_mutation(&state, review).await;
    (status, Json(response))
}

/// Run the validation policies against an admission review
pub async fn review_validation(state: &WebhookState, review: AdmissionReview) -> Reply {
    let request = match take_request(review) {
        Ok(request) => request,
        Err(reply) => return reply,
    };
    let uid = request.uid.as_str();
    info!(
        uid,
        operation = %request.operation,
        namespace = ?request.namespace,
        name = ?request.name,
        "Validating HostedCluster"
    );

    if request.is_delete() {
        return ok(AdmissionReviewResponse::allow(uid));
    }
    let cluster = match request.hosted_cluster() {
        Ok(cluster) => cluster,
        Err(message) => {
            error!(uid, %message, "Failed to parse HostedCluster");
            return ok(AdmissionReviewResponse::deny(uid, &message, None));
        }
    };
    let old_cluster = request.old_hosted_cluster();

    let release_version = resolve_release_version(state, &cluster).await;
    let ctx = ValidationContext::new(&cluster, old_cluster.as_ref(), release_version);
    let result = validate_all(&ctx);
    if result.allowed {
        debug!(uid, "HostedCluster admitted");
        return ok(AdmissionReviewResponse::allow(uid));
    }

    let reason = result.reason.as_deref().unwrap_or("ValidationFailed");
    let message = result.message.as_deref().unwrap_or("Validation failed");
    warn!(uid, reason, message, "HostedCluster rejected");
    ok(AdmissionReviewResponse::deny(uid, message, Some(reason)))
}

/// Default an admission review's object and answer with a JSON patch
pub async fn review_mutation(state: &WebhookState, review: AdmissionReview) -> Reply {
    let request = match take_request(review) {
        Ok(request) => request,
        Err(reply) => return reply,
    };
    let uid = request.uid.as_str();

    if request.is_delete() {
        return ok(AdmissionReviewResponse::allow(uid));
    }
    let original = match request.hosted_cluster() {
        Ok(cluster) => cluster,
        Err(message) => {
            error!(uid, %message, "Failed to parse HostedCluster");
            return ok(AdmissionReviewResponse::deny(uid, &message, None));
        }
    };

    let mut defaulted = original.clone();
    if let Err(e) = default_hosted_cluster(&mut defaulted, state.releases.as_ref()).await {
        warn!(uid, error = %e, "Failed to default HostedCluster");
        return ok(AdmissionReviewResponse::deny(uid, &e.to_string(), Some("DefaultingFailed")));
    }

    let patch = spec_patch(&original, &defaulted)
        .and_then(|patch| patch.map(|p| serde_json::to_vec(&p)).transpose().map_err(Into::into));
    match patch {
        Ok(Some(bytes)) => {
            debug!(uid, name = %defaulted.name_any(), "Defaulted HostedCluster");
            ok(AdmissionReviewResponse::allow(uid).with_json_patch(bytes))
        }
        Ok(None) => ok(AdmissionReviewResponse::allow(uid)),
        Err(e) => {
            error!(uid, error = %e, "Failed to build defaulting patch");
            ok(AdmissionReviewResponse::deny(uid, &e.to_string(), None))
        }
    }
}

/// Look up the version of the requested release. Failures leave it unknown
/// and the policies that need it deny the request.
async fn resolve_release_version(state: &WebhookState, cluster: &HostedCluster) -> Option<Version> {
    let image = cluster.spec.release.image.as_str();
    if image.is_empty() {
        return None;
    }
    let namespace = cluster.namespace().unwrap_or_default();
    let pull_secret = read_secret_key(
        state.client.as_ref(),
        &namespace,
        &cluster.spec.pull_secret.name,
        &PULL_SECRET,
    )
    .await
    .map(|data| data.0)
    .unwrap_or_else(|e| {
        debug!(%namespace, error = %e, "Pull secret unavailable for release lookup");
        Vec::new()
    });

    match state.releases.lookup(image, &pull_secret).await {
        Ok(release) => release.semantic_version(),
        Err(e) => {
            warn!(image, error = %e, "Failed to look up release version");
            None
        }
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Serve admission over TLS on [`WEBHOOK_PORT`]
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    cert_path: &str,
    key_path: &str,
) -> Result<(), WebhookError> {
    let tls = RustlsConfig::from_pem_file(PathBuf::from(cert_path), PathBuf::from(key_path))
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], WEBHOOK_PORT));
    info!("Webhook server listening on {} with TLS", addr);

    axum_server::bind_rustls(addr, tls)
        .serve(create_webhook_router(state).into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))
}
