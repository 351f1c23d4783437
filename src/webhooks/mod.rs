//! Admission webhooks for HostedCluster resources
//!
//! A mutating endpoint fills in defaults and a validating endpoint enforces
//! the create and update policies before objects are persisted.

pub mod defaulter;
pub mod policies;
mod server;

pub use defaulter::{default_hosted_cluster, generate_id, spec_patch};
pub use policies::{ValidationContext, ValidationResult, validate_all};
pub use server::{
    AdmissionRequest, AdmissionReview, AdmissionReviewResponse, WEBHOOK_CERT_PATH,
    WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, WebhookState, create_webhook_router,
    review_mutation, review_validation, run_webhook_server,
};
