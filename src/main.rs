use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hypershift_operator::health::{HealthState, run_health_server};
use hypershift_operator::{
    OperatorConfig, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WebhookState, build_context,
    run_controller, run_webhook_server,
};

const LEASE_NAME: &str = "hypershift-operator-leader";
const LEASE_TTL: Duration = Duration::from_secs(15);
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Time left for in-flight reconciles once a shutdown signal arrives
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err("Failed to install rustls crypto provider and no provider is available".into());
    }

    init_logging()?;
    info!("Starting hypershift-operator");

    let config = OperatorConfig::from_env()?;
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let holder_id = env_or("POD_NAME", || {
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let lease_namespace = env_or("POD_NAMESPACE", || "default".to_string());

    let health_state = Arc::new(HealthState::new());
    let ctx = Arc::new(build_context(client.clone(), config, Some(health_state.clone())));

    // Probes and admission are served by every replica
    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state).await {
                error!("Health server error: {}", e);
            }
        })
    };
    let webhook_handle = spawn_webhook_server(Arc::new(WebhookState::new(
        ctx.client.clone(),
        ctx.releases.clone(),
    )));

    let lease = || {
        LeaseLock::new(
            client.clone(),
            &lease_namespace,
            LeaseLockParams {
                holder_id: holder_id.clone(),
                lease_name: LEASE_NAME.to_string(),
                lease_ttl: LEASE_TTL,
            },
        )
    };
    info!(holder_id = %holder_id, namespace = %lease_namespace, lease_name = LEASE_NAME, "Waiting to acquire leadership");
    acquire_leadership(&lease()).await;
    let renewal_handle = spawn_lease_renewal(lease());

    info!("Watching HostedCluster resources (apiVersion: hypershift.openshift.io/v1beta1)");
    let controller_handle = tokio::spawn(run_controller(ctx.clone(), client.clone()));

    let webhook_done = async {
        match webhook_handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!("Webhook server task panicked: {}", e);
                }
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!("Controller task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Renewal only returns through process::exit or a panic
        Err(e) = renewal_handle => error!("Lease renewal task panicked: {}", e),
        _ = webhook_done => {}
        _ = shutdown_signal() => {
            info!("Received shutdown signal, marking operator not ready");
            health_state.set_ready(false).await;
            info!("Waiting {:?} for in-flight reconciliations", SHUTDOWN_GRACE_PERIOD);
            tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
        }
    }

    info!("Operator stopped");
    Ok(())
}

fn env_or(key: &str, fallback: impl FnOnce() -> String) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        let value = fallback();
        warn!("{} not set, using {}", key, value);
        value
    })
}

/// Start the TLS admission server when its certificate and key are mounted
fn spawn_webhook_server(state: Arc<WebhookState>) -> Option<JoinHandle<()>> {
    let cert_path = std::env::var("WEBHOOK_CERT_PATH").unwrap_or_else(|_| WEBHOOK_CERT_PATH.to_string());
    let key_path = std::env::var("WEBHOOK_KEY_PATH").unwrap_or_else(|_| WEBHOOK_KEY_PATH.to_string());
    if !Path::new(&cert_path).exists() || !Path::new(&key_path).exists() {
        info!(
            "TLS certificates not found at {} and {}, webhook server disabled",
            cert_path, key_path
        );
        return None;
    }

    info!("TLS certificates found, starting webhook server");
    Some(tokio::spawn(async move {
        if let Err(e) = run_webhook_server(state, &cert_path, &key_path).await {
            error!("Webhook server error: {}", e);
        }
    }))
}

/// Block until this replica holds the lease
async fn acquire_leadership(lease: &LeaseLock) {
    loop {
        match lease.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {
                info!("Acquired leadership");
                return;
            }
            Ok(_) => info!("Another instance is leader, waiting..."),
            Err(e) => warn!("Failed to acquire lease: {}, retrying...", e),
        }
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
    }
}

/// Keep renewing the lease. Losing it exits the process so the pod restarts
/// and rejoins the election as a follower.
fn spawn_lease_renewal(lease: LeaseLock) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
            match lease.try_acquire_or_renew().await {
                Ok(result) if result.acquired_lease => {}
                Ok(_) => {
                    error!("Lost leadership, shutting down");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!("Failed to renew lease: {}, shutting down", e);
                    std::process::exit(1);
                }
            }
        }
    })
}

/// Text logs by default, JSON when `LOG_FORMAT=json`
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env()
        .add_directive("hypershift_operator=info".parse()?)
        .add_directive("kube=info".parse()?)
        .add_directive("kube_leader_election=info".parse()?);

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// Resolves on SIGTERM or SIGINT
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
