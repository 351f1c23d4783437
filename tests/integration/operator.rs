//! Operator spawning utilities for integration tests
//!
//! Each test runs its own operator scoped to the test namespace, inside the
//! test's tokio runtime.

use std::sync::Arc;

use hypershift_operator::{OperatorConfig, build_context, run_controller};
use kube::Client;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// An operator that runs until dropped
pub struct ScopedOperator {
    handle: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ScopedOperator {
    /// Start the HostedCluster controller watching only `namespace`
    pub async fn start(client: Client, namespace: &str) -> Self {
        let config = OperatorConfig {
            watch_namespace: Some(namespace.to_string()),
            ..Default::default()
        };
        Self::start_with_config(client, config).await
    }

    pub async fn start_with_config(client: Client, config: OperatorConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let ctx = Arc::new(build_context(client.clone(), config, None));

        tracing::info!("Starting scoped operator controller...");
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = run_controller(ctx, client) => {
                    tracing::debug!("Operator exited normally");
                }
                _ = shutdown_rx => {
                    tracing::debug!("Operator received shutdown signal");
                }
            }
        });

        // Give the watches a moment to start
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        Self {
            handle,
            shutdown_tx: Some(shutdown_tx),
        }
    }
}

impl Drop for ScopedOperator {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}
