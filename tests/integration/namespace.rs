//! Per-test namespaces for HostedClusters and the control plane namespaces
//! the operator derives from them

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{DeleteParams, ListParams, PostParams, PropagationPolicy};
use kube::core::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use hypershift_operator::resources::common::CONTROL_PLANE_LABEL;

const TEST_LABEL: &str = "hypershift-operator.test";

#[derive(Error, Debug)]
pub enum NamespaceError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),
}

/// Namespace holding the HostedClusters of one test
pub struct TestNamespace {
    pub name: String,
    client: Client,
}

impl TestNamespace {
    /// Create `{prefix}-{uuid8}`, labelled so stray namespaces can be found
    pub async fn create(client: Client, prefix: &str) -> Result<Self, NamespaceError> {
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        let name = format!("{}-{}", prefix, suffix);

        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                labels: Some(BTreeMap::from([(TEST_LABEL.to_string(), "true".to_string())])),
                ..Default::default()
            },
            ..Default::default()
        };
        Api::<Namespace>::all(client.clone())
            .create(&PostParams::default(), &ns)
            .await?;
        tracing::info!("Created test namespace: {}", name);

        Ok(Self { name, client })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Control plane namespace the operator creates for `cluster`
    pub fn control_plane_namespace(&self, cluster: &str) -> String {
        format!("{}-{}", self.name, cluster)
    }

    /// Delete the test namespace along with any control plane namespaces
    /// derived from it. Deletion is started but not awaited.
    pub async fn cleanup(&self) -> Result<(), NamespaceError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let dp = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };

        let selector = format!("{}=true", CONTROL_PLANE_LABEL);
        let prefix = format!("{}-", self.name);
        let derived = namespaces.list(&ListParams::default().labels(&selector)).await?;
        let names = derived
            .items
            .iter()
            .map(ResourceExt::name_any)
            .filter(|name| name.starts_with(&prefix))
            .chain(std::iter::once(self.name.clone()));

        for name in names {
            match namespaces.delete(&name, &dp).await {
                Ok(_) => tracing::debug!("Namespace {} deletion initiated", name),
                Err(kube::Error::Api(e)) if e.code == 404 => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
