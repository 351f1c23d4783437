//! Call recording over the in-memory API server from `kube_fake_client`
//!
//! [`RecordingClient`] forwards every verb to a [`KubeObjectClient`] built on
//! the fake server, remembering what was asked and optionally failing the
//! next matching call with an API error instead of forwarding it.

use std::sync::Mutex;

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, ListParams, Patch, PatchParams};
use kube::error::ErrorResponse;

use hypershift_operator::client::{ClientObject, KubeObjectClient, ObjectClient, api_resource, to_dynamic};
use hypershift_operator::controller::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
    Patch,
    Delete,
}

/// One forwarded call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Action {
    pub verb: Verb,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

#[derive(Default)]
struct Recorded {
    actions: Vec<Action>,
    failures: Vec<(Verb, String, u16)>,
}

pub struct RecordingClient {
    inner: KubeObjectClient,
    recorded: Mutex<Recorded>,
}

impl RecordingClient {
    pub fn new(client: kube::Client) -> Self {
        Self {
            inner: KubeObjectClient::new(client),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Create an object behind the recorder's back. Status dropped by the
    /// create is written through the status subresource.
    pub async fn seed<K: ClientObject>(&self, obj: &K) -> Result<()> {
        self.seed_dynamic(&api_resource::<K>(), &to_dynamic(obj)?).await
    }

    pub async fn seed_dynamic(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<()> {
        let created = self.inner.create(resource, obj).await?;
        let status = obj.data.get("status");
        if status.is_some() && created.data.get("status") != status {
            let mut with_status = created;
            with_status.data["status"] = status.cloned().unwrap_or_default();
            self.inner.update_status(resource, &with_status).await?;
        }
        Ok(())
    }

    /// Fail the next matching call with `code`. An empty `kind` matches every kind.
    pub fn fail_on(&self, verb: Verb, kind: &str, code: u16) {
        self.recorded
            .lock()
            .unwrap()
            .failures
            .push((verb, kind.to_string(), code));
    }

    pub fn actions(&self) -> Vec<Action> {
        self.recorded.lock().unwrap().actions.clone()
    }

    pub fn clear_actions(&self) {
        self.recorded.lock().unwrap().actions.clear();
    }

    /// Calls other than get and list
    pub fn writes(&self) -> Vec<Action> {
        self.actions()
            .into_iter()
            .filter(|a| !matches!(a.verb, Verb::Get | Verb::List))
            .collect()
    }

    fn record(&self, verb: Verb, resource: &ApiResource, namespace: Option<&str>, name: &str) -> Result<()> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.actions.push(Action {
            verb,
            kind: resource.kind.clone(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.to_string(),
        });
        let injected = recorded
            .failures
            .iter()
            .position(|(v, k, _)| *v == verb && (k.is_empty() || *k == resource.kind));
        match injected {
            Some(idx) => {
                let (_, _, code) = recorded.failures.remove(idx);
                Err(Error::Kube(kube::Error::Api(ErrorResponse {
                    status: "Failure".into(),
                    message: format!("injected failure for {:?} {}", verb, resource.kind),
                    reason: "Injected".into(),
                    code,
                })))
            }
            None => Ok(()),
        }
    }
}

fn name_of(obj: &DynamicObject) -> &str {
    obj.metadata.name.as_deref().unwrap_or_default()
}

#[async_trait]
impl ObjectClient for RecordingClient {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        self.record(Verb::Get, resource, namespace, name)?;
        self.inner.get(resource, namespace, name).await
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<Vec<DynamicObject>> {
        self.record(Verb::List, resource, namespace, "")?;
        self.inner.list(resource, namespace, params).await
    }

    async fn create(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        self.record(Verb::Create, resource, obj.metadata.namespace.as_deref(), name_of(obj))?;
        self.inner.create(resource, obj).await
    }

    async fn update(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        self.record(Verb::Update, resource, obj.metadata.namespace.as_deref(), name_of(obj))?;
        self.inner.update(resource, obj).await
    }

    async fn update_status(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject> {
        self.record(Verb::UpdateStatus, resource, obj.metadata.namespace.as_deref(), name_of(obj))?;
        self.inner.update_status(resource, obj).await
    }

    async fn patch(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        params: &PatchParams,
        patch: &Patch<serde_json::Value>,
    ) -> Result<DynamicObject> {
        self.record(Verb::Patch, resource, namespace, name)?;
        self.inner.patch(resource, namespace, name, params, patch).await
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool> {
        self.record(Verb::Delete, resource, namespace, name)?;
        self.inner.delete(resource, namespace, name).await
    }
}
