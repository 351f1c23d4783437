use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::{Client, ResourceExt};
use tracing::debug;

use super::ObjectClient;
use crate::controller::error::{Error, Result};

/// [`ObjectClient`] backed by a live API server
#[derive(Clone)]
pub struct KubeObjectClient {
    client: Client,
}

impl KubeObjectClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) if !ns.is_empty() => Api::namespaced_with(self.client.clone(), ns, resource),
            _ => Api::all_with(self.client.clone(), resource),
        }
    }
}

#[async_trait]
impl ObjectClient for KubeObjectClient {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        Ok(self.api(resource, namespace).get_opt(name).await?)
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<Vec<DynamicObject>> {
        Ok(self.api(resource, namespace).list(params).await?.items)
    }

    async fn create(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let api = self.api(resource, obj.metadata.namespace.as_deref());
        let created = api.create(&PostParams::default(), obj).await?;
        debug!(kind = %resource.kind, name = %created.name_any(), "created object");
        Ok(created)
    }

    async fn update(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let api = self.api(resource, obj.metadata.namespace.as_deref());
        let name = obj
            .metadata
            .name
            .as_deref()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;
        Ok(api.replace(name, &PostParams::default(), obj).await?)
    }

    async fn update_status(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject> {
        let api = self.api(resource, obj.metadata.namespace.as_deref());
        let name = obj
            .metadata
            .name
            .as_deref()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;

        // Carrying the resource version makes the merge patch fail with 409 on a stale read
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": obj.metadata.resource_version },
            "status": obj.data.get("status").cloned().unwrap_or(serde_json::Value::Null),
        });
        Ok(api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn patch(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        params: &PatchParams,
        patch: &Patch<serde_json::Value>,
    ) -> Result<DynamicObject> {
        Ok(self.api(resource, namespace).patch(name, params, patch).await?)
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool> {
        match self
            .api(resource, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
