//! Object client abstraction
//!
//! Controllers talk to the API server through [`ObjectClient`], which works on
//! unstructured [`DynamicObject`]s identified by an [`ApiResource`]. Typed
//! helpers in this module convert any `kube::Resource` through serde so callers
//! stay typed while the transport underneath can be swapped out.

mod kube_client;
pub mod upsert;

pub use kube_client::KubeObjectClient;
pub use upsert::{
    CreateOrUpdate, OperationResult, ParentAnnotatingUpsert, Upsert, annotate_parent,
    create_or_update_dynamic, parent_from_annotations,
};

use std::fmt::Debug;

use async_trait::async_trait;
use kube::Resource;
use kube::api::{ApiResource, DynamicObject, ListParams, Patch, PatchParams};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::controller::error::Result;

/// Request/response verbs against the object store.
///
/// Watches are not part of this seam; they are driven by `kube::runtime`
/// against the real API server.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Fetch an object, returning `None` when it does not exist
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    /// List objects, optionally restricted to a namespace and label selector
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<Vec<DynamicObject>>;

    async fn create(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Replace an object. Fails with a 409 Conflict when the resource version is stale.
    async fn update(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Replace the status of an object, with the same conflict semantics as `update`
    async fn update_status(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject>;

    async fn patch(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        params: &PatchParams,
        patch: &Patch<serde_json::Value>,
    ) -> Result<DynamicObject>;

    /// Delete an object. Returns `false` if it was already gone.
    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool>;
}

/// Types the typed helpers can round-trip through [`DynamicObject`]
pub trait ClientObject:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static
{
}

impl<T> ClientObject for T where
    T: Resource<DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static
{
}

pub fn api_resource<K: ClientObject>() -> ApiResource {
    ApiResource::erase::<K>(&())
}

pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub fn from_dynamic<K: DeserializeOwned>(obj: DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub async fn get_opt<K, C>(client: &C, namespace: Option<&str>, name: &str) -> Result<Option<K>>
where
    K: ClientObject,
    C: ObjectClient + ?Sized,
{
    match client.get(&api_resource::<K>(), namespace, name).await? {
        Some(obj) => Ok(Some(from_dynamic(obj)?)),
        None => Ok(None),
    }
}

pub async fn list<K, C>(client: &C, namespace: Option<&str>, params: &ListParams) -> Result<Vec<K>>
where
    K: ClientObject,
    C: ObjectClient + ?Sized,
{
    client
        .list(&api_resource::<K>(), namespace, params)
        .await?
        .into_iter()
        .map(from_dynamic)
        .collect()
}

pub async fn create<K, C>(client: &C, obj: &K) -> Result<K>
where
    K: ClientObject,
    C: ObjectClient + ?Sized,
{
    let created = client.create(&api_resource::<K>(), &to_dynamic(obj)?).await?;
    from_dynamic(created)
}

pub async fn update<K, C>(client: &C, obj: &K) -> Result<K>
where
    K: ClientObject,
    C: ObjectClient + ?Sized,
{
    let updated = client.update(&api_resource::<K>(), &to_dynamic(obj)?).await?;
    from_dynamic(updated)
}

pub async fn update_status<K, C>(client: &C, obj: &K) -> Result<K>
where
    K: ClientObject,
    C: ObjectClient + ?Sized,
{
    let updated = client
        .update_status(&api_resource::<K>(), &to_dynamic(obj)?)
        .await?;
    from_dynamic(updated)
}

pub async fn merge_patch<K, C>(
    client: &C,
    namespace: Option<&str>,
    name: &str,
    patch: serde_json::Value,
) -> Result<K>
where
    K: ClientObject,
    C: ObjectClient + ?Sized,
{
    let patched = client
        .patch(
            &api_resource::<K>(),
            namespace,
            name,
            &PatchParams::default(),
            &Patch::Merge(patch),
        )
        .await?;
    from_dynamic(patched)
}

pub async fn delete<K, C>(client: &C, namespace: Option<&str>, name: &str) -> Result<bool>
where
    K: ClientObject,
    C: ObjectClient + ?Sized,
{
    client.delete(&api_resource::<K>(), namespace, name).await
}
