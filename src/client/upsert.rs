//! Create-or-update primitive and its parent-annotating decorator

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::Resource;
use kube::api::{ApiResource, DynamicObject};
use serde_json::Value;
use tracing::debug;

use super::{ClientObject, ObjectClient, create, get_opt, update};
use crate::controller::error::{Error, Result};
use crate::resources::common::{HOSTED_CLUSTER_ANNOTATION, object_key};

/// What a create-or-update call did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    None,
}

#[async_trait]
pub trait CreateOrUpdate: Send + Sync {
    /// Fetch `obj` by name; create it after running `mutate` if it is absent,
    /// otherwise run `mutate` on the live copy and write it back only if it changed.
    /// On return `obj` holds the object as stored.
    async fn create_or_update<K, F>(&self, obj: &mut K, mutate: F) -> Result<OperationResult>
    where
        K: ClientObject,
        F: FnOnce(&mut K) + Send;
}

/// Plain create-or-update over an [`ObjectClient`]
pub struct Upsert<'a, C: ObjectClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ObjectClient + ?Sized> Upsert<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: ObjectClient + ?Sized> CreateOrUpdate for Upsert<'_, C> {
    async fn create_or_update<K, F>(&self, obj: &mut K, mutate: F) -> Result<OperationResult>
    where
        K: ClientObject,
        F: FnOnce(&mut K) + Send,
    {
        let namespace = obj.meta().namespace.clone();
        let name = obj.meta().name.clone().unwrap_or_default();

        match get_opt::<K, C>(self.client, namespace.as_deref(), &name).await? {
            None => {
                mutate(obj);
                *obj = create(self.client, obj).await?;
                debug!(kind = %K::kind(&()), name = %name, "created");
                Ok(OperationResult::Created)
            }
            Some(mut live) => {
                let before = serde_json::to_value(&live)?;
                mutate(&mut live);
                if serde_json::to_value(&live)? == before {
                    *obj = live;
                    return Ok(OperationResult::None);
                }
                *obj = update(self.client, &live).await?;
                debug!(kind = %K::kind(&()), name = %name, "updated");
                Ok(OperationResult::Updated)
            }
        }
    }
}

/// Create-or-update for kinds the operator only knows as unstructured objects.
///
/// Labels, annotations and top-level data fields of `desired` are laid over the
/// live object. Anything else the live object carries, status included, is kept.
pub async fn create_or_update_dynamic<C: ObjectClient + ?Sized>(
    client: &C,
    resource: &ApiResource,
    desired: &DynamicObject,
) -> Result<OperationResult> {
    let name = desired
        .metadata
        .name
        .as_deref()
        .ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let namespace = desired.metadata.namespace.as_deref();

    let Some(live) = client.get(resource, namespace, name).await? else {
        client.create(resource, desired).await?;
        debug!(kind = %resource.kind, name = %name, "created");
        return Ok(OperationResult::Created);
    };

    let mut next = live.clone();
    overlay(&mut next.metadata.labels, &desired.metadata.labels);
    overlay(&mut next.metadata.annotations, &desired.metadata.annotations);
    if let (Value::Object(target), Value::Object(fields)) = (&mut next.data, &desired.data) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }

    if next.metadata.labels == live.metadata.labels
        && next.metadata.annotations == live.metadata.annotations
        && next.data == live.data
    {
        return Ok(OperationResult::None);
    }
    client.update(resource, &next).await?;
    debug!(kind = %resource.kind, name = %name, "updated");
    Ok(OperationResult::Updated)
}

fn overlay(target: &mut Option<BTreeMap<String, String>>, desired: &Option<BTreeMap<String, String>>) {
    if let Some(desired) = desired.as_ref().filter(|d| !d.is_empty()) {
        let target = target.get_or_insert_with(BTreeMap::new);
        for (key, value) in desired {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Decorates a create-or-update so every namespaced object it writes points back
/// at the HostedCluster being reconciled
pub struct ParentAnnotatingUpsert<U> {
    inner: U,
    parent: String,
}

impl<U: CreateOrUpdate> ParentAnnotatingUpsert<U> {
    pub fn new(inner: U, parent_namespace: &str, parent_name: &str) -> Self {
        Self {
            inner,
            parent: object_key(parent_namespace, parent_name),
        }
    }
}

#[async_trait]
impl<U: CreateOrUpdate> CreateOrUpdate for ParentAnnotatingUpsert<U> {
    async fn create_or_update<K, F>(&self, obj: &mut K, mutate: F) -> Result<OperationResult>
    where
        K: ClientObject,
        F: FnOnce(&mut K) + Send,
    {
        let parent = self.parent.clone();
        self.inner
            .create_or_update(obj, move |o: &mut K| {
                mutate(o);
                annotate_parent(o, &parent);
            })
            .await
    }
}

/// Set the parent annotation unless the object is cluster-scoped
pub fn annotate_parent<K: Resource>(obj: &mut K, parent: &str) {
    let meta = obj.meta_mut();
    if meta.namespace.as_deref().unwrap_or_default().is_empty() {
        return;
    }
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(HOSTED_CLUSTER_ANNOTATION.to_string(), parent.to_string());
}

/// Read the parent annotation back into `(namespace, name)`
pub fn parent_from_annotations(annotations: &BTreeMap<String, String>) -> Option<(String, String)> {
    let value = annotations.get(HOSTED_CLUSTER_ANNOTATION)?;
    let (namespace, name) = value.split_once('/')?;
    if namespace.is_empty() || name.is_empty() {
        return None;
    }
    Some((namespace.to_string(), name.to_string()))
}
