//! Wait condition helpers for HostedCluster resources

use hypershift_operator::crd::{HostedCluster, UpdateState};
use kube::Api;
use kube::runtime::wait::{Condition, await_condition, conditions};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WaitError {
    #[error("Timeout waiting for condition")]
    Timeout,

    #[error("Watch error: {0}")]
    Watch(#[from] kube::runtime::wait::Error),

    #[error("Resource not found after wait")]
    ResourceNotFound,
}

/// HostedCluster carries `finalizer`
pub fn has_finalizer(finalizer: &str) -> impl Condition<HostedCluster> {
    let finalizer = finalizer.to_string();
    move |obj: Option<&HostedCluster>| {
        obj.and_then(|hc| hc.metadata.finalizers.as_ref())
            .is_some_and(|f| f.contains(&finalizer))
    }
}

/// Condition `type_` is present with `status`
pub fn has_condition(type_: &str, status: &str) -> impl Condition<HostedCluster> {
    let type_ = type_.to_string();
    let status = status.to_string();
    move |obj: Option<&HostedCluster>| {
        obj.is_some_and(|hc| {
            hc.status_conditions()
                .iter()
                .any(|c| c.type_ == type_ && c.status == status)
        })
    }
}

/// Newest update history entry is in `state` for `image`
pub fn is_rolling(image: &str, state: UpdateState) -> impl Condition<HostedCluster> {
    let image = image.to_string();
    move |obj: Option<&HostedCluster>| {
        obj.and_then(|hc| hc.status.as_ref())
            .and_then(|s| s.version.as_ref())
            .and_then(|v| v.history.first())
            .is_some_and(|entry| entry.image == image && entry.state == state)
    }
}

/// Wait for a HostedCluster to satisfy a condition
pub async fn wait_for_cluster<C>(
    api: &Api<HostedCluster>,
    name: &str,
    condition: C,
    timeout: Duration,
) -> Result<HostedCluster, WaitError>
where
    C: Condition<HostedCluster>,
{
    let cond = await_condition(api.clone(), name, condition);

    let result = tokio::time::timeout(timeout, cond)
        .await
        .map_err(|_| WaitError::Timeout)?
        .map_err(WaitError::Watch)?;

    result.ok_or(WaitError::ResourceNotFound)
}

/// Wait for the HostedCluster with `uid` to be gone
pub async fn wait_for_deletion(
    api: &Api<HostedCluster>,
    name: &str,
    uid: &str,
    timeout: Duration,
) -> Result<(), WaitError> {
    let cond = await_condition(api.clone(), name, conditions::is_deleted(uid));
    tokio::time::timeout(timeout, cond)
        .await
        .map_err(|_| WaitError::Timeout)?
        .map_err(WaitError::Watch)?;
    Ok(())
}

/// Poll until `api.get(name)` succeeds
pub async fn wait_for_resource<T>(api: &Api<T>, name: &str, timeout: Duration) -> Result<T, WaitError>
where
    T: kube::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match api.get_opt(name).await {
            Ok(Some(resource)) => return Ok(resource),
            Ok(None) | Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(None) | Err(_) => return Err(WaitError::Timeout),
        }
    }
}
