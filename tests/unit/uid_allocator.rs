//! Security context UID allocation from labeled control plane namespaces

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;

use hypershift_operator::clock::{FakeClock, SystemClock};
use hypershift_operator::controller::{Error, UidAllocator, UidAllocatorError};
use hypershift_operator::resources::common::{CONTROL_PLANE_LABEL, SECURITY_CONTEXT_UID_ANNOTATION};

use crate::common::*;

fn namespace(name: &str, labeled: bool, uid: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: labeled
                .then(|| BTreeMap::from([(CONTROL_PLANE_LABEL.to_string(), "true".to_string())])),
            annotations: Some(BTreeMap::from([(
                SECURITY_CONTEXT_UID_ANNOTATION.to_string(),
                uid.to_string(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn list_calls(client: &RecordingClient) -> usize {
    client.actions().iter().filter(|a| a.verb == Verb::List).count()
}

async fn recording_client(namespaces: Vec<Namespace>) -> RecordingClient {
    let builder = namespaces
        .into_iter()
        .fold(api_server(), |builder, ns| builder.with_object(ns));
    RecordingClient::new(builder.build().await.unwrap())
}

#[tokio::test]
async fn test_fills_gaps_in_existing_allocations() {
    let client = recording_client(vec![
        namespace("ns1", true, "1001"),
        namespace("ns2", true, "1005"),
    ])
    .await;
    let allocator = UidAllocator::default();

    let mut got = Vec::new();
    for _ in 0..4 {
        got.push(allocator.allocate(&client).await.unwrap());
    }
    assert_eq!(got, vec![1002, 1003, 1004, 1006]);
    assert_eq!(list_calls(&client), 1);
}

#[tokio::test]
async fn test_ignores_invalid_and_unlabeled() {
    let client = recording_client(vec![
        namespace("ns1", true, "notanumber"),
        namespace("ns2", false, "1001"),
        namespace("ns3", true, "1000123456"),
    ])
    .await;
    let allocator = UidAllocator::default();

    assert_eq!(allocator.allocate(&client).await.unwrap(), 1001);
    assert_eq!(allocator.allocate(&client).await.unwrap(), 1002);
}

#[tokio::test]
async fn test_exhausted() {
    let client = recording_client(Vec::new()).await;
    let allocator = UidAllocator::new(5000, 2, Arc::new(SystemClock));
    allocator.allocate(&client).await.unwrap();
    allocator.allocate(&client).await.unwrap();
    let err = allocator.allocate(&client).await.unwrap_err();
    assert!(matches!(
        err,
        Error::UidAllocation(UidAllocatorError::Exhausted { min: 5000, max: 5002 })
    ));
}

#[tokio::test]
async fn test_refresh_after_interval_drops_unpersisted() {
    let client = recording_client(Vec::new()).await;
    let clock = FakeClock::new(Utc::now());
    let allocator = UidAllocator::new(1001, 100, Arc::new(clock.clone()));

    // Never written to a namespace, so forgotten by the next refresh
    assert_eq!(allocator.allocate(&client).await.unwrap(), 1001);
    client.seed(&namespace("ns1", true, "1002")).await.unwrap();

    clock.advance(Duration::hours(7));
    assert_eq!(allocator.allocate(&client).await.unwrap(), 1002);
    assert_eq!(list_calls(&client), 1);

    clock.advance(Duration::hours(2));
    assert_eq!(allocator.allocate(&client).await.unwrap(), 1001);
    assert_eq!(list_calls(&client), 2);
    assert_eq!(allocator.allocated().await, BTreeSet::from([1001, 1002]));
}

#[tokio::test]
async fn test_list_failure_propagates() {
    let client = recording_client(Vec::new()).await;
    client.fail_on(Verb::List, "Namespace", 500);
    let allocator = UidAllocator::default();
    assert!(allocator.allocate(&client).await.is_err());
    assert_eq!(allocator.allocate(&client).await.unwrap(), 1001);
}
