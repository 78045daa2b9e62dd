//! Fulfillment engine behavior: idempotency guard, already-fulfilled probe,
//! local record writes.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{MemStore, MockRemote, delivered, harness, test_connection, test_order};
use courier_sync::error::SyncError;
use courier_sync::models::SyncStatus;
use courier_sync::sync::FulfillmentOutcome;

#[tokio::test]
async fn creates_fulfillment_and_records_it_locally() {
    let store = MemStore::default()
        .with_connection(test_connection("conn-1"))
        .with_order(delivered(test_order("ord-1", Some(("9001", "conn-1")))));
    let h = harness(store, MockRemote::default());

    let order = h.store.order("ord-1");
    let conn = test_connection("conn-1");

    let outcome = h.engine.fulfill(&order, &conn).await.unwrap();
    assert_eq!(
        outcome,
        FulfillmentOutcome::Fulfilled {
            fulfillment_id: "F-1".to_string()
        }
    );

    assert_eq!(h.remote.status_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.remote.create_calls.load(Ordering::SeqCst), 1);

    let order = h.store.order("ord-1");
    assert_eq!(order.remote_fulfillment_id.as_deref(), Some("F-1"));
    assert!(order.remote_fulfilled_at.is_some());
    assert_eq!(order.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn concurrent_attempts_create_exactly_one_fulfillment() {
    let store = MemStore::default()
        .with_connection(test_connection("conn-1"))
        .with_order(delivered(test_order("ord-1", Some(("9001", "conn-1")))));
    let remote = MockRemote::default();
    *remote.delay.lock().unwrap() = Some(Duration::from_millis(20));
    let h = harness(store, remote);

    let order = h.store.order("ord-1");
    let conn = test_connection("conn-1");

    let (a, b) = tokio::join!(h.engine.fulfill(&order, &conn), h.engine.fulfill(&order, &conn));
    let (a, b) = (a.unwrap(), b.unwrap());

    let skipped = [&a, &b]
        .into_iter()
        .filter(|o| **o == FulfillmentOutcome::SkippedInProgress)
        .count();
    assert_eq!(skipped, 1, "one of the two attempts must be skipped");
    assert_eq!(h.remote.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn already_fulfilled_short_circuits_without_remote_mutation() {
    let store = MemStore::default()
        .with_connection(test_connection("conn-1"))
        .with_order(delivered(test_order("ord-1", Some(("9001", "conn-1")))));
    let h = harness(store, MockRemote::already_fulfilled("F-EXISTING"));

    let order = h.store.order("ord-1");
    let conn = test_connection("conn-1");

    let outcome = h.engine.fulfill(&order, &conn).await.unwrap();
    assert_eq!(
        outcome,
        FulfillmentOutcome::AlreadyFulfilled {
            fulfillment_id: Some("F-EXISTING".to_string())
        }
    );

    assert_eq!(h.remote.create_calls.load(Ordering::SeqCst), 0);

    // The existing fulfillment is adopted locally
    let order = h.store.order("ord-1");
    assert_eq!(order.remote_fulfillment_id.as_deref(), Some("F-EXISTING"));
    assert_eq!(order.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn guard_releases_after_failed_attempt() {
    let store = MemStore::default()
        .with_connection(test_connection("conn-1"))
        .with_order(delivered(test_order("ord-1", Some(("9001", "conn-1")))));
    let h = harness(store, MockRemote::failing_with("transient"));

    let order = h.store.order("ord-1");
    let conn = test_connection("conn-1");

    let err = h.engine.fulfill(&order, &conn).await.unwrap_err();
    assert!(matches!(err, SyncError::Transient(_)));

    // The failed attempt must not leave the key held
    h.remote.set_failure(None);
    let outcome = h.engine.fulfill(&order, &conn).await.unwrap();
    assert!(matches!(outcome, FulfillmentOutcome::Fulfilled { .. }));
}

#[tokio::test]
async fn inactive_connection_is_a_configuration_error() {
    let mut conn = test_connection("conn-1");
    conn.is_active = false;
    let store = MemStore::default()
        .with_connection(conn.clone())
        .with_order(delivered(test_order("ord-1", Some(("9001", "conn-1")))));
    let h = harness(store, MockRemote::default());

    let order = h.store.order("ord-1");
    let err = h.engine.fulfill(&order, &conn).await.unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));
    assert!(!err.is_retryable());
    assert_eq!(h.remote.status_calls.load(Ordering::SeqCst), 0);
}
