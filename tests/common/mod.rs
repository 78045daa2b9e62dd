//! Shared test harness: in-memory store doubles and a programmable mock
//! remote client.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use courier_sync::error::{BoxError, SyncError};
use courier_sync::models::{
    FulfillmentStatus, LocalOrder, OrderStatus, RemoteConnection, RemoteOrderSnapshot, SyncStatus,
    SyncTask,
};
use courier_sync::shopify::{
    CreatedFulfillment, FulfillmentClient, FulfillmentRequest, RemoteFulfillmentState,
};
use courier_sync::store::{
    ConnectionStore, OrderStore, SnapshotStore, TaskStatusCounts, TaskStore,
};
use courier_sync::util::now_millis;
use serde_json::Value;

// ========================================================================
// In-memory persistence double
// ========================================================================

#[derive(Default)]
pub struct MemStore {
    pub orders: Mutex<HashMap<String, LocalOrder>>,
    pub connections: Mutex<HashMap<String, RemoteConnection>>,
    pub tasks: Mutex<HashMap<String, SyncTask>>,
    pub snapshots: Mutex<HashMap<(String, String), RemoteOrderSnapshot>>,
}

impl MemStore {
    pub fn with_connection(self, conn: RemoteConnection) -> Self {
        self.connections
            .lock()
            .unwrap()
            .insert(conn.id.clone(), conn);
        self
    }

    pub fn with_order(self, order: LocalOrder) -> Self {
        self.orders.lock().unwrap().insert(order.id.clone(), order);
        self
    }

    pub fn with_task(self, task: SyncTask) -> Self {
        self.tasks.lock().unwrap().insert(task.id.clone(), task);
        self
    }

    pub fn order(&self, id: &str) -> LocalOrder {
        self.orders.lock().unwrap().get(id).unwrap().clone()
    }

    pub fn task(&self, id: &str) -> SyncTask {
        self.tasks.lock().unwrap().get(id).unwrap().clone()
    }

    pub fn all_tasks(&self) -> Vec<SyncTask> {
        self.tasks.lock().unwrap().values().cloned().collect()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn snapshot(&self, remote_order_id: &str, connection_id: &str) -> RemoteOrderSnapshot {
        self.snapshots
            .lock()
            .unwrap()
            .get(&(remote_order_id.to_string(), connection_id.to_string()))
            .unwrap()
            .clone()
    }
}

#[async_trait]
impl OrderStore for MemStore {
    async fn get(&self, id: &str) -> Result<Option<LocalOrder>, BoxError> {
        Ok(self.orders.lock().unwrap().get(id).cloned())
    }

    async fn find_by_remote(
        &self,
        remote_order_id: &str,
        connection_id: &str,
    ) -> Result<Option<LocalOrder>, BoxError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .find(|o| {
                o.remote_order_id.as_deref() == Some(remote_order_id)
                    && o.remote_connection_id.as_deref() == Some(connection_id)
            })
            .cloned())
    }

    async fn insert(&self, order: &LocalOrder) -> Result<(), BoxError> {
        self.orders
            .lock()
            .unwrap()
            .insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn mark_delivered(
        &self,
        id: &str,
        delivered_at: i64,
        driver_name: Option<&str>,
        completion: &Value,
        sync_status: SyncStatus,
    ) -> Result<(), BoxError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(id).ok_or("order not found")?;
        order.status = OrderStatus::Delivered;
        order.delivered_at = Some(delivered_at);
        if let Some(name) = driver_name {
            order.driver_name = Some(name.to_string());
        }
        order.completion = Some(completion.clone());
        order.sync_status = sync_status;
        Ok(())
    }

    async fn set_status(&self, id: &str, status: OrderStatus) -> Result<(), BoxError> {
        let mut orders = self.orders.lock().unwrap();
        orders.get_mut(id).ok_or("order not found")?.status = status;
        Ok(())
    }

    async fn set_sync_status(&self, id: &str, sync_status: SyncStatus) -> Result<(), BoxError> {
        let mut orders = self.orders.lock().unwrap();
        orders.get_mut(id).ok_or("order not found")?.sync_status = sync_status;
        Ok(())
    }

    async fn record_fulfillment(
        &self,
        id: &str,
        fulfillment_id: &str,
        fulfilled_at: i64,
    ) -> Result<(), BoxError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(id).ok_or("order not found")?;
        order.remote_fulfillment_id = Some(fulfillment_id.to_string());
        order.remote_fulfilled_at = Some(fulfilled_at);
        order.sync_status = SyncStatus::Synced;
        Ok(())
    }
}

#[async_trait]
impl ConnectionStore for MemStore {
    async fn get(&self, id: &str) -> Result<Option<RemoteConnection>, BoxError> {
        Ok(self.connections.lock().unwrap().get(id).cloned())
    }

    async fn find_by_domain(
        &self,
        shop_domain: &str,
    ) -> Result<Option<RemoteConnection>, BoxError> {
        Ok(self
            .connections
            .lock()
            .unwrap()
            .values()
            .find(|c| c.shop_domain == shop_domain)
            .cloned())
    }
}

#[async_trait]
impl TaskStore for MemStore {
    async fn insert(&self, task: &SyncTask) -> Result<(), BoxError> {
        self.tasks
            .lock()
            .unwrap()
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SyncTask>, BoxError> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn due(&self, now: i64, limit: i64) -> Result<Vec<SyncTask>, BoxError> {
        use courier_sync::models::TaskStatus;
        let mut due: Vec<SyncTask> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.status == TaskStatus::Pending && t.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.scheduled_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn mark_processing(&self, id: &str, attempts: i32) -> Result<bool, BoxError> {
        use courier_sync::models::TaskStatus;
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(id).ok_or("task not found")?;
        if task.status != TaskStatus::Pending {
            return Ok(false);
        }
        task.status = TaskStatus::Processing;
        task.attempts = attempts;
        Ok(true)
    }

    async fn complete(&self, id: &str, processed_at: i64) -> Result<(), BoxError> {
        use courier_sync::models::TaskStatus;
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(id).ok_or("task not found")?;
        task.status = TaskStatus::Completed;
        task.processed_at = Some(processed_at);
        task.error_message = None;
        Ok(())
    }

    async fn reschedule(
        &self,
        id: &str,
        scheduled_at: i64,
        error_message: &str,
    ) -> Result<(), BoxError> {
        use courier_sync::models::TaskStatus;
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(id).ok_or("task not found")?;
        if task.status == TaskStatus::Processing {
            task.status = TaskStatus::Pending;
            task.scheduled_at = scheduled_at;
            task.error_message = Some(error_message.to_string());
        }
        Ok(())
    }

    async fn fail(
        &self,
        id: &str,
        error_message: &str,
        processed_at: i64,
    ) -> Result<(), BoxError> {
        use courier_sync::models::TaskStatus;
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(id).ok_or("task not found")?;
        task.status = TaskStatus::Failed;
        task.error_message = Some(error_message.to_string());
        task.processed_at = Some(processed_at);
        Ok(())
    }

    async fn status_counts(&self, since: i64) -> Result<TaskStatusCounts, BoxError> {
        use courier_sync::models::TaskStatus;
        let mut counts = TaskStatusCounts::default();
        for task in self.tasks.lock().unwrap().values() {
            if task.created_at < since {
                continue;
            }
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl SnapshotStore for MemStore {
    async fn upsert(&self, snapshot: &RemoteOrderSnapshot) -> Result<bool, BoxError> {
        let key = (
            snapshot.remote_order_id.clone(),
            snapshot.connection_id.clone(),
        );
        let mut snapshots = self.snapshots.lock().unwrap();
        match snapshots.get_mut(&key) {
            Some(existing) => {
                // Matches the Postgres upsert: status fields only
                existing.fulfillment_status = snapshot.fulfillment_status;
                existing.financial_status = snapshot.financial_status.clone();
                existing.last_synced_at = snapshot.last_synced_at;
                Ok(false)
            }
            None => {
                snapshots.insert(key, snapshot.clone());
                Ok(true)
            }
        }
    }

    async fn get(
        &self,
        remote_order_id: &str,
        connection_id: &str,
    ) -> Result<Option<RemoteOrderSnapshot>, BoxError> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .get(&(remote_order_id.to_string(), connection_id.to_string()))
            .cloned())
    }
}

// ========================================================================
// Mock remote client
// ========================================================================

/// Programmable remote: a fixed fulfillment state, an optional error kind
/// applied to every call, an optional per-call delay, and call counters.
pub struct MockRemote {
    pub fulfillment_status: Mutex<FulfillmentStatus>,
    pub existing_fulfillment_id: Mutex<Option<String>>,
    /// When set, every call fails with this error kind
    pub fail_with: Mutex<Option<&'static str>>,
    /// Artificial latency before each call resolves
    pub delay: Mutex<Option<Duration>>,
    pub status_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub note_calls: AtomicUsize,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self {
            fulfillment_status: Mutex::new(FulfillmentStatus::Unfulfilled),
            existing_fulfillment_id: Mutex::new(None),
            fail_with: Mutex::new(None),
            delay: Mutex::new(None),
            status_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            note_calls: AtomicUsize::new(0),
        }
    }
}

impl MockRemote {
    pub fn failing_with(kind: &'static str) -> Self {
        let mock = Self::default();
        *mock.fail_with.lock().unwrap() = Some(kind);
        mock
    }

    pub fn already_fulfilled(fulfillment_id: &str) -> Self {
        let mock = Self::default();
        *mock.fulfillment_status.lock().unwrap() = FulfillmentStatus::Fulfilled;
        *mock.existing_fulfillment_id.lock().unwrap() = Some(fulfillment_id.to_string());
        mock
    }

    pub fn set_failure(&self, kind: Option<&'static str>) {
        *self.fail_with.lock().unwrap() = kind;
    }

    async fn gate(&self) -> Result<(), SyncError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let kind = *self.fail_with.lock().unwrap();
        match kind {
            None => Ok(()),
            Some("transient") => Err(SyncError::Transient("simulated network failure".into())),
            Some("rate_limited") => Err(SyncError::RateLimited),
            Some("authentication") => Err(SyncError::Authentication("simulated 401".into())),
            Some("permission") => Err(SyncError::Permission("simulated 403".into())),
            Some("not_found") => Err(SyncError::NotFound("simulated 404".into())),
            Some(other) => Err(SyncError::Remote(format!("simulated: {other}"))),
        }
    }
}

#[async_trait]
impl FulfillmentClient for MockRemote {
    async fn order_fulfillment_status(
        &self,
        _conn: &RemoteConnection,
        _remote_order_id: &str,
    ) -> Result<RemoteFulfillmentState, SyncError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(RemoteFulfillmentState {
            status: *self.fulfillment_status.lock().unwrap(),
            fulfillment_id: self.existing_fulfillment_id.lock().unwrap().clone(),
        })
    }

    async fn create_fulfillment(
        &self,
        _conn: &RemoteConnection,
        _remote_order_id: &str,
        request: &FulfillmentRequest,
    ) -> Result<CreatedFulfillment, SyncError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        // The remote order is fulfilled from now on
        *self.fulfillment_status.lock().unwrap() = FulfillmentStatus::Fulfilled;
        *self.existing_fulfillment_id.lock().unwrap() = Some("F-1".to_string());
        Ok(CreatedFulfillment {
            fulfillment_id: "F-1".to_string(),
            tracking_number: request.tracking_number.clone(),
        })
    }

    async fn cancel_order(
        &self,
        _conn: &RemoteConnection,
        _remote_order_id: &str,
        _reason: &str,
    ) -> Result<(), SyncError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await
    }

    async fn add_order_note(
        &self,
        _conn: &RemoteConnection,
        _remote_order_id: &str,
        _note: &str,
    ) -> Result<(), SyncError> {
        self.note_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await
    }
}

// ========================================================================
// Fixtures
// ========================================================================

pub fn test_connection(id: &str) -> RemoteConnection {
    RemoteConnection {
        id: id.to_string(),
        shop_domain: "shop.example.com".to_string(),
        access_token: "shpat_test".to_string(),
        webhook_secret: "whsec_test".to_string(),
        is_active: true,
        auto_create_orders: false,
        notify_customer: true,
        pickup_address: None,
        created_at: now_millis(),
    }
}

pub fn test_order(id: &str, remote: Option<(&str, &str)>) -> LocalOrder {
    LocalOrder {
        id: id.to_string(),
        order_number: format!("ORD-{id}"),
        status: OrderStatus::InTransit,
        remote_order_id: remote.map(|(r, _)| r.to_string()),
        remote_connection_id: remote.map(|(_, c)| c.to_string()),
        sync_status: SyncStatus::NotApplicable,
        remote_fulfillment_id: None,
        remote_fulfilled_at: None,
        delivered_at: None,
        driver_name: Some("Sam Driver".to_string()),
        completion: None,
        created_at: now_millis(),
    }
}

pub fn delivered(mut order: LocalOrder) -> LocalOrder {
    order.status = OrderStatus::Delivered;
    order.delivered_at = Some(now_millis());
    order.sync_status = SyncStatus::Pending;
    order
}

/// Sign a webhook body the way the remote platform does
pub fn sign_webhook(body: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

// ========================================================================
// Wiring
// ========================================================================

use courier_sync::notify::LogNotifier;
use courier_sync::sync::{
    CompletionService, FulfillmentEngine, ProcessorConfig, SyncGuard, TaskProcessor,
    WebhookIngestor,
};
use std::sync::Arc;

/// All engine components wired over one shared in-memory store and one mock
/// remote.
pub struct Harness {
    pub store: Arc<MemStore>,
    pub remote: Arc<MockRemote>,
    pub engine: Arc<FulfillmentEngine>,
    pub processor: TaskProcessor,
    pub completion: CompletionService,
    pub ingestor: WebhookIngestor,
}

pub fn harness(store: MemStore, remote: MockRemote) -> Harness {
    let store = Arc::new(store);
    let remote = Arc::new(remote);
    let engine = Arc::new(FulfillmentEngine::new(
        remote.clone(),
        store.clone(),
        SyncGuard::new(),
    ));
    let notifier = Arc::new(LogNotifier);
    let processor = TaskProcessor::new(
        store.clone(),
        store.clone(),
        store.clone(),
        remote.clone(),
        engine.clone(),
        notifier.clone(),
        ProcessorConfig::default(),
    );
    let completion = CompletionService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        engine.clone(),
        notifier.clone(),
    );
    let ingestor = WebhookIngestor::new(store.clone(), store.clone(), store.clone());
    Harness {
        store,
        remote,
        engine,
        processor,
        completion,
        ingestor,
    }
}
