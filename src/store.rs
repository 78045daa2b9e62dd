//! Persistence collaborator seams.
//!
//! The engine only needs key/filter lookups and single-row updates over four
//! collections; everything behind these traits is owned by the persistence
//! layer (Postgres in production, in-memory doubles in tests). Single-row
//! updates are assumed atomic by the implementation.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BoxError;
use crate::models::{
    LocalOrder, OrderStatus, RemoteConnection, RemoteOrderSnapshot, SyncStatus, SyncTask,
};

/// Local delivery orders
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<LocalOrder>, BoxError>;

    async fn find_by_remote(
        &self,
        remote_order_id: &str,
        connection_id: &str,
    ) -> Result<Option<LocalOrder>, BoxError>;

    async fn insert(&self, order: &LocalOrder) -> Result<(), BoxError>;

    /// Atomic delivered transition: status, completion payload, timestamps
    /// and the initial sync status in one row update.
    async fn mark_delivered(
        &self,
        id: &str,
        delivered_at: i64,
        driver_name: Option<&str>,
        completion: &Value,
        sync_status: SyncStatus,
    ) -> Result<(), BoxError>;

    async fn set_status(&self, id: &str, status: OrderStatus) -> Result<(), BoxError>;

    async fn set_sync_status(&self, id: &str, sync_status: SyncStatus) -> Result<(), BoxError>;

    /// Persist a successful remote fulfillment (id + timestamp + synced)
    async fn record_fulfillment(
        &self,
        id: &str,
        fulfillment_id: &str,
        fulfilled_at: i64,
    ) -> Result<(), BoxError>;
}

/// Remote shop connections
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<RemoteConnection>, BoxError>;

    /// Lookup by normalized shop domain (webhook routing)
    async fn find_by_domain(&self, shop_domain: &str)
    -> Result<Option<RemoteConnection>, BoxError>;
}

/// Per-status task counts for the queue status summary
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct TaskStatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Durable sync task queue. Tasks are retained indefinitely for audit.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: &SyncTask) -> Result<(), BoxError>;

    async fn get(&self, id: &str) -> Result<Option<SyncTask>, BoxError>;

    /// Pending tasks with `scheduled_at <= now`, oldest first
    async fn due(&self, now: i64, limit: i64) -> Result<Vec<SyncTask>, BoxError>;

    /// pending → processing, bumping the attempt counter. Returns whether
    /// this caller won the claim; a false means another pass holds the task.
    async fn mark_processing(&self, id: &str, attempts: i32) -> Result<bool, BoxError>;

    async fn complete(&self, id: &str, processed_at: i64) -> Result<(), BoxError>;

    /// processing → pending with a pushed-forward `scheduled_at`
    async fn reschedule(
        &self,
        id: &str,
        scheduled_at: i64,
        error_message: &str,
    ) -> Result<(), BoxError>;

    /// processing → failed (terminal)
    async fn fail(&self, id: &str, error_message: &str, processed_at: i64)
    -> Result<(), BoxError>;

    /// Counts per status for tasks created since `since`
    async fn status_counts(&self, since: i64) -> Result<TaskStatusCounts, BoxError>;
}

/// Mirrored remote order snapshots, unique per (remote_order_id, connection_id)
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert the snapshot, or, when the pair already exists, update only
    /// the financial/fulfillment status fields and `last_synced_at`.
    /// Returns true when a new row was inserted.
    async fn upsert(&self, snapshot: &RemoteOrderSnapshot) -> Result<bool, BoxError>;

    async fn get(
        &self,
        remote_order_id: &str,
        connection_id: &str,
    ) -> Result<Option<RemoteOrderSnapshot>, BoxError>;
}
