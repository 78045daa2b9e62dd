//! Completion Orchestrator, the single entry point for order completion.
//!
//! Marks the local order delivered, queues a fulfillment sync task, and makes
//! one bounded best-effort synchronous fulfillment attempt. The queued task
//! is the source of truth; the fast path is only a latency optimization and
//! its failures never surface to the caller.

use std::sync::Arc;
use std::time::Duration;

use crate::error::SyncError;
use crate::models::{
    CompletionData, LocalOrder, OrderStatus, RemoteConnection, SyncStatus, SyncTask, SyncType,
};
use crate::notify::Notifier;
use crate::store::{ConnectionStore, OrderStore, TaskStore};
use crate::sync::fulfillment::{FulfillmentEngine, FulfillmentOutcome};
use crate::util::now_millis;

/// Budget for the synchronous fast path; past this the queued task takes over
const FAST_PATH_BUDGET_SECS: u64 = 5;

/// What `complete_order` reports back to the calling handler
#[derive(Debug, Clone, serde::Serialize)]
pub struct CompletionOutcome {
    pub order_id: String,
    pub status: OrderStatus,
    pub remote_sync_queued: bool,
    pub remote_sync_immediate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_id: Option<String>,
}

pub struct CompletionService {
    orders: Arc<dyn OrderStore>,
    connections: Arc<dyn ConnectionStore>,
    tasks: Arc<dyn TaskStore>,
    engine: Arc<FulfillmentEngine>,
    notifier: Arc<dyn Notifier>,
}

impl CompletionService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        connections: Arc<dyn ConnectionStore>,
        tasks: Arc<dyn TaskStore>,
        engine: Arc<FulfillmentEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            orders,
            connections,
            tasks,
            engine,
            notifier,
        }
    }

    /// Mark a local order delivered and reconcile with its remote order.
    ///
    /// Ownership/permission checks on `actor_id` are delegated to the calling
    /// layer. Remote sync failures never fail the completion itself.
    pub async fn complete_order(
        &self,
        order_id: &str,
        actor_id: &str,
        completion: CompletionData,
    ) -> Result<CompletionOutcome, SyncError> {
        let order = self
            .orders
            .get(order_id)
            .await
            .map_err(SyncError::store)?
            .ok_or_else(|| SyncError::NotFound(format!("order {order_id} not found")))?;

        let now = now_millis();

        // A remote sync is only on the table with an attached remote order
        // and an active connection.
        let conn = match self.syncable_connection(&order).await? {
            Some(c) => c,
            None => {
                self.persist_delivered(&order, &completion, SyncStatus::NotApplicable, now)
                    .await?;
                self.notifier.order_delivered(order_id, actor_id).await;
                return Ok(CompletionOutcome {
                    order_id: order.id,
                    status: OrderStatus::Delivered,
                    remote_sync_queued: false,
                    remote_sync_immediate: false,
                    fulfillment_id: None,
                });
            }
        };

        self.persist_delivered(&order, &completion, SyncStatus::Pending, now)
            .await?;

        // Queue first: the task re-attempts on its own schedule if the
        // immediate attempt fails or is skipped.
        let task = SyncTask::new(&order.id, &conn.id, SyncType::Fulfillment, None, now);
        self.tasks.insert(&task).await.map_err(SyncError::store)?;

        tracing::info!(
            order_id = %order.id,
            task_id = %task.id,
            shop_domain = %conn.shop_domain,
            "Fulfillment sync task queued"
        );

        let delivered = LocalOrder {
            status: OrderStatus::Delivered,
            sync_status: SyncStatus::Pending,
            delivered_at: Some(now),
            driver_name: completion.actor_name.clone().or(order.driver_name.clone()),
            ..order.clone()
        };

        let (immediate, fulfillment_id) = self.fast_path(&delivered, &conn).await;

        if immediate {
            // The queued task's work is done; close it out so the processor
            // does not pick it up.
            if let Err(e) = self.tasks.complete(&task.id, now_millis()).await {
                tracing::warn!(task_id = %task.id, "Failed to close fast-path task: {e}");
            }
        }

        self.notifier.order_delivered(order_id, actor_id).await;

        Ok(CompletionOutcome {
            order_id: order.id,
            status: OrderStatus::Delivered,
            remote_sync_queued: true,
            remote_sync_immediate: immediate,
            fulfillment_id,
        })
    }

    /// Cancel a local order; mirrors the cancellation to the remote platform
    /// through a queued `cancellation` task.
    pub async fn cancel_order(
        &self,
        order_id: &str,
        reason: &str,
    ) -> Result<Option<SyncTask>, SyncError> {
        let order = self
            .orders
            .get(order_id)
            .await
            .map_err(SyncError::store)?
            .ok_or_else(|| SyncError::NotFound(format!("order {order_id} not found")))?;

        self.orders
            .set_status(order_id, OrderStatus::Cancelled)
            .await
            .map_err(SyncError::store)?;

        let Some(conn) = self.syncable_connection(&order).await? else {
            return Ok(None);
        };

        let now = now_millis();
        let payload = serde_json::json!({ "reason": reason });
        let task = SyncTask::new(&order.id, &conn.id, SyncType::Cancellation, Some(payload), now);
        self.tasks.insert(&task).await.map_err(SyncError::store)?;

        self.orders
            .set_sync_status(order_id, SyncStatus::Pending)
            .await
            .map_err(SyncError::store)?;

        tracing::info!(order_id, task_id = %task.id, reason, "Cancellation sync task queued");
        Ok(Some(task))
    }

    /// Queue a delivery note (remarks) to be posted on the remote order
    pub async fn queue_note(&self, order_id: &str, note: &str) -> Result<Option<SyncTask>, SyncError> {
        let order = self
            .orders
            .get(order_id)
            .await
            .map_err(SyncError::store)?
            .ok_or_else(|| SyncError::NotFound(format!("order {order_id} not found")))?;

        let Some(conn) = self.syncable_connection(&order).await? else {
            return Ok(None);
        };

        let now = now_millis();
        let payload = serde_json::json!({ "note": note });
        let task = SyncTask::new(&order.id, &conn.id, SyncType::Update, Some(payload), now);
        self.tasks.insert(&task).await.map_err(SyncError::store)?;

        tracing::info!(order_id, task_id = %task.id, "Note sync task queued");
        Ok(Some(task))
    }

    /// The order's connection, when a sync can actually proceed
    async fn syncable_connection(
        &self,
        order: &LocalOrder,
    ) -> Result<Option<RemoteConnection>, SyncError> {
        if !order.has_remote() {
            return Ok(None);
        }
        let Some(conn_id) = order.remote_connection_id.as_deref() else {
            return Ok(None);
        };
        let conn = self
            .connections
            .get(conn_id)
            .await
            .map_err(SyncError::store)?;
        Ok(conn.filter(RemoteConnection::can_sync))
    }

    async fn persist_delivered(
        &self,
        order: &LocalOrder,
        completion: &CompletionData,
        sync_status: SyncStatus,
        now: i64,
    ) -> Result<(), SyncError> {
        let payload = serde_json::to_value(completion)
            .map_err(|e| SyncError::Configuration(format!("invalid completion data: {e}")))?;
        self.orders
            .mark_delivered(
                &order.id,
                now,
                completion.actor_name.as_deref().or(order.driver_name.as_deref()),
                &payload,
                sync_status,
            )
            .await
            .map_err(SyncError::store)
    }

    /// Best-effort synchronous fulfillment under a short budget; every
    /// failure mode collapses into "queued for retry".
    async fn fast_path(
        &self,
        order: &LocalOrder,
        conn: &RemoteConnection,
    ) -> (bool, Option<String>) {
        let attempt = self.engine.fulfill(order, conn);
        match tokio::time::timeout(Duration::from_secs(FAST_PATH_BUDGET_SECS), attempt).await {
            Ok(Ok(FulfillmentOutcome::Fulfilled { fulfillment_id }))
            | Ok(Ok(FulfillmentOutcome::AlreadyFulfilled {
                fulfillment_id: Some(fulfillment_id),
            })) => (true, Some(fulfillment_id)),
            Ok(Ok(FulfillmentOutcome::AlreadyFulfilled {
                fulfillment_id: None,
            })) => (true, None),
            Ok(Ok(FulfillmentOutcome::SkippedInProgress)) => {
                tracing::info!(order_id = %order.id, "Fast path skipped, attempt in progress");
                (false, None)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    order_id = %order.id,
                    error_kind = e.kind(),
                    "Fast-path fulfillment failed, queued task will retry: {e}"
                );
                (false, None)
            }
            Err(_) => {
                tracing::warn!(
                    order_id = %order.id,
                    budget_secs = FAST_PATH_BUDGET_SECS,
                    "Fast-path fulfillment exceeded budget, queued task will retry"
                );
                (false, None)
            }
        }
    }
}
