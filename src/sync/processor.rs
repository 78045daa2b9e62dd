//! Task Processor, the sole retry-driving loop.
//!
//! Each pass is triggered externally (cron or `POST /background-sync`),
//! drains up to a small batch of due tasks, and runs them on a bounded
//! worker pool. Same-order work is already serialized by the idempotency
//! guard, so the pool only needs to keep distinct orders apart.

use futures::StreamExt;
use std::sync::Arc;

use crate::error::SyncError;
use crate::models::{OrderStatus, SyncStatus, SyncTask, SyncType, TaskStatus};
use crate::notify::Notifier;
use crate::shopify::FulfillmentClient;
use crate::store::{ConnectionStore, OrderStore, TaskStore};
use crate::sync::fulfillment::{FulfillmentEngine, FulfillmentOutcome};
use crate::util::now_millis;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Max tasks picked up per pass
    pub batch_size: i64,
    /// Concurrent workers within a pass
    pub workers: usize,
    /// Backoff cap in minutes
    pub max_backoff_minutes: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            workers: 4,
            max_backoff_minutes: 60,
        }
    }
}

/// Outcome counts for one processor pass
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PassSummary {
    pub picked: usize,
    pub completed: usize,
    pub rescheduled: usize,
    pub failed: usize,
}

enum Disposition {
    Completed,
    Rescheduled,
    Failed,
    /// Another pass claimed the task between the select and our claim
    Lost,
    /// Store failure while driving the task; state left for the next pass
    Stuck,
}

pub struct TaskProcessor {
    tasks: Arc<dyn TaskStore>,
    orders: Arc<dyn OrderStore>,
    connections: Arc<dyn ConnectionStore>,
    remote: Arc<dyn FulfillmentClient>,
    engine: Arc<FulfillmentEngine>,
    notifier: Arc<dyn Notifier>,
    config: ProcessorConfig,
}

/// Exponential backoff: `2^attempts` minutes, capped
fn backoff_millis(attempts: i32, cap_minutes: i64) -> i64 {
    let exp = attempts.clamp(0, 30) as u32;
    let minutes = (1i64 << exp).min(cap_minutes);
    minutes * 60_000
}

impl TaskProcessor {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        orders: Arc<dyn OrderStore>,
        connections: Arc<dyn ConnectionStore>,
        remote: Arc<dyn FulfillmentClient>,
        engine: Arc<FulfillmentEngine>,
        notifier: Arc<dyn Notifier>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            tasks,
            orders,
            connections,
            remote,
            engine,
            notifier,
            config,
        }
    }

    /// Run one discrete pass over the due tasks
    pub async fn run_pass(&self) -> Result<PassSummary, SyncError> {
        let now = now_millis();
        let due = self
            .tasks
            .due(now, self.config.batch_size)
            .await
            .map_err(SyncError::store)?;

        if due.is_empty() {
            return Ok(PassSummary::default());
        }

        let mut summary = PassSummary {
            picked: due.len(),
            ..Default::default()
        };

        let dispositions: Vec<Disposition> = futures::stream::iter(due)
            .map(|task| self.process_task(task))
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        for d in dispositions {
            match d {
                Disposition::Completed => summary.completed += 1,
                Disposition::Rescheduled => summary.rescheduled += 1,
                Disposition::Failed => summary.failed += 1,
                Disposition::Lost | Disposition::Stuck => {}
            }
        }

        tracing::info!(
            picked = summary.picked,
            completed = summary.completed,
            rescheduled = summary.rescheduled,
            failed = summary.failed,
            "Sync pass finished"
        );

        Ok(summary)
    }

    async fn process_task(&self, task: SyncTask) -> Disposition {
        debug_assert_eq!(task.status, TaskStatus::Pending);
        let attempts = task.attempts + 1;

        let claimed = match self.tasks.mark_processing(&task.id, attempts).await {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(task_id = %task.id, "Failed to mark task processing: {e}");
                return Disposition::Stuck;
            }
        };
        if !claimed {
            tracing::debug!(task_id = %task.id, "Task claimed by a concurrent pass, skipping");
            return Disposition::Lost;
        }

        match self.drive(&task).await {
            Ok(()) => {
                if let Err(e) = self.tasks.complete(&task.id, now_millis()).await {
                    tracing::error!(task_id = %task.id, "Failed to complete task: {e}");
                    return Disposition::Stuck;
                }
                Disposition::Completed
            }
            Err(e) if e.is_retryable() && attempts < task.max_attempts => {
                let delay = backoff_millis(attempts, self.config.max_backoff_minutes);
                let next = now_millis() + delay;
                tracing::warn!(
                    task_id = %task.id,
                    order_id = %task.order_id,
                    attempts,
                    delay_ms = delay,
                    error_kind = e.kind(),
                    "Sync task failed, rescheduling: {e}"
                );
                if let Err(e) = self.tasks.reschedule(&task.id, next, &e.to_string()).await {
                    tracing::error!(task_id = %task.id, "Failed to reschedule task: {e}");
                    return Disposition::Stuck;
                }
                Disposition::Rescheduled
            }
            Err(e) => {
                tracing::error!(
                    task_id = %task.id,
                    order_id = %task.order_id,
                    attempts,
                    error_kind = e.kind(),
                    "Sync task failed terminally: {e}"
                );
                if let Err(e) = self.tasks.fail(&task.id, &e.to_string(), now_millis()).await {
                    tracing::error!(task_id = %task.id, "Failed to mark task failed: {e}");
                    return Disposition::Stuck;
                }
                // Surface the terminal failure on the owning order
                if let Err(e) = self
                    .orders
                    .set_sync_status(&task.order_id, SyncStatus::Failed)
                    .await
                {
                    tracing::error!(
                        order_id = %task.order_id,
                        "Failed to mark order sync_status=failed: {e}"
                    );
                }
                self.notifier.sync_failed(&task.order_id, &e.to_string()).await;
                Disposition::Failed
            }
        }
    }

    /// Validate the task's references and run its remote operation
    async fn drive(&self, task: &SyncTask) -> Result<(), SyncError> {
        let order = self
            .orders
            .get(&task.order_id)
            .await
            .map_err(SyncError::store)?
            .ok_or_else(|| {
                SyncError::Configuration(format!("order {} no longer exists", task.order_id))
            })?;

        let conn = self
            .connections
            .get(&task.connection_id)
            .await
            .map_err(SyncError::store)?
            .ok_or_else(|| {
                SyncError::Configuration(format!(
                    "connection {} no longer exists",
                    task.connection_id
                ))
            })?;

        if !conn.can_sync() {
            return Err(SyncError::Configuration(format!(
                "connection {} is inactive or missing an access token",
                conn.id
            )));
        }

        let remote_order_id = order.remote_order_id.as_deref().ok_or_else(|| {
            SyncError::Configuration(format!("order {} has no remote order attached", order.id))
        })?;

        match task.sync_type {
            SyncType::Fulfillment => {
                if order.status != OrderStatus::Delivered {
                    return Err(SyncError::Configuration(format!(
                        "order {} is no longer delivered (status: {})",
                        order.id,
                        order.status.as_db()
                    )));
                }
                match self.engine.fulfill(&order, &conn).await? {
                    FulfillmentOutcome::Fulfilled { .. }
                    | FulfillmentOutcome::AlreadyFulfilled { .. } => Ok(()),
                    // Another attempt holds the guard; try again later. If it
                    // succeeded, the next pass short-circuits on the probe.
                    FulfillmentOutcome::SkippedInProgress => Err(SyncError::Transient(
                        "fulfillment already in progress".into(),
                    )),
                }
            }
            SyncType::Cancellation => {
                if order.status != OrderStatus::Cancelled {
                    return Err(SyncError::Configuration(format!(
                        "order {} is not cancelled (status: {})",
                        order.id,
                        order.status.as_db()
                    )));
                }
                let reason = task
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("reason"))
                    .and_then(|r| r.as_str())
                    .unwrap_or("other");
                self.remote.cancel_order(&conn, remote_order_id, reason).await
            }
            SyncType::Update => {
                let note = task
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("note"))
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| {
                        SyncError::Configuration(format!("task {} has no note payload", task.id))
                    })?;
                self.remote.add_order_note(&conn, remote_order_id, note).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_millis(1, 60), 2 * 60_000);
        assert_eq!(backoff_millis(2, 60), 4 * 60_000);
        assert_eq!(backoff_millis(3, 60), 8 * 60_000);
        assert_eq!(backoff_millis(6, 60), 60 * 60_000);
        assert_eq!(backoff_millis(30, 60), 60 * 60_000);
    }
}
