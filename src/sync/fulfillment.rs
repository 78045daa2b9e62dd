//! Core fulfillment algorithm.
//!
//! Drives one idempotent fulfillment attempt for a delivered local order:
//! guard acquisition, already-fulfilled probe, fulfillment creation, and the
//! local record write. Used by both the Task Processor and the Completion
//! Orchestrator's synchronous fast path.

use std::sync::Arc;

use crate::error::SyncError;
use crate::models::{FulfillmentStatus, LocalOrder, RemoteConnection, SyncStatus};
use crate::shopify::{FulfillmentClient, FulfillmentRequest, tracking_number};
use crate::store::OrderStore;
use crate::sync::guard::SyncGuard;
use crate::util::now_millis;

/// Tracking company annotation when the order has no assigned driver name
const DEFAULT_TRACKING_COMPANY: &str = "Courier";

/// Result of one fulfillment attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    /// A fulfillment was created on the remote platform
    Fulfilled { fulfillment_id: String },
    /// The remote order was already fulfilled; no remote mutation happened
    AlreadyFulfilled { fulfillment_id: Option<String> },
    /// Another attempt for the same (shop, order) pair is in flight
    SkippedInProgress,
}

pub struct FulfillmentEngine {
    remote: Arc<dyn FulfillmentClient>,
    orders: Arc<dyn OrderStore>,
    guard: SyncGuard,
}

impl FulfillmentEngine {
    pub fn new(
        remote: Arc<dyn FulfillmentClient>,
        orders: Arc<dyn OrderStore>,
        guard: SyncGuard,
    ) -> Self {
        Self {
            remote,
            orders,
            guard,
        }
    }

    /// One fulfillment attempt. On any error the order's fulfillment fields
    /// are left untouched; the retry policy belongs to the Task Processor.
    pub async fn fulfill(
        &self,
        order: &LocalOrder,
        conn: &RemoteConnection,
    ) -> Result<FulfillmentOutcome, SyncError> {
        if !conn.can_sync() {
            return Err(SyncError::Configuration(format!(
                "connection {} is inactive or missing an access token",
                conn.id
            )));
        }

        let remote_order_id = order.remote_order_id.as_deref().ok_or_else(|| {
            SyncError::Configuration(format!("order {} has no remote order attached", order.id))
        })?;

        // Guard key is released on every exit path below, including `?`
        let Some(_permit) = self.guard.acquire(&conn.shop_domain, remote_order_id) else {
            tracing::info!(
                order_id = %order.id,
                remote_order_id,
                "Fulfillment already in progress, skipping"
            );
            return Ok(FulfillmentOutcome::SkippedInProgress);
        };

        // Probe first: a retry after a prior success whose local record-write
        // failed must not create a second fulfillment.
        let state = self
            .remote
            .order_fulfillment_status(conn, remote_order_id)
            .await?;

        if state.status == FulfillmentStatus::Fulfilled {
            tracing::info!(
                order_id = %order.id,
                remote_order_id,
                fulfillment_id = state.fulfillment_id.as_deref().unwrap_or("unknown"),
                "Remote order already fulfilled"
            );
            match &state.fulfillment_id {
                Some(id) => self
                    .orders
                    .record_fulfillment(&order.id, id, now_millis())
                    .await
                    .map_err(SyncError::store)?,
                None => self
                    .orders
                    .set_sync_status(&order.id, SyncStatus::Synced)
                    .await
                    .map_err(SyncError::store)?,
            }
            return Ok(FulfillmentOutcome::AlreadyFulfilled {
                fulfillment_id: state.fulfillment_id,
            });
        }

        let request = FulfillmentRequest {
            tracking_number: tracking_number(&order.order_number),
            tracking_company: order
                .driver_name
                .clone()
                .unwrap_or_else(|| DEFAULT_TRACKING_COMPANY.to_string()),
            notify_customer: conn.notify_customer,
        };

        let created = self
            .remote
            .create_fulfillment(conn, remote_order_id, &request)
            .await?;

        self.orders
            .record_fulfillment(&order.id, &created.fulfillment_id, now_millis())
            .await
            .map_err(SyncError::store)?;

        tracing::info!(
            order_id = %order.id,
            remote_order_id,
            fulfillment_id = %created.fulfillment_id,
            tracking_number = %created.tracking_number,
            "Remote fulfillment created"
        );

        Ok(FulfillmentOutcome::Fulfilled {
            fulfillment_id: created.fulfillment_id,
        })
    }
}
