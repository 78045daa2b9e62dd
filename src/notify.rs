//! Notification collaborator seam.
//!
//! Delivery of notifications (push/email/SMS) belongs to the excluded
//! messaging layer; this core only decides when to emit one. Calls are
//! fire-and-forget; a lost notification never fails the triggering action.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// A driver/admin marked the order delivered
    async fn order_delivered(&self, order_id: &str, actor_id: &str);

    /// A sync task exhausted its retries; operator attention needed
    async fn sync_failed(&self, order_id: &str, reason: &str);
}

/// Default collaborator: records the event in the logs only
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_delivered(&self, order_id: &str, actor_id: &str) {
        tracing::info!(order_id, actor_id, "Notification: order delivered");
    }

    async fn sync_failed(&self, order_id: &str, reason: &str) {
        tracing::warn!(order_id, reason, "Notification: remote sync failed");
    }
}
