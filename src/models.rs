//! Domain records shared across the sync engine.
//!
//! All timestamps are epoch milliseconds. Enum values map to lowercase
//! database strings via `as_db`/`from_db`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Delivery-side order lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "picked_up" => Some(Self::PickedUp),
            "in_transit" => Some(Self::InTransit),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::PickedUp => "picked_up",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Remote synchronization state of a local order.
///
/// Only meaningful when the order carries a `remote_order_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    NotApplicable,
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "not_applicable" => Some(Self::NotApplicable),
            "pending" => Some(Self::Pending),
            "synced" => Some(Self::Synced),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::NotApplicable => "not_applicable",
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

/// What a sync task does against the remote platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Fulfillment,
    Cancellation,
    Update,
}

impl SyncType {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "fulfillment" => Some(Self::Fulfillment),
            "cancellation" => Some(Self::Cancellation),
            "update" => Some(Self::Update),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Fulfillment => "fulfillment",
            Self::Cancellation => "cancellation",
            Self::Update => "update",
        }
    }
}

/// Sync task state machine: pending → processing → {completed | pending | failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Remote order fulfillment state as mirrored locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Unfulfilled,
    Partial,
    Fulfilled,
    Cancelled,
    PendingFulfillment,
}

impl FulfillmentStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "unfulfilled" => Some(Self::Unfulfilled),
            "partial" => Some(Self::Partial),
            "fulfilled" => Some(Self::Fulfilled),
            "cancelled" => Some(Self::Cancelled),
            "pending_fulfillment" => Some(Self::PendingFulfillment),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Unfulfilled => "unfulfilled",
            Self::Partial => "partial",
            Self::Fulfilled => "fulfilled",
            Self::Cancelled => "cancelled",
            Self::PendingFulfillment => "pending_fulfillment",
        }
    }

    /// Map the remote platform's `fulfillment_status` field (nullable string)
    pub fn from_remote(s: Option<&str>) -> Self {
        match s {
            None | Some("") | Some("unfulfilled") | Some("restocked") => Self::Unfulfilled,
            Some("partial") | Some("partially_fulfilled") => Self::Partial,
            Some("fulfilled") => Self::Fulfilled,
            Some("cancelled") => Self::Cancelled,
            Some(_) => Self::PendingFulfillment,
        }
    }
}

/// The delivery order owned by this system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOrder {
    pub id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub remote_order_id: Option<String>,
    pub remote_connection_id: Option<String>,
    pub sync_status: SyncStatus,
    pub remote_fulfillment_id: Option<String>,
    pub remote_fulfilled_at: Option<i64>,
    pub delivered_at: Option<i64>,
    /// Display name of the assigned driver, used as the tracking company
    /// annotation on the remote fulfillment.
    pub driver_name: Option<String>,
    /// Opaque completion payload (photos, notes, signature)
    pub completion: Option<Value>,
    pub created_at: i64,
}

impl LocalOrder {
    /// Whether this order has a remote counterpart to synchronize with
    pub fn has_remote(&self) -> bool {
        self.remote_order_id.is_some() && self.remote_connection_id.is_some()
    }
}

/// Credentials + endpoint for one remote shop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConnection {
    pub id: String,
    /// Normalized shop domain (no scheme, no trailing slash)
    pub shop_domain: String,
    pub access_token: String,
    pub webhook_secret: String,
    pub is_active: bool,
    /// Auto-create a local order from `orders/create` webhooks
    pub auto_create_orders: bool,
    /// Ask the remote platform to email the customer on fulfillment
    pub notify_customer: bool,
    /// Opaque per-connection pickup address used by order auto-creation
    pub pickup_address: Option<Value>,
    pub created_at: i64,
}

impl RemoteConnection {
    /// A connection can sync only when active with a non-empty token
    pub fn can_sync(&self) -> bool {
        self.is_active && !self.access_token.is_empty()
    }
}

/// A durable, retryable unit of reconciliation work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: String,
    pub order_id: String,
    pub connection_id: String,
    pub sync_type: SyncType,
    pub status: TaskStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    /// Next eligible run time (epoch ms)
    pub scheduled_at: i64,
    pub error_message: Option<String>,
    /// Type-specific context (cancellation reason, note text)
    pub payload: Option<Value>,
    pub created_at: i64,
    pub processed_at: Option<i64>,
}

impl SyncTask {
    pub fn new(
        order_id: &str,
        connection_id: &str,
        sync_type: SyncType,
        payload: Option<Value>,
        now: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            connection_id: connection_id.to_string(),
            sync_type,
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            scheduled_at: now,
            error_message: None,
            payload,
            created_at: now,
            processed_at: None,
        }
    }
}

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Locally mirrored copy of a remote commerce order.
///
/// Unique per `(remote_order_id, connection_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOrderSnapshot {
    pub remote_order_id: String,
    pub connection_id: String,
    pub order_number: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub shipping_address: Option<Value>,
    pub line_items: Value,
    pub total: Option<Decimal>,
    pub fulfillment_status: FulfillmentStatus,
    pub financial_status: Option<String>,
    pub last_synced_at: i64,
}

/// Opaque-ish completion data merged onto a delivered order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionData {
    /// Display name of the acting driver/admin (tracking company annotation)
    pub actor_name: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    pub signature: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_db_roundtrip() {
        for s in [
            OrderStatus::Pending,
            OrderStatus::PickedUp,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::from_db(s.as_db()), Some(s));
        }
        assert_eq!(OrderStatus::from_db("unknown"), None);
        assert_eq!(TaskStatus::from_db("processing"), Some(TaskStatus::Processing));
        assert_eq!(SyncType::from_db("cancellation"), Some(SyncType::Cancellation));
    }

    #[test]
    fn remote_fulfillment_status_mapping() {
        assert_eq!(
            FulfillmentStatus::from_remote(None),
            FulfillmentStatus::Unfulfilled
        );
        assert_eq!(
            FulfillmentStatus::from_remote(Some("partial")),
            FulfillmentStatus::Partial
        );
        assert_eq!(
            FulfillmentStatus::from_remote(Some("fulfilled")),
            FulfillmentStatus::Fulfilled
        );
        assert_eq!(
            FulfillmentStatus::from_remote(Some("scheduled")),
            FulfillmentStatus::PendingFulfillment
        );
    }
}
