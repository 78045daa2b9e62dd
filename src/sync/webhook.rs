//! Webhook Ingestor applies signed push events from the remote platform.
//!
//! Stateless per request. The raw body is verified (HMAC-SHA256,
//! constant-time) before any parsing or side effect. Each known topic is
//! parsed once at the boundary into a [`WebhookEvent`]; unknown topics are
//! acknowledged and ignored for forward compatibility. Redelivery is safe:
//! snapshot writes are upserts keyed on `(remote_order_id, connection_id)`.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::WebhookError;
use crate::models::{
    FulfillmentStatus, LocalOrder, OrderStatus, RemoteConnection, RemoteOrderSnapshot, SyncStatus,
};
use crate::shopify::{self, id_to_string};
use crate::store::{ConnectionStore, OrderStore, SnapshotStore};
use crate::util::{normalize_domain, now_millis};

/// Order payload fields this engine reads from webhook bodies
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOrderPayload {
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    order_number: Option<Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    customer: Option<RemoteCustomer>,
    #[serde(default)]
    shipping_address: Option<Value>,
    #[serde(default)]
    line_items: Option<Value>,
    #[serde(default)]
    total_price: Option<String>,
    #[serde(default)]
    financial_status: Option<String>,
    #[serde(default)]
    fulfillment_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteCustomer {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

impl RemoteOrderPayload {
    fn remote_order_id(&self) -> Option<String> {
        id_to_string(&self.id)
    }

    /// Human-readable order number: `name` ("#1001"), else the numeric
    /// `order_number`, else the remote id.
    fn display_number(&self) -> Option<String> {
        self.name
            .clone()
            .or_else(|| self.order_number.as_ref().and_then(id_to_string))
            .or_else(|| self.remote_order_id())
    }

    fn customer_name(&self) -> Option<String> {
        let c = self.customer.as_ref()?;
        let name = [c.first_name.as_deref(), c.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }
}

/// Known webhook topics, parsed once at the boundary
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    OrderCreated(RemoteOrderPayload),
    OrderUpdated(RemoteOrderPayload),
    OrderCancelled(RemoteOrderPayload),
    OrderFulfilled(RemoteOrderPayload),
    OrderPartiallyFulfilled(RemoteOrderPayload),
    Unknown { topic: String },
}

impl WebhookEvent {
    pub fn parse(topic: &str, body: &[u8]) -> Result<Self, WebhookError> {
        let order = |body: &[u8]| -> Result<RemoteOrderPayload, WebhookError> {
            serde_json::from_slice(body)
                .map_err(|e| WebhookError::Validation(format!("invalid order payload: {e}")))
        };
        Ok(match topic {
            "orders/create" => Self::OrderCreated(order(body)?),
            "orders/updated" => Self::OrderUpdated(order(body)?),
            "orders/cancelled" => Self::OrderCancelled(order(body)?),
            "orders/fulfilled" => Self::OrderFulfilled(order(body)?),
            "orders/partially_fulfilled" => Self::OrderPartiallyFulfilled(order(body)?),
            other => Self::Unknown {
                topic: other.to_string(),
            },
        })
    }
}

/// Whether the event was applied or acknowledged-and-ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    Applied,
    Ignored,
}

pub struct WebhookIngestor {
    connections: Arc<dyn ConnectionStore>,
    snapshots: Arc<dyn SnapshotStore>,
    orders: Arc<dyn OrderStore>,
}

impl WebhookIngestor {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        snapshots: Arc<dyn SnapshotStore>,
        orders: Arc<dyn OrderStore>,
    ) -> Self {
        Self {
            connections,
            snapshots,
            orders,
        }
    }

    /// Verify, parse and apply one webhook delivery.
    ///
    /// Authentication happens over the raw, unparsed body and strictly
    /// before any side effect.
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
        topic: Option<&str>,
        shop_domain: Option<&str>,
    ) -> Result<WebhookAck, WebhookError> {
        let signature =
            signature.ok_or_else(|| WebhookError::Validation("missing signature header".into()))?;
        let topic = topic.ok_or_else(|| WebhookError::Validation("missing topic header".into()))?;
        let shop_domain = shop_domain
            .ok_or_else(|| WebhookError::Validation("missing shop domain header".into()))?;

        let domain = normalize_domain(shop_domain);
        let conn = self
            .connections
            .find_by_domain(&domain)
            .await
            .map_err(WebhookError::store)?
            // Unknown shop gets the same opaque 401 as a bad signature
            .ok_or(WebhookError::Auth)?;

        if !shopify::verify_webhook_signature(raw_body, signature, &conn.webhook_secret) {
            tracing::warn!(shop_domain = %domain, topic, "Webhook signature verification failed");
            return Err(WebhookError::Auth);
        }

        match WebhookEvent::parse(topic, raw_body)? {
            WebhookEvent::OrderCreated(payload) => {
                self.apply_upsert(&conn, &payload, None).await?;
                self.maybe_auto_create(&conn, &payload).await?;
                Ok(WebhookAck::Applied)
            }
            WebhookEvent::OrderUpdated(payload) => {
                self.apply_upsert(&conn, &payload, None).await?;
                Ok(WebhookAck::Applied)
            }
            WebhookEvent::OrderCancelled(payload) => {
                self.apply_cancelled(&conn, &payload).await?;
                Ok(WebhookAck::Applied)
            }
            WebhookEvent::OrderFulfilled(payload) => {
                self.apply_upsert(&conn, &payload, Some(FulfillmentStatus::Fulfilled))
                    .await?;
                Ok(WebhookAck::Applied)
            }
            WebhookEvent::OrderPartiallyFulfilled(payload) => {
                self.apply_upsert(&conn, &payload, Some(FulfillmentStatus::Partial))
                    .await?;
                Ok(WebhookAck::Applied)
            }
            WebhookEvent::Unknown { topic } => {
                tracing::info!(shop_domain = %domain, topic, "Unknown webhook topic acknowledged");
                Ok(WebhookAck::Ignored)
            }
        }
    }

    /// Upsert the mirrored snapshot; existing rows only take status fields
    async fn apply_upsert(
        &self,
        conn: &RemoteConnection,
        payload: &RemoteOrderPayload,
        status_override: Option<FulfillmentStatus>,
    ) -> Result<(), WebhookError> {
        let snapshot = snapshot_from_payload(conn, payload, status_override)?;
        let inserted = self
            .snapshots
            .upsert(&snapshot)
            .await
            .map_err(WebhookError::store)?;
        tracing::debug!(
            remote_order_id = %snapshot.remote_order_id,
            connection_id = %conn.id,
            inserted,
            fulfillment_status = snapshot.fulfillment_status.as_db(),
            "Remote order snapshot upserted"
        );
        Ok(())
    }

    /// `orders/cancelled`: mark the snapshot cancelled and, when a local
    /// order mirrors this remote order, cancel it too.
    async fn apply_cancelled(
        &self,
        conn: &RemoteConnection,
        payload: &RemoteOrderPayload,
    ) -> Result<(), WebhookError> {
        self.apply_upsert(conn, payload, Some(FulfillmentStatus::Cancelled))
            .await?;

        let Some(remote_order_id) = payload.remote_order_id() else {
            return Ok(());
        };
        if let Some(order) = self
            .orders
            .find_by_remote(&remote_order_id, &conn.id)
            .await
            .map_err(WebhookError::store)?
        {
            if order.status != OrderStatus::Cancelled {
                self.orders
                    .set_status(&order.id, OrderStatus::Cancelled)
                    .await
                    .map_err(WebhookError::store)?;
                tracing::info!(
                    order_id = %order.id,
                    remote_order_id = %remote_order_id,
                    "Local order cancelled from remote webhook"
                );
            }
        }
        Ok(())
    }

    /// `orders/create` auto-creation: opt-in per connection, and only when
    /// the payload carries a shipping address.
    async fn maybe_auto_create(
        &self,
        conn: &RemoteConnection,
        payload: &RemoteOrderPayload,
    ) -> Result<(), WebhookError> {
        if !conn.auto_create_orders {
            return Ok(());
        }
        let Some(remote_order_id) = payload.remote_order_id() else {
            return Ok(());
        };
        if payload.shipping_address.is_none() {
            tracing::debug!(
                remote_order_id = %remote_order_id,
                "Skipping auto-create: no shipping address"
            );
            return Ok(());
        }
        if self
            .orders
            .find_by_remote(&remote_order_id, &conn.id)
            .await
            .map_err(WebhookError::store)?
            .is_some()
        {
            return Ok(());
        }

        let now = now_millis();
        let order = LocalOrder {
            id: uuid::Uuid::new_v4().to_string(),
            order_number: payload
                .display_number()
                .unwrap_or_else(|| remote_order_id.clone()),
            status: OrderStatus::Pending,
            remote_order_id: Some(remote_order_id.clone()),
            remote_connection_id: Some(conn.id.clone()),
            sync_status: SyncStatus::NotApplicable,
            remote_fulfillment_id: None,
            remote_fulfilled_at: None,
            delivered_at: None,
            driver_name: None,
            completion: None,
            created_at: now,
        };
        self.orders
            .insert(&order)
            .await
            .map_err(WebhookError::store)?;
        tracing::info!(
            order_id = %order.id,
            remote_order_id = %remote_order_id,
            order_number = %order.order_number,
            "Local order auto-created from webhook"
        );
        Ok(())
    }
}

fn snapshot_from_payload(
    conn: &RemoteConnection,
    payload: &RemoteOrderPayload,
    status_override: Option<FulfillmentStatus>,
) -> Result<RemoteOrderSnapshot, WebhookError> {
    let remote_order_id = payload
        .remote_order_id()
        .ok_or_else(|| WebhookError::Validation("order payload missing id".into()))?;

    Ok(RemoteOrderSnapshot {
        remote_order_id,
        connection_id: conn.id.clone(),
        order_number: payload.display_number(),
        customer_name: payload.customer_name(),
        customer_email: payload.email.clone(),
        customer_phone: payload.phone.clone(),
        shipping_address: payload.shipping_address.clone(),
        line_items: payload.line_items.clone().unwrap_or(Value::Null),
        total: payload
            .total_price
            .as_deref()
            .and_then(|t| t.parse::<Decimal>().ok()),
        fulfillment_status: status_override
            .unwrap_or_else(|| FulfillmentStatus::from_remote(payload.fulfillment_status.as_deref())),
        financial_status: payload.financial_status.clone(),
        last_synced_at: now_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_topics_and_passes_unknown() {
        let body = br##"{"id": 9001, "name": "#1001"}"##;
        assert!(matches!(
            WebhookEvent::parse("orders/create", body).unwrap(),
            WebhookEvent::OrderCreated(_)
        ));
        assert!(matches!(
            WebhookEvent::parse("orders/partially_fulfilled", body).unwrap(),
            WebhookEvent::OrderPartiallyFulfilled(_)
        ));
        assert!(matches!(
            WebhookEvent::parse("refunds/create", body).unwrap(),
            WebhookEvent::Unknown { .. }
        ));
        assert!(WebhookEvent::parse("orders/create", b"not json").is_err());
    }

    #[test]
    fn payload_accessors() {
        let payload: RemoteOrderPayload = serde_json::from_str(
            r#"{
                "id": 9001,
                "order_number": 1001,
                "email": "jo@example.com",
                "customer": {"first_name": "Jo", "last_name": "Reyes"},
                "total_price": "42.50"
            }"#,
        )
        .unwrap();
        assert_eq!(payload.remote_order_id().as_deref(), Some("9001"));
        assert_eq!(payload.display_number().as_deref(), Some("1001"));
        assert_eq!(payload.customer_name().as_deref(), Some("Jo Reyes"));
    }
}
