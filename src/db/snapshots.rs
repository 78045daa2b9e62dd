use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::BoxError;
use crate::models::{FulfillmentStatus, RemoteOrderSnapshot};
use crate::store::SnapshotStore;

use super::PgStore;

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    remote_order_id: String,
    connection_id: String,
    order_number: Option<String>,
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    shipping_address: Option<Value>,
    line_items: Value,
    total: Option<Decimal>,
    fulfillment_status: String,
    financial_status: Option<String>,
    last_synced_at: i64,
}

impl SnapshotRow {
    fn into_model(self) -> Result<RemoteOrderSnapshot, BoxError> {
        Ok(RemoteOrderSnapshot {
            fulfillment_status: FulfillmentStatus::from_db(&self.fulfillment_status)
                .ok_or_else(|| format!("unknown fulfillment status: {}", self.fulfillment_status))?,
            remote_order_id: self.remote_order_id,
            connection_id: self.connection_id,
            order_number: self.order_number,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            customer_phone: self.customer_phone,
            shipping_address: self.shipping_address,
            line_items: self.line_items,
            total: self.total,
            financial_status: self.financial_status,
            last_synced_at: self.last_synced_at,
        })
    }
}

/// Insert, or on the (remote_order_id, connection_id) conflict update only
/// the status fields. `xmax = 0` distinguishes a fresh insert.
pub async fn upsert(pool: &PgPool, snapshot: &RemoteOrderSnapshot) -> Result<bool, BoxError> {
    let (inserted,): (bool,) = sqlx::query_as(
        "INSERT INTO remote_order_snapshots (remote_order_id, connection_id,
            order_number, customer_name, customer_email, customer_phone,
            shipping_address, line_items, total, fulfillment_status,
            financial_status, last_synced_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (remote_order_id, connection_id) DO UPDATE SET
            fulfillment_status = EXCLUDED.fulfillment_status,
            financial_status = EXCLUDED.financial_status,
            last_synced_at = EXCLUDED.last_synced_at
         RETURNING (xmax = 0)",
    )
    .bind(&snapshot.remote_order_id)
    .bind(&snapshot.connection_id)
    .bind(&snapshot.order_number)
    .bind(&snapshot.customer_name)
    .bind(&snapshot.customer_email)
    .bind(&snapshot.customer_phone)
    .bind(&snapshot.shipping_address)
    .bind(&snapshot.line_items)
    .bind(snapshot.total)
    .bind(snapshot.fulfillment_status.as_db())
    .bind(&snapshot.financial_status)
    .bind(snapshot.last_synced_at)
    .fetch_one(pool)
    .await?;
    Ok(inserted)
}

pub async fn get(
    pool: &PgPool,
    remote_order_id: &str,
    connection_id: &str,
) -> Result<Option<RemoteOrderSnapshot>, BoxError> {
    let row: Option<SnapshotRow> = sqlx::query_as(
        "SELECT remote_order_id, connection_id, order_number, customer_name,
            customer_email, customer_phone, shipping_address, line_items, total,
            fulfillment_status, financial_status, last_synced_at
         FROM remote_order_snapshots
         WHERE remote_order_id = $1 AND connection_id = $2",
    )
    .bind(remote_order_id)
    .bind(connection_id)
    .fetch_optional(pool)
    .await?;
    row.map(SnapshotRow::into_model).transpose()
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn upsert(&self, snapshot: &RemoteOrderSnapshot) -> Result<bool, BoxError> {
        upsert(&self.pool, snapshot).await
    }

    async fn get(
        &self,
        remote_order_id: &str,
        connection_id: &str,
    ) -> Result<Option<RemoteOrderSnapshot>, BoxError> {
        get(&self.pool, remote_order_id, connection_id).await
    }
}
