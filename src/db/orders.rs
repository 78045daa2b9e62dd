use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::BoxError;
use crate::models::{LocalOrder, OrderStatus, SyncStatus};
use crate::store::OrderStore;

use super::PgStore;

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    status: String,
    remote_order_id: Option<String>,
    remote_connection_id: Option<String>,
    sync_status: String,
    remote_fulfillment_id: Option<String>,
    remote_fulfilled_at: Option<i64>,
    delivered_at: Option<i64>,
    driver_name: Option<String>,
    completion: Option<Value>,
    created_at: i64,
}

impl OrderRow {
    fn into_model(self) -> Result<LocalOrder, BoxError> {
        Ok(LocalOrder {
            status: OrderStatus::from_db(&self.status)
                .ok_or_else(|| format!("unknown order status: {}", self.status))?,
            sync_status: SyncStatus::from_db(&self.sync_status)
                .ok_or_else(|| format!("unknown sync status: {}", self.sync_status))?,
            id: self.id,
            order_number: self.order_number,
            remote_order_id: self.remote_order_id,
            remote_connection_id: self.remote_connection_id,
            remote_fulfillment_id: self.remote_fulfillment_id,
            remote_fulfilled_at: self.remote_fulfilled_at,
            delivered_at: self.delivered_at,
            driver_name: self.driver_name,
            completion: self.completion,
            created_at: self.created_at,
        })
    }
}

const SELECT: &str = "SELECT id, order_number, status, remote_order_id, remote_connection_id,
        sync_status, remote_fulfillment_id, remote_fulfilled_at, delivered_at,
        driver_name, completion, created_at
     FROM local_orders";

pub async fn get(pool: &PgPool, id: &str) -> Result<Option<LocalOrder>, BoxError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("{SELECT} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(OrderRow::into_model).transpose()
}

pub async fn find_by_remote(
    pool: &PgPool,
    remote_order_id: &str,
    connection_id: &str,
) -> Result<Option<LocalOrder>, BoxError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "{SELECT} WHERE remote_order_id = $1 AND remote_connection_id = $2"
    ))
    .bind(remote_order_id)
    .bind(connection_id)
    .fetch_optional(pool)
    .await?;
    row.map(OrderRow::into_model).transpose()
}

pub async fn insert(pool: &PgPool, order: &LocalOrder) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO local_orders (id, order_number, status, remote_order_id,
            remote_connection_id, sync_status, remote_fulfillment_id,
            remote_fulfilled_at, delivered_at, driver_name, completion, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(order.status.as_db())
    .bind(&order.remote_order_id)
    .bind(&order.remote_connection_id)
    .bind(order.sync_status.as_db())
    .bind(&order.remote_fulfillment_id)
    .bind(order.remote_fulfilled_at)
    .bind(order.delivered_at)
    .bind(&order.driver_name)
    .bind(&order.completion)
    .bind(order.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_delivered(
    pool: &PgPool,
    id: &str,
    delivered_at: i64,
    driver_name: Option<&str>,
    completion: &Value,
    sync_status: SyncStatus,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE local_orders
         SET status = 'delivered', delivered_at = $2,
             driver_name = COALESCE($3, driver_name),
             completion = $4, sync_status = $5
         WHERE id = $1",
    )
    .bind(id)
    .bind(delivered_at)
    .bind(driver_name)
    .bind(completion)
    .bind(sync_status.as_db())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_status(pool: &PgPool, id: &str, status: OrderStatus) -> Result<(), BoxError> {
    sqlx::query("UPDATE local_orders SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status.as_db())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_sync_status(
    pool: &PgPool,
    id: &str,
    sync_status: SyncStatus,
) -> Result<(), BoxError> {
    sqlx::query("UPDATE local_orders SET sync_status = $2 WHERE id = $1")
        .bind(id)
        .bind(sync_status.as_db())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn record_fulfillment(
    pool: &PgPool,
    id: &str,
    fulfillment_id: &str,
    fulfilled_at: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE local_orders
         SET remote_fulfillment_id = $2, remote_fulfilled_at = $3, sync_status = 'synced'
         WHERE id = $1",
    )
    .bind(id)
    .bind(fulfillment_id)
    .bind(fulfilled_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl OrderStore for PgStore {
    async fn get(&self, id: &str) -> Result<Option<LocalOrder>, BoxError> {
        get(&self.pool, id).await
    }

    async fn find_by_remote(
        &self,
        remote_order_id: &str,
        connection_id: &str,
    ) -> Result<Option<LocalOrder>, BoxError> {
        find_by_remote(&self.pool, remote_order_id, connection_id).await
    }

    async fn insert(&self, order: &LocalOrder) -> Result<(), BoxError> {
        insert(&self.pool, order).await
    }

    async fn mark_delivered(
        &self,
        id: &str,
        delivered_at: i64,
        driver_name: Option<&str>,
        completion: &Value,
        sync_status: SyncStatus,
    ) -> Result<(), BoxError> {
        mark_delivered(&self.pool, id, delivered_at, driver_name, completion, sync_status).await
    }

    async fn set_status(&self, id: &str, status: OrderStatus) -> Result<(), BoxError> {
        set_status(&self.pool, id, status).await
    }

    async fn set_sync_status(&self, id: &str, sync_status: SyncStatus) -> Result<(), BoxError> {
        set_sync_status(&self.pool, id, sync_status).await
    }

    async fn record_fulfillment(
        &self,
        id: &str,
        fulfillment_id: &str,
        fulfilled_at: i64,
    ) -> Result<(), BoxError> {
        record_fulfillment(&self.pool, id, fulfillment_id, fulfilled_at).await
    }
}
