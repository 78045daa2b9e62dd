use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::BoxError;
use crate::models::RemoteConnection;
use crate::store::ConnectionStore;

use super::PgStore;

#[derive(sqlx::FromRow)]
struct ConnectionRow {
    id: String,
    shop_domain: String,
    access_token: String,
    webhook_secret: String,
    is_active: bool,
    auto_create_orders: bool,
    notify_customer: bool,
    pickup_address: Option<Value>,
    created_at: i64,
}

impl From<ConnectionRow> for RemoteConnection {
    fn from(r: ConnectionRow) -> Self {
        Self {
            id: r.id,
            shop_domain: r.shop_domain,
            access_token: r.access_token,
            webhook_secret: r.webhook_secret,
            is_active: r.is_active,
            auto_create_orders: r.auto_create_orders,
            notify_customer: r.notify_customer,
            pickup_address: r.pickup_address,
            created_at: r.created_at,
        }
    }
}

const SELECT: &str = "SELECT id, shop_domain, access_token, webhook_secret, is_active,
        auto_create_orders, notify_customer, pickup_address, created_at
     FROM remote_connections";

pub async fn get(pool: &PgPool, id: &str) -> Result<Option<RemoteConnection>, BoxError> {
    let row: Option<ConnectionRow> = sqlx::query_as(&format!("{SELECT} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

pub async fn find_by_domain(
    pool: &PgPool,
    shop_domain: &str,
) -> Result<Option<RemoteConnection>, BoxError> {
    let row: Option<ConnectionRow> = sqlx::query_as(&format!("{SELECT} WHERE shop_domain = $1"))
        .bind(shop_domain)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

#[async_trait]
impl ConnectionStore for PgStore {
    async fn get(&self, id: &str) -> Result<Option<RemoteConnection>, BoxError> {
        get(&self.pool, id).await
    }

    async fn find_by_domain(
        &self,
        shop_domain: &str,
    ) -> Result<Option<RemoteConnection>, BoxError> {
        find_by_domain(&self.pool, shop_domain).await
    }
}
