//! Shopify Admin API client via REST (no SDK dependency).
//!
//! Owns request timeouts, the error taxonomy classification, and webhook
//! signature verification. All calls authenticate with the connection's
//! access token (`X-Shopify-Access-Token`) against the connection's
//! normalized shop domain.

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

use crate::error::SyncError;
use crate::models::{FulfillmentStatus, RemoteConnection};
use crate::util::normalize_domain;

/// Bounded timeout for every remote call
const REQUEST_TIMEOUT_SECS: u64 = 20;
/// Prefix for tracking numbers derived from the local order number
const TRACKING_PREFIX: &str = "DLV";

pub const USER_AGENT: &str = concat!("courier-sync/", env!("CARGO_PKG_VERSION"));

/// Deterministic, reproducible tracking number for a local order.
///
/// Repeated fulfillment calls for the same order must be recognizable as the
/// same shipment even when the remote side does not deduplicate.
pub fn tracking_number(order_number: &str) -> String {
    format!("{TRACKING_PREFIX}-{order_number}")
}

/// Remote fulfillment state observed via `GET /orders/{id}`
#[derive(Debug, Clone)]
pub struct RemoteFulfillmentState {
    pub status: FulfillmentStatus,
    pub fulfillment_id: Option<String>,
}

/// Fulfillment creation request. The empty line-items selector means
/// "fulfill all items".
#[derive(Debug, Clone)]
pub struct FulfillmentRequest {
    pub tracking_number: String,
    pub tracking_company: String,
    pub notify_customer: bool,
}

#[derive(Debug, Clone)]
pub struct CreatedFulfillment {
    pub fulfillment_id: String,
    pub tracking_number: String,
}

/// Remote commerce platform order/fulfillment operations.
///
/// The seam the Task Processor and Completion Orchestrator drive; mocked in
/// tests, implemented by [`ShopifyClient`] in production.
#[async_trait]
pub trait FulfillmentClient: Send + Sync {
    async fn order_fulfillment_status(
        &self,
        conn: &RemoteConnection,
        remote_order_id: &str,
    ) -> Result<RemoteFulfillmentState, SyncError>;

    async fn create_fulfillment(
        &self,
        conn: &RemoteConnection,
        remote_order_id: &str,
        request: &FulfillmentRequest,
    ) -> Result<CreatedFulfillment, SyncError>;

    async fn cancel_order(
        &self,
        conn: &RemoteConnection,
        remote_order_id: &str,
        reason: &str,
    ) -> Result<(), SyncError>;

    async fn add_order_note(
        &self,
        conn: &RemoteConnection,
        remote_order_id: &str,
        note: &str,
    ) -> Result<(), SyncError>;
}

/// reqwest-backed client for the Shopify order endpoints
pub struct ShopifyClient {
    http: reqwest::Client,
}

impl ShopifyClient {
    pub fn new() -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SyncError::Configuration(format!("HTTP client build failed: {e}")))?;
        Ok(Self { http })
    }

    fn base_url(conn: &RemoteConnection) -> Result<String, SyncError> {
        if !conn.can_sync() {
            return Err(SyncError::Configuration(format!(
                "connection {} is inactive or missing an access token",
                conn.id
            )));
        }
        Ok(format!("https://{}", normalize_domain(&conn.shop_domain)))
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        token: &str,
    ) -> Result<reqwest::Response, SyncError> {
        let response = request
            .header("X-Shopify-Access-Token", token)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

/// Map a transport-level reqwest failure (timeout, DNS, refused, TLS)
fn classify_send_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Transient(format!("request timed out: {e}"))
    } else {
        SyncError::Transient(format!("request failed: {e}"))
    }
}

/// Map a non-success HTTP status into the error taxonomy
fn classify_status(status: reqwest::StatusCode, body: &str) -> SyncError {
    let detail = truncate(body, 200);
    match status.as_u16() {
        401 => SyncError::Authentication(format!("HTTP 401: {detail}")),
        403 => SyncError::Permission(format!("HTTP 403: {detail}")),
        404 => SyncError::NotFound(format!("HTTP 404: {detail}")),
        429 => SyncError::RateLimited,
        500..=599 => SyncError::Transient(format!("HTTP {status}: {detail}")),
        _ => SyncError::Remote(format!("HTTP {status}: {detail}")),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---- wire types ----

#[derive(Deserialize)]
struct OrderEnvelope {
    order: RemoteOrder,
}

#[derive(Deserialize)]
struct RemoteOrder {
    fulfillment_status: Option<String>,
    #[serde(default)]
    fulfillments: Vec<RemoteFulfillment>,
}

#[derive(Deserialize)]
struct RemoteFulfillment {
    id: serde_json::Value,
}

#[derive(Deserialize)]
struct FulfillmentEnvelope {
    fulfillment: CreatedRemoteFulfillment,
}

#[derive(Deserialize)]
struct CreatedRemoteFulfillment {
    id: serde_json::Value,
    tracking_number: Option<String>,
}

/// Remote ids arrive as JSON numbers; store them as strings locally
pub(crate) fn id_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl FulfillmentClient for ShopifyClient {
    async fn order_fulfillment_status(
        &self,
        conn: &RemoteConnection,
        remote_order_id: &str,
    ) -> Result<RemoteFulfillmentState, SyncError> {
        let url = format!("{}/orders/{remote_order_id}", Self::base_url(conn)?);
        let response = self.execute(self.http.get(&url), &conn.access_token).await?;

        let envelope: OrderEnvelope = response
            .json()
            .await
            .map_err(|e| SyncError::Remote(format!("invalid order response: {e}")))?;

        Ok(RemoteFulfillmentState {
            status: FulfillmentStatus::from_remote(envelope.order.fulfillment_status.as_deref()),
            fulfillment_id: envelope
                .order
                .fulfillments
                .first()
                .and_then(|f| id_to_string(&f.id)),
        })
    }

    async fn create_fulfillment(
        &self,
        conn: &RemoteConnection,
        remote_order_id: &str,
        request: &FulfillmentRequest,
    ) -> Result<CreatedFulfillment, SyncError> {
        let url = format!(
            "{}/orders/{remote_order_id}/fulfillments",
            Self::base_url(conn)?
        );

        // Empty line_items selector = fulfill all items
        let body = serde_json::json!({
            "fulfillment": {
                "tracking_number": request.tracking_number,
                "tracking_company": request.tracking_company,
                "notify_customer": request.notify_customer,
                "line_items": [],
            }
        });

        let response = self
            .execute(self.http.post(&url).json(&body), &conn.access_token)
            .await?;

        let envelope: FulfillmentEnvelope = response
            .json()
            .await
            .map_err(|e| SyncError::Remote(format!("invalid fulfillment response: {e}")))?;

        let fulfillment_id = id_to_string(&envelope.fulfillment.id)
            .ok_or_else(|| SyncError::Remote("fulfillment response missing id".into()))?;

        Ok(CreatedFulfillment {
            fulfillment_id,
            tracking_number: envelope
                .fulfillment
                .tracking_number
                .unwrap_or_else(|| request.tracking_number.clone()),
        })
    }

    async fn cancel_order(
        &self,
        conn: &RemoteConnection,
        remote_order_id: &str,
        reason: &str,
    ) -> Result<(), SyncError> {
        let url = format!("{}/orders/{remote_order_id}/cancel", Self::base_url(conn)?);
        let body = serde_json::json!({ "reason": reason });
        self.execute(self.http.post(&url).json(&body), &conn.access_token)
            .await?;
        Ok(())
    }

    async fn add_order_note(
        &self,
        conn: &RemoteConnection,
        remote_order_id: &str,
        note: &str,
    ) -> Result<(), SyncError> {
        let url = format!("{}/orders/{remote_order_id}/notes", Self::base_url(conn)?);
        let body = serde_json::json!({ "note": note });
        self.execute(self.http.post(&url).json(&body), &conn.access_token)
            .await?;
        Ok(())
    }
}

/// Verify a Shopify webhook signature (HMAC-SHA256 over the raw body,
/// base64-encoded in the `X-Shopify-Hmac-Sha256` header).
///
/// Comparison is constant-time via `Mac::verify_slice`, so a mismatch leaks
/// nothing about how much of the signature matched.
pub fn verify_webhook_signature(payload: &[u8], signature_b64: &str, secret: &str) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature_b64.trim())
    else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
