//! Shopify webhook handler
//!
//! POST /webhooks/shopify: raw body for HMAC signature verification.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::error::WebhookError;
use crate::state::AppState;

/// Handle an incoming Shopify webhook delivery.
///
/// Must receive the raw body (not JSON-extracted): the signature is computed
/// over the exact bytes the platform sent. Auth failures return 401 with no
/// body detail.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let signature = header("x-shopify-hmac-sha256");
    let topic = header("x-shopify-topic");
    let shop_domain = header("x-shopify-shop-domain");

    match state
        .ingestor
        .handle(&body, signature, topic, shop_domain)
        .await
    {
        Ok(_) => StatusCode::OK,
        Err(WebhookError::Auth) => {
            // Logged with shop/topic metadata only; the response stays opaque
            tracing::warn!(
                shop_domain = shop_domain.unwrap_or("unknown"),
                topic = topic.unwrap_or("unknown"),
                "Webhook rejected: authentication failed"
            );
            StatusCode::UNAUTHORIZED
        }
        Err(WebhookError::Validation(reason)) => {
            tracing::warn!(
                shop_domain = shop_domain.unwrap_or("unknown"),
                topic = topic.unwrap_or("unknown"),
                reason,
                "Webhook rejected: validation failed"
            );
            StatusCode::BAD_REQUEST
        }
        Err(WebhookError::Store(e)) => {
            tracing::error!("Webhook processing store error: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
