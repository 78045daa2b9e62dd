//! API routes for courier-sync

pub mod background_sync;
pub mod health;
pub mod orders;
pub mod shopify_webhook;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Shopify webhook (signature-verified, raw body)
    let webhook = Router::new().route("/webhooks/shopify", post(shopify_webhook::handle_webhook));

    // External scheduler trigger (static bearer token)
    let trigger = Router::new().route("/background-sync", post(background_sync::handle_trigger));

    // Thin adapters over the completion orchestrator; caller identity is
    // checked by the fronting auth layer.
    let order_api = Router::new()
        .route("/api/orders/{id}/complete", post(orders::complete_order))
        .route("/api/orders/{id}/cancel", post(orders::cancel_order));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(webhook)
        .merge(trigger)
        .merge(order_api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
