//! courier-sync: delivery order / remote commerce sync service.
//!
//! Long-running service that:
//! - Receives signed order webhooks from the remote platform
//! - Maintains mirrored remote-order snapshots
//! - Queues and retries fulfillment/cancellation/note sync tasks
//! - Exposes the completion orchestrator to the delivery app's handlers

use courier_sync::api;
use courier_sync::config::Config;
use courier_sync::error::BoxError;
use courier_sync::state::AppState;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_sync=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting courier-sync (env: {})", config.environment);

    let state = AppState::new(&config).await?;
    let app = api::create_router(state);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("courier-sync listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
