//! POST /background-sync: external scheduler trigger.
//!
//! Authenticated by a static bearer token, runs one task processor pass and
//! returns the pass summary plus per-status task counts for the trailing 24h.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::state::AppState;
use crate::util::now_millis;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub async fn handle_trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == state.sync_trigger_token);

    if !authorized {
        tracing::warn!("Background sync trigger rejected: bad or missing bearer token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let summary = state.processor.run_pass().await.map_err(|e| {
        tracing::error!("Background sync pass failed: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let counts = state
        .tasks
        .status_counts(now_millis() - DAY_MS)
        .await
        .map_err(|e| {
            tracing::error!("Failed to read task status counts: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(serde_json::json!({
        "pass": summary,
        "last_24h": counts,
    })))
}
