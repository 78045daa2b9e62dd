//! Thin request/response adapters over the completion orchestrator.
//!
//! Caller identity and order ownership checks belong to the fronting auth
//! layer; these handlers only translate HTTP to orchestrator calls.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use crate::error::SyncError;
use crate::models::CompletionData;
use crate::state::AppState;
use crate::sync::CompletionOutcome;

#[derive(Deserialize)]
pub struct CompleteRequest {
    pub actor_id: String,
    #[serde(default)]
    pub completion: CompletionData,
}

pub async fn complete_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<CompletionOutcome>, StatusCode> {
    let outcome = state
        .completion
        .complete_order(&id, &req.actor_id, req.completion)
        .await
        .map_err(map_error)?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct CancelRequest {
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "other".to_string()
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let task = state
        .completion
        .cancel_order(&id, &req.reason)
        .await
        .map_err(map_error)?;
    Ok(Json(serde_json::json!({
        "order_id": id,
        "status": "cancelled",
        "remote_sync_queued": task.is_some(),
    })))
}

fn map_error(e: SyncError) -> StatusCode {
    match e {
        SyncError::NotFound(_) => StatusCode::NOT_FOUND,
        SyncError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        other => {
            tracing::error!("Order API error: {other}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
