use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::{RunContext, Workflow};
use serde_json::Value;
use uuid::Uuid;

use super::AppState;
use db::repository::workflows as wf_repo;

#[derive(serde::Serialize)]
pub struct WebhookAccepted {
    pub execution_id: Uuid,
}

/// Look up the workflow registered for this trigger path and submit it
/// onto the queue. The posted body is accepted but not yet threaded into
/// the run as seed input — the engine's input contract only knows node
/// outputs, not caller-supplied payloads.
pub async fn handle_webhook(
    Path(path): Path<String>,
    State(state): State<AppState>,
    Json(_payload): Json<Value>,
) -> Result<(StatusCode, Json<WebhookAccepted>), StatusCode> {
    let wf_row = match wf_repo::find_by_trigger_path(&state.pool, &path).await {
        Ok(row) => row,
        Err(db::DbError::NotFound) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let workflow: Workflow = serde_json::from_value(wf_row.definition)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let (_handle, token) = nodes::cancellation_pair();
    let run_ctx = RunContext::new(token);
    let execution_id = Uuid::new_v4();

    state
        .queue
        .submit(queue::Job::new(execution_id, workflow, run_ctx))
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok((StatusCode::ACCEPTED, Json(WebhookAccepted { execution_id })))
}
