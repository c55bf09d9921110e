use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Json,
};
use engine::{Execution, RunContext, Workflow};
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use super::AppState;

#[derive(serde::Deserialize)]
pub struct ExecuteWorkflowDto {
    #[serde(default)]
    pub input: Value,
}

#[derive(serde::Serialize)]
pub struct ExecutionAccepted {
    pub execution_id: Uuid,
}

/// Submit a workflow run onto the in-process queue and return immediately
/// with the id the caller can poll or stream.
pub async fn execute(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(_payload): Json<ExecuteWorkflowDto>,
) -> Result<(StatusCode, Json<ExecutionAccepted>), StatusCode> {
    let wf_row = match db::repository::workflows::get_workflow(&state.pool, id).await {
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

    Ok((StatusCode::ACCEPTED, Json(ExecutionAccepted { execution_id })))
}

/// Poll a previously-submitted execution's terminal state.
pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Execution>, StatusCode> {
    match state.executions.lock().unwrap().get(&id).cloned() {
        Some(execution) => Ok(Json(execution)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// Relay the execution's `StreamBus` events over Server-Sent Events.
pub async fn stream(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.engine.stream().subscribe(id);
    let events = ReceiverStream::new(rx).map(|event| -> Result<SseEvent, Infallible> {
        Ok(SseEvent::default()
            .json_data(&event)
            .unwrap_or_else(|_| SseEvent::default().data("encode error")))
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
