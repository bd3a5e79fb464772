use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::controller::ApiResponse;
use crate::{AppState, Error};
use broker::queue::TaskDescriptor;
use broker::status;
use events::channels::AGENT_TASKS_QUEUE;
use log::*;

/// GET the last reported status of every known agent
pub async fn status(State(app_state): State<AppState>) -> Result<impl IntoResponse, Error> {
    debug!("GET agent statuses");

    let agents = status::all_agent_statuses(app_state.agent_status.as_ref()).await?;

    Ok(Json(json!({ "agents": agents })))
}

/// Request body for triggering a single agent action.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub project_id: String,
    pub action: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// POST queue an action for the named agent
pub async fn trigger_action(
    State(app_state): State<AppState>,
    Path(agent_name): Path<String>,
    Json(request): Json<ActionRequest>,
) -> Result<impl IntoResponse, Error> {
    debug!(
        "POST trigger action {} for agent {agent_name} on project {}",
        request.action, request.project_id
    );

    let task = TaskDescriptor::agent_action(
        agent_name.as_str(),
        request.project_id,
        request.action,
        request.params,
    );
    app_state
        .task_queue
        .enqueue(AGENT_TASKS_QUEUE, &task)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(
            StatusCode::ACCEPTED.into(),
            json!({
                "message": format!("Action triggered for agent {agent_name}"),
                "task": task,
            }),
        )),
    ))
}
