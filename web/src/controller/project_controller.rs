use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::controller::ApiResponse;
use crate::{AppState, Error};
use broker::queue::TaskDescriptor;
use events::channels::{AGENT_EVENTS, EXECUTION_QUEUE};
use log::*;

/// Optional request body for starting a project execution.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub scene_id: Option<String>,
}

/// POST queue a project execution and announce it to connected dashboards.
/// A request without a JSON body runs every scene; a malformed body is rejected.
pub async fn execute(
    State(app_state): State<AppState>,
    Path(project_id): Path<String>,
    request: std::result::Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Response, Error> {
    let request = match request {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => ExecuteRequest::default(),
        Err(rejection) => {
            warn!("Rejecting execute request for project {project_id}: {rejection}");
            return Ok(rejection.into_response());
        }
    };
    debug!(
        "POST execute project {project_id} (scene: {:?})",
        request.scene_id
    );

    let task = TaskDescriptor::project_execution(project_id.as_str(), request.scene_id.clone());
    app_state.task_queue.enqueue(EXECUTION_QUEUE, &task).await?;

    let event = json!({
        "type": "execution.started",
        "projectId": project_id,
        "sceneId": request.scene_id,
        "timestamp": task.timestamp,
    });
    app_state.event_sink.publish(AGENT_EVENTS, &event).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(
            StatusCode::ACCEPTED.into(),
            json!({
                "message": "Execution started",
                "task": task,
            }),
        )),
    )
        .into_response())
}
