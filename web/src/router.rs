use crate::controller::{agent_controller, health_check_controller, project_controller};
use crate::realtime::handler::ws_handler;
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes(app_state.clone()))
        .merge(realtime_routes(app_state.clone()))
        .merge(agent_routes(app_state.clone()))
        .merge(project_routes(app_state))
}

fn health_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check_controller::health_check))
        .with_state(app_state)
}

/// Long-lived WebSocket endpoint for realtime event delivery
fn realtime_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}

/// Agent status reads and the routes that append work to the agent runner's queues
fn agent_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/agents/status", get(agent_controller::status))
        .route(
            "/agents/:agent_name/action",
            post(agent_controller::trigger_action),
        )
        .with_state(app_state)
}

fn project_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/projects/:id/execute", post(project_controller::execute))
        .with_state(app_state)
}
