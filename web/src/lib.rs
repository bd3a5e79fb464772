//! HTTP and WebSocket surface of the realtime node.
//!
//! The only long-lived endpoint is `/ws`, which turns each socket into a
//! session of the `ws` crate's registry. The remaining routes are thin glue:
//! a health check, the agent status read clients use to re-fetch state after
//! reconnecting, and the work-trigger endpoints that append tasks to the
//! broker's work queues.

use axum::http::{header, HeaderValue, Method};
use broker::publish::EventSink;
use broker::queue::TaskQueue;
use broker::status::AgentStatusStore;
use log::*;
use service::config::Config;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

mod controller;
mod error;
mod realtime;
mod router;

pub use error::{Error, Result};

// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub ws_manager: Arc<ws::Manager>,
    pub task_queue: Arc<dyn TaskQueue>,
    pub event_sink: Arc<dyn EventSink>,
    pub agent_status: Arc<dyn AgentStatusStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        ws_manager: Arc<ws::Manager>,
        task_queue: Arc<dyn TaskQueue>,
        event_sink: Arc<dyn EventSink>,
        agent_status: Arc<dyn AgentStatusStore>,
    ) -> Self {
        Self {
            config,
            ws_manager,
            task_queue,
            event_sink,
            agent_status,
        }
    }
}

/// Bind to the configured interface and port, then serve until `shutdown` resolves.
pub async fn init_server<F>(app_state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listen_addr = app_state.config.listen_address();
    info!("Server starting... listening for connections on http://{listen_addr}");

    let listener = TcpListener::bind(&listen_addr).await?;
    serve(listener, app_state, shutdown).await
}

/// Serve on an already-bound listener. Useful when the caller needs the
/// ephemeral port before the server starts.
pub async fn serve<F>(
    listener: TcpListener,
    app_state: AppState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors_layer = cors_layer(&app_state.config.allowed_origins);
    let app = router::define_routes(app_state).layer(cors_layer);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Ignoring invalid CORS origin {origin}: {e}");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}
