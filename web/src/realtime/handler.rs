use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use log::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use ws::Manager;

/// WebSocket handler that establishes a long-lived connection for real-time updates.
/// Each socket becomes one session; the client narrows it with a `subscribe` frame.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> Response {
    debug!("Upgrading WebSocket connection");
    let manager = app_state.ws_manager.clone();
    ws.on_upgrade(move |socket| run_session(socket, manager))
}

async fn run_session(socket: WebSocket, manager: Arc<Manager>) {
    let (mut socket_tx, mut socket_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let session_id = manager.register_session(tx);

    // Frames queued by the router are written here. When the socket stops
    // accepting writes the receiver is dropped, which closes the session's
    // handle so the next delivery attempt removes it.
    let forward_id = session_id.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = socket_tx.send(Message::Text(frame)).await {
                debug!(
                    "Write to session {} failed: {e}",
                    forward_id.as_str()
                );
                break;
            }
        }
    });

    while let Some(result) = socket_rx.next().await {
        match result {
            Ok(Message::Text(text)) => manager.handle_client_frame(&session_id, &text),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => manager.handle_client_frame(&session_id, text),
                Err(_) => debug!(
                    "Dropping non-UTF8 binary frame from session {}",
                    session_id.as_str()
                ),
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                warn!("WebSocket error on session {}: {e}", session_id.as_str());
                break;
            }
        }
    }

    debug!("WebSocket session {} closed, cleaning up", session_id.as_str());
    manager.unregister_session(&session_id);
    forwarder.abort();
}
