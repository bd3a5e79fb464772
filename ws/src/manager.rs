use crate::connection::{ConnectionHandle, SessionId, SessionRegistry};
use crate::message::{ClientFrame, ControlReply, Delivery};
use events::{Envelope, Scope};
use log::*;
use std::sync::Arc;

/// Routes envelopes to sessions and handles per-session control frames.
pub struct Manager {
    registry: Arc<SessionRegistry>,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    /// Register a new connection and return its session ID
    pub fn register_session(&self, handle: ConnectionHandle) -> SessionId {
        let session_id = self.registry.register(handle);
        info!("Registered WebSocket session {}", session_id.as_str());
        session_id
    }

    /// Unregister a session by ID
    pub fn unregister_session(&self, session_id: &SessionId) {
        if self.registry.unregister(session_id) {
            info!("Unregistered WebSocket session {}", session_id.as_str());
        }
    }

    /// Handle a text frame received from a client.
    ///
    /// Malformed or unknown frames are logged and dropped; the client gets no
    /// error reply and the connection stays open.
    pub fn handle_client_frame(&self, session_id: &SessionId, text: &str) {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    "Dropping malformed frame from session {}: {e}",
                    session_id.as_str()
                );
                return;
            }
        };

        match frame {
            ClientFrame::Subscribe { project_id } => {
                let scope = Scope::from_value(&project_id);
                if !self.registry.set_scope(session_id, scope.clone()) {
                    debug!(
                        "Subscribe from unknown session {}, ignoring",
                        session_id.as_str()
                    );
                    return;
                }
                debug!(
                    "Session {} subscribed to {}",
                    session_id.as_str(),
                    scope.as_ref().map(Scope::as_str).unwrap_or("<all projects>")
                );

                let reply = ControlReply::Subscribed { project_id };
                match serde_json::to_string(&reply) {
                    Ok(json) => {
                        if !self.registry.send_to(session_id, json) {
                            warn!(
                                "Failed to acknowledge subscribe for session {}",
                                session_id.as_str()
                            );
                        }
                    }
                    Err(e) => error!("Failed to serialize subscribe reply: {e}"),
                }
            }
        }
    }

    /// Deliver an envelope to every live session whose scope matches its target.
    ///
    /// A failed send unregisters that session and the loop moves on. Returns
    /// the number of sessions the envelope was handed to.
    pub fn route(&self, envelope: &Envelope) -> usize {
        let target = envelope.target_scope();

        let frame = match serde_json::to_string(&Delivery {
            channel: &envelope.channel,
            data: &envelope.payload,
        }) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize delivery frame: {e}");
                return 0;
            }
        };

        let mut delivered = 0;
        self.registry.for_each_live(|session| {
            if !session.accepts(target.as_ref()) {
                return;
            }
            match session.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to deliver to session {}: {}. Session will be removed.",
                        session.id.as_str(),
                        e
                    );
                    self.registry.unregister(&session.id);
                }
            }
        });

        trace!(
            "Routed {} envelope (target: {:?}) to {} session(s)",
            envelope.channel,
            target,
            delivered
        );
        delivered
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
