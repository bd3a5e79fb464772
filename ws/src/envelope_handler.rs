use crate::Manager;
use async_trait::async_trait;
use events::{Envelope, EventHandler};
use log::*;
use std::sync::Arc;

/// Handles envelopes published by the broker listener by fanning them out to
/// the sessions registered with the [`Manager`].
pub struct EnvelopeHandler {
    ws_manager: Arc<Manager>,
}

impl EnvelopeHandler {
    pub fn new(ws_manager: Arc<Manager>) -> Self {
        Self { ws_manager }
    }
}

#[async_trait]
impl EventHandler for EnvelopeHandler {
    async fn handle(&self, envelope: &Envelope) {
        let delivered = self.ws_manager.route(envelope);
        debug!(
            "Fanned out {} envelope to {} session(s)",
            envelope.channel, delivered
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::EventPublisher;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn published_envelopes_reach_registered_sessions() {
        let manager = Arc::new(Manager::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.register_session(tx);

        let publisher =
            EventPublisher::new().with_handler(Arc::new(EnvelopeHandler::new(manager.clone())));
        publisher
            .publish(&Envelope::new(
                "agent-events",
                json!({"type": "project.updated", "projectId": "p1"}),
            ))
            .await;

        let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["channel"], "agent-events");
        assert_eq!(frame["data"]["type"], "project.updated");
    }
}
