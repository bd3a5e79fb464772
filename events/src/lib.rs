//! Event system infrastructure for the realtime panel.
//!
//! This crate provides the event types that flow from the message broker to
//! connected dashboard clients, and the publisher that decouples the broker
//! listener from the fan-out router.
//!
//! # Architecture
//!
//! - **Envelope**: A decoded unit of distributed event data (channel + payload)
//! - **Scope**: The project identifier used to filter envelopes per session
//! - **EventHandler**: Trait for implementing envelope handlers
//! - **EventPublisher**: Publishes envelopes to registered handlers
//!
//! This crate has no dependencies on internal crates, so the broker and the
//! WebSocket layer can both depend on it without cycles. Payloads are carried
//! as opaque `serde_json::Value`s; their semantics belong to the publisher.

use async_trait::async_trait;
use std::sync::Arc;

pub mod channels;
pub mod envelope;

pub use envelope::{Envelope, Scope};

/// Trait for handling envelopes received from the broker.
/// Implementations can perform side effects like fanning out to sessions,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope);
}

/// Publishes envelopes to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher wherever the listener can reach it.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an envelope to all registered handlers, one after another.
    /// Handlers own their failure handling; nothing is propagated back here.
    pub async fn publish(&self, envelope: &Envelope) {
        for handler in self.handlers.iter() {
            handler.handle(envelope).await;
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
