use crate::error::Error;
use async_trait::async_trait;
use log::*;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;

/// One-way publisher for broker event channels.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish `payload` on `channel`. Returns how many subscribers received it.
    async fn publish(&self, channel: &str, payload: &Value) -> Result<u64, Error>;
}

/// `EventSink` backed by broker pub/sub, using `PUBLISH`.
#[derive(Clone)]
pub struct RedisEventSink {
    connection: MultiplexedConnection,
}

impl RedisEventSink {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl EventSink for RedisEventSink {
    async fn publish(&self, channel: &str, payload: &Value) -> Result<u64, Error> {
        let payload = serde_json::to_string(payload)?;
        let mut connection = self.connection.clone();
        let receivers: u64 = connection.publish(channel, payload).await?;
        debug!("Published event on {channel} to {receivers} subscriber(s)");
        Ok(receivers)
    }
}
