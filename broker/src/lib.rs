//! Message broker integration.
//!
//! The realtime node talks to one broker through two independent paths:
//!
//! - **Subscription listener** (`listener`): a single long-lived pub/sub
//!   subscription to the fixed event channels. Every message is decoded into
//!   an `events::Envelope` and handed to an `events::EventPublisher`.
//! - **Status reads** (`status`): the per-agent status documents the agent
//!   runner keeps in plain keys, served to clients re-fetching state.
//! - **Producers** (`queue`, `publish`): one-way writes. Task descriptors are
//!   appended to work queue lists; ad-hoc events are published to channels.
//!   Failures are returned to the caller and never retried here.

pub mod error;
pub mod listener;
pub mod publish;
pub mod queue;
pub mod status;

pub use error::{Error, ErrorKind};

/// Validate the broker URL and build a client handle.
///
/// No connection is made here; connections are opened by `Subscription::open`
/// and `open_connection`.
pub fn connect(url: &str) -> Result<redis::Client, Error> {
    Ok(redis::Client::open(url)?)
}

/// Open the multiplexed connection shared by the task queue and the event sink.
pub async fn open_connection(
    client: &redis::Client,
) -> Result<redis::aio::MultiplexedConnection, Error> {
    Ok(client.get_multiplexed_async_connection().await?)
}
