//! Client side of the realtime event distribution node.
//!
//! A [`ConnectionManager`] keeps one WebSocket connection to the node alive
//! for its owner:
//!
//! - **Subscription replay**: the scope passed to `connect()` is sent as the
//!   first frame of every connection, including reconnects.
//! - **Bounded reconnects**: failures are retried per a [`ReconnectPolicy`]
//!   (five attempts, three seconds apart by default); once the cap is reached
//!   the manager stops in [`ConnectionState::GivenUp`].
//! - **Local fan-out**: every inbound envelope is emitted under `"message"`,
//!   and its `data` under the envelope's channel name, to callbacks
//!   registered with `on`.
//!
//! Lifecycle events `"connected"`, `"disconnected"` and `"error"` are emitted
//! through the same listener registry.

pub mod error;
pub mod listeners;
pub mod manager;
pub mod policy;
pub mod transport;

pub use error::Error;
pub use listeners::{ListenerId, Listeners};
pub use manager::{ConnectionManager, ConnectionState};
pub use policy::{Backoff, ReconnectPolicy};
pub use transport::{Connector, Transport, WsConnector};
