//! WebSocket fan-out infrastructure for real-time updates.
//!
//! This crate owns the server side of realtime distribution: it tracks every
//! connected dashboard client as a session and delivers broker envelopes to
//! the sessions whose scope matches.
//!
//! # Architecture
//!
//! - **Session registry**: A `DashMap` of sessions keyed by a server-generated
//!   `SessionId`. Broadcasts iterate a snapshot, so registration and removal
//!   never wait on an in-flight delivery loop.
//! - **Project scopes**: A session with no scope receives every envelope. A
//!   scoped session receives broadcasts plus envelopes whose `projectId`
//!   matches its scope.
//! - **Ephemeral messages**: Envelopes are never buffered for offline clients.
//!   A client that reconnects re-fetches state from the pull API.
//! - **Isolated failures**: A failed send removes that one session; the
//!   remaining sessions still receive the envelope.
//!
//! # Message Flow
//!
//! 1. Client opens a WebSocket on `/ws`; the web layer registers a session
//!    holding the sending half of an unbounded channel
//! 2. Client sends `{"type":"subscribe","projectId":...}`; the manager sets the
//!    session scope and replies `{"type":"subscribed","projectId":...}`
//! 3. The broker listener publishes an envelope to `EnvelopeHandler`
//! 4. `Manager::route` serializes `{"channel":...,"data":...}` once and pushes
//!    it to every matching session
//! 5. The web layer's forwarder task writes queued frames to the socket
//!
//! # Modules
//!
//! - `connection`: SessionRegistry and the type-safe SessionId
//! - `manager`: Routing and control-frame handling (delegates to SessionRegistry)
//! - `message`: Wire frame definitions
//! - `envelope_handler`: Bridges the `events` publisher to the manager

pub mod connection;
pub mod envelope_handler;
pub mod manager;
pub mod message;

pub use envelope_handler::EnvelopeHandler;
pub use manager::Manager;
