//! WebSocket HTTP handler for the web layer.
//!
//! This module contains only the Axum handler that upgrades connections and
//! pumps frames. Session tracking and routing live in the `ws` crate.

pub mod handler;
