//! Error types for the `broker` crate.
//!
//! Follows the same pattern as the rest of the workspace: a root Error struct
//! holding an error kind and an optional source for error chaining.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for broker operations.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of broker errors.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The broker URL or client configuration is invalid.
    Config,
    /// The broker could not be reached or dropped the connection.
    Connection,
    /// The channel subscription could not be established at startup.
    Subscription,
    /// The broker rejected a command (LPUSH, PUBLISH, ...).
    Command,
    /// A task or event could not be encoded as JSON.
    Serialization,
}

impl Error {
    /// True for faults that are expected to clear once the broker is reachable again.
    pub fn is_transient(&self) -> bool {
        matches!(self.error_kind, ErrorKind::Connection)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Broker error ({:?}): {}", self.error_kind, source),
            None => write!(f, "Broker error ({:?})", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        let error_kind = if err.kind() == redis::ErrorKind::InvalidClientConfig {
            ErrorKind::Config
        } else if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            ErrorKind::Connection
        } else {
            ErrorKind::Command
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Serialization,
        }
    }
}

/// Helper function to wrap a failure to open the channel subscription.
pub fn subscription_error(err: redis::RedisError) -> Error {
    Error {
        source: Some(Box::new(err)),
        error_kind: ErrorKind::Subscription,
    }
}
