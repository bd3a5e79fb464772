//! Error types for the `realtime-client` crate.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for client connections.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of client connection errors.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The connection could not be established.
    Handshake,
    /// An established connection failed while reading or writing.
    Transport,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{:?} error: {}", self.error_kind, source),
            None => write!(f, "{:?} error", self.error_kind),
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

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Transport,
        }
    }
}

/// Helper function to create handshake errors.
pub fn handshake_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Handshake,
    }
}

/// Helper function to create transport errors.
pub fn transport_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Transport,
    }
}
