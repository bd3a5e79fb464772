use crate::channels::TARGET_SCOPE_FIELD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A project identifier used to scope sessions and envelopes.
///
/// Publishers are not consistent about the JSON type of `projectId`, so every
/// scope goes through [`Scope::from_value`] before being compared. This is
/// deliberately wider than strict JSON equality: a number or bool matches the
/// string holding its JSON text, so `42` and `"42"` name the same project.
/// An empty string is treated as "no scope" so that a client subscribing with
/// `""` keeps receiving everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Self::new(s.as_str()),
            Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
                Some(Self(value.to_string()))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unit of distribution: a payload received on a named broker channel.
///
/// Envelopes are transient. They are never persisted and never replayed; a
/// client that misses one is expected to re-fetch authoritative state.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub channel: String,
    pub payload: Value,
}

impl Envelope {
    pub fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }

    /// Decode a raw broker message body received on `channel`.
    pub fn decode(channel: &str, raw: &str) -> Result<Self, serde_json::Error> {
        let payload = serde_json::from_str(raw)?;
        Ok(Self::new(channel, payload))
    }

    /// The project this envelope is addressed to, or `None` for a broadcast.
    pub fn target_scope(&self) -> Option<Scope> {
        self.payload
            .get(TARGET_SCOPE_FIELD)
            .and_then(Scope::from_value)
    }
}
