use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control frames a client may send over its connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Declare (or clear) the project this connection is interested in.
    Subscribe {
        #[serde(rename = "projectId", default)]
        project_id: Value,
    },
}

/// Control replies sent from the server in response to a [`ClientFrame`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlReply {
    Subscribed {
        #[serde(rename = "projectId", skip_serializing_if = "Value::is_null")]
        project_id: Value,
    },
}

/// Event delivery frame: the originating channel and the untouched payload.
#[derive(Debug, Serialize)]
pub struct Delivery<'a> {
    pub channel: &'a str,
    pub data: &'a Value,
}
